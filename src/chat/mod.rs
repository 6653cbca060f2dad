//! The chat core: wire events, transcript records, and the router that
//! folds one into the other.

pub mod event;
pub mod message;
pub mod router;

pub use event::{ArtifactKind, ChatEvent, ClientMessage, UserTurn};
pub use message::{ChatMessage, DeliveryState, MessageRole};
pub use router::{EventRouter, RouterNotice};
