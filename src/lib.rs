//! Flowdesk — the chat-driven artifact-creation core of a project-management
//! client.
//!
//! A WebSocket transport streams assistant events; the chat router folds them
//! into an ordered transcript and raises artifact notices; the draft
//! controller turns those notices into editable artifact cards backed by a
//! TTL'd per-project reference-data cache.

pub mod api;
pub mod cache;
pub mod chat;
pub mod config;
pub mod draft;
pub mod selector;
pub mod transport;
