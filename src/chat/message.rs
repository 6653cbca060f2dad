//! Client-materialized transcript records.
//!
//! A [`ChatMessage`] is what the UI renders; it is built by the router from
//! the wire events and is never sent back over the socket.

use serde_json::Value;
use uuid::Uuid;

/// Who (or what) a transcript entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    /// Transient reasoning summary, visually de-emphasized.
    Thought,
    /// A tool invocation and its output.
    Tool,
    /// Lightweight "in progress" marker from the agent.
    Action,
    /// Terminal status of a turn, success or failure.
    Result,
}

/// Delivery state for optimistically appended user messages.
///
/// A locally sent turn is `Pending` until the server echoes it back as a
/// `user_message` event; everything server-originated is born `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Confirmed,
    /// The socket was not open at send time. The UI may offer a resend.
    SendFailed,
}

/// One entry in the ordered transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: Option<String>,
    pub tool_name: Option<String>,
    pub tool_output: Option<Value>,
    pub is_error: bool,
    pub delivery: DeliveryState,
    /// Turn correlation, when the triggering event carried one.
    pub message_id: Option<String>,
}

impl ChatMessage {
    /// A server-originated message with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: None,
            tool_name: None,
            tool_output: None,
            is_error: false,
            delivery: DeliveryState::Confirmed,
            message_id: None,
        }
    }

    /// An optimistically appended local user message.
    pub fn pending_user(content: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            delivery: DeliveryState::Pending,
            message_id: Some(message_id.into()),
            ..Self::new(MessageRole::User, content)
        }
    }

    pub fn with_message_id(mut self, message_id: Option<String>) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark as a failure surface (result messages from error events).
    pub fn as_error(mut self) -> Self {
        self.is_error = true;
        self
    }
}
