//! Wire types for the chat WebSocket protocol.
//!
//! Inbound frames are JSON objects tagged by `type`. The server is free to
//! add event kinds at any time, so decoding is deliberately forgiving:
//! unrecognized tags become [`ChatEvent::Unknown`], and frames missing the
//! fields their tag requires decode to `None` and are dropped by the caller.
//! A single broken frame must never take down a live session.

use serde::Serialize;
use serde_json::Value;

/// The artifact kinds the assistant can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    WorkItem,
    Page,
    Epic,
    Cycle,
    Module,
    Feature,
    UserStory,
    Project,
}

impl ArtifactKind {
    /// Wire name, as carried in `content_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::WorkItem => "work_item",
            ArtifactKind::Page => "page",
            ArtifactKind::Epic => "epic",
            ArtifactKind::Cycle => "cycle",
            ArtifactKind::Module => "module",
            ArtifactKind::Feature => "feature",
            ArtifactKind::UserStory => "user_story",
            ArtifactKind::Project => "project",
        }
    }

    /// Parse a wire `content_type`. Unknown kinds are not representable
    /// client-side, so they decode to `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "work_item" => Some(ArtifactKind::WorkItem),
            "page" => Some(ArtifactKind::Page),
            "epic" => Some(ArtifactKind::Epic),
            "cycle" => Some(ArtifactKind::Cycle),
            "module" => Some(ArtifactKind::Module),
            "feature" => Some(ArtifactKind::Feature),
            "user_story" => Some(ArtifactKind::UserStory),
            "project" => Some(ArtifactKind::Project),
            _ => None,
        }
    }
}

/// An inbound server event, decoded from one WebSocket frame.
///
/// Events that belong to a turn share a `message_id`; events without one are
/// not correlated to any in-flight turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Connected {
        conversation_id: Option<String>,
    },
    UserMessage {
        content: String,
        message_id: Option<String>,
        timestamp: Option<String>,
    },
    LlmStart {
        message_id: Option<String>,
    },
    Token {
        content: String,
        message_id: Option<String>,
    },
    LlmEnd {
        message_id: Option<String>,
    },
    ToolStart {
        tool_name: String,
        input: Option<Value>,
        message_id: Option<String>,
    },
    ToolEnd {
        tool_name: String,
        output: Option<Value>,
        elapsed_time: Option<f64>,
        hidden: bool,
        message_id: Option<String>,
    },
    PlannerError {
        error: String,
        message_id: Option<String>,
    },
    AgentAction {
        content: String,
        message_id: Option<String>,
    },
    ContentGenerated {
        kind: ArtifactKind,
        data: Value,
        success: bool,
        error: Option<String>,
        message_id: Option<String>,
    },
    Complete {
        message_id: Option<String>,
    },
    Pong,
    Error {
        error: String,
    },
    /// Forward-compatibility: an event kind this client does not know.
    /// The router ignores these; the raw payload is kept for diagnostics.
    Unknown {
        raw: Value,
    },
}

impl ChatEvent {
    /// Decode a raw text frame. `None` means the frame is malformed
    /// (not JSON, not an object, no `type`, or missing a required field)
    /// and must be silently dropped.
    pub fn decode_frame(raw: &str) -> Option<ChatEvent> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Option<ChatEvent> {
        let obj = value.as_object()?;
        let kind = obj.get("type")?.as_str()?.to_string();

        let message_id = str_field(&value, "message_id");

        let event = match kind.as_str() {
            "connected" => ChatEvent::Connected {
                conversation_id: str_field(&value, "conversation_id"),
            },
            "user_message" => ChatEvent::UserMessage {
                content: str_field(&value, "content")?,
                message_id,
                timestamp: str_field(&value, "timestamp"),
            },
            "llm_start" => ChatEvent::LlmStart { message_id },
            "token" => ChatEvent::Token {
                content: str_field(&value, "content")?,
                message_id,
            },
            "llm_end" => ChatEvent::LlmEnd { message_id },
            "tool_start" => ChatEvent::ToolStart {
                tool_name: str_field(&value, "tool_name")?,
                input: obj.get("input").cloned(),
                message_id,
            },
            "tool_end" => ChatEvent::ToolEnd {
                tool_name: str_field(&value, "tool_name")?,
                output: obj.get("output").cloned(),
                elapsed_time: obj.get("elapsed_time").and_then(Value::as_f64),
                hidden: obj.get("hidden").and_then(Value::as_bool).unwrap_or(false),
                message_id,
            },
            "planner_error" => ChatEvent::PlannerError {
                error: str_field(&value, "error").or_else(|| str_field(&value, "content"))?,
                message_id,
            },
            "agent_action" => ChatEvent::AgentAction {
                content: str_field(&value, "content")?,
                message_id,
            },
            "content_generated" => {
                let kind = ArtifactKind::from_wire(&str_field(&value, "content_type")?)?;
                ChatEvent::ContentGenerated {
                    kind,
                    data: obj.get("data").cloned().unwrap_or(Value::Null),
                    success: obj.get("success").and_then(Value::as_bool).unwrap_or(true),
                    error: str_field(&value, "error"),
                    message_id,
                }
            }
            "complete" => ChatEvent::Complete { message_id },
            "pong" => ChatEvent::Pong,
            "error" => ChatEvent::Error {
                error: str_field(&value, "error").or_else(|| str_field(&value, "content"))?,
            },
            _ => ChatEvent::Unknown { raw: value },
        };
        Some(event)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

// ── Outbound ──

/// A user-turn submission, the only substantive client→server frame.
#[derive(Debug, Clone, Serialize)]
pub struct UserTurn {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Client→server frames.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Keep-alive, sent on a fixed interval while connected.
    Ping,
    Turn(UserTurn),
}

impl ClientMessage {
    /// Serialize to the wire shape. Ping is a bare `{"type":"ping"}`;
    /// turns serialize their fields flat.
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Ping => r#"{"type":"ping"}"#.to_string(),
            // UserTurn has no serializable failure mode (strings and bools only).
            ClientMessage::Turn(turn) => {
                serde_json::to_string(turn).unwrap_or_else(|_| String::new())
            }
        }
    }
}
