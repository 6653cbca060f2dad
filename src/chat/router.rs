//! Event router — folds the inbound event stream into an ordered transcript.
//!
//! Purely reactive and single-owner: every [`ChatEvent`] maps to zero or more
//! mutations of the message log, and some events additionally raise a
//! [`RouterNotice`] side channel (artifact generation, turn completion) that
//! the draft controller consumes. Messages are appended in event-arrival
//! order; the one exception is token coalescing, where consecutive `token`
//! events for the same turn grow a single assistant buffer instead of
//! producing one message each.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::event::{ArtifactKind, ChatEvent};
use super::message::{ChatMessage, DeliveryState, MessageRole};

/// Key used for streaming events that carry no `message_id`. They still
/// coalesce with each other, they just cannot be correlated to a turn.
const UNCORRELATED: &str = "";

/// Side-channel notifications raised while folding events.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterNotice {
    /// The server opened (or resumed) a conversation.
    Connected { conversation_id: Option<String> },
    /// The assistant generated an artifact; the draft controller should
    /// materialize an editor card for it.
    ArtifactGenerated {
        kind: ArtifactKind,
        data: Value,
        message_id: Option<String>,
    },
    /// The turn finished; any open stream was finalized.
    TurnComplete { message_id: Option<String> },
}

/// The chat state machine.
#[derive(Debug, Default)]
pub struct EventRouter {
    messages: Vec<ChatMessage>,
    /// Partial assistant text per in-flight turn.
    active_streams: HashMap<String, String>,
    conversation_id: Option<String>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered, visible transcript.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Number of turns with an open streaming buffer.
    pub fn open_streams(&self) -> usize {
        self.active_streams.len()
    }

    /// Optimistically append a local user message before the server echo.
    /// Returns the generated turn id to stamp on the outgoing frame.
    pub fn push_user_message(&mut self, content: &str) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.messages
            .push(ChatMessage::pending_user(content, message_id.clone()));
        message_id
    }

    /// Mark a pending local message as unsent (socket was not open).
    pub fn mark_send_failed(&mut self, message_id: &str) {
        if let Some(msg) = self.messages.iter_mut().find(|m| {
            m.delivery == DeliveryState::Pending && m.message_id.as_deref() == Some(message_id)
        }) {
            msg.delivery = DeliveryState::SendFailed;
        }
    }

    /// Decode one raw frame and fold it in. Malformed frames are dropped
    /// with no state change.
    pub fn apply_frame(&mut self, raw: &str) -> Option<RouterNotice> {
        match ChatEvent::decode_frame(raw) {
            Some(event) => self.apply(event),
            None => {
                debug!("dropping malformed chat frame");
                None
            }
        }
    }

    /// Fold one event into the transcript.
    pub fn apply(&mut self, event: ChatEvent) -> Option<RouterNotice> {
        match event {
            ChatEvent::Connected { conversation_id } => {
                self.conversation_id = conversation_id.clone();
                Some(RouterNotice::Connected { conversation_id })
            }

            ChatEvent::UserMessage {
                content,
                message_id,
                timestamp,
            } => {
                self.confirm_or_append_user(content, message_id, timestamp);
                None
            }

            ChatEvent::LlmStart { message_id } => {
                self.active_streams
                    .insert(stream_key(&message_id), String::new());
                None
            }

            ChatEvent::Token {
                content,
                message_id,
            } => {
                // A token before llm_start still opens a buffer; partial
                // streams are tolerated.
                self.active_streams
                    .entry(stream_key(&message_id))
                    .or_default()
                    .push_str(&content);
                None
            }

            ChatEvent::LlmEnd { message_id } => {
                self.finalize_stream(&stream_key(&message_id), message_id);
                None
            }

            ChatEvent::ToolStart {
                tool_name,
                input: _,
                message_id,
            } => {
                let mut msg = ChatMessage::new(MessageRole::Tool, tool_name.clone())
                    .with_message_id(message_id);
                msg.tool_name = Some(tool_name);
                self.messages.push(msg);
                None
            }

            ChatEvent::ToolEnd {
                tool_name,
                output,
                elapsed_time: _,
                hidden,
                message_id,
            } => {
                self.close_tool_call(tool_name, output, hidden, message_id);
                None
            }

            ChatEvent::AgentAction {
                content,
                message_id,
            } => {
                self.messages
                    .push(ChatMessage::new(MessageRole::Action, content).with_message_id(message_id));
                None
            }

            ChatEvent::PlannerError { error, message_id } => {
                self.messages.push(
                    ChatMessage::new(MessageRole::Result, error)
                        .with_message_id(message_id)
                        .as_error(),
                );
                None
            }

            ChatEvent::Error { error } => {
                self.messages
                    .push(ChatMessage::new(MessageRole::Result, error).as_error());
                None
            }

            ChatEvent::ContentGenerated {
                kind,
                data,
                success,
                error,
                message_id,
            } => {
                if success {
                    Some(RouterNotice::ArtifactGenerated {
                        kind,
                        data,
                        message_id,
                    })
                } else {
                    let text = error.unwrap_or_else(|| {
                        format!("failed to generate {}", kind.as_str())
                    });
                    self.messages.push(
                        ChatMessage::new(MessageRole::Result, text)
                            .with_message_id(message_id)
                            .as_error(),
                    );
                    None
                }
            }

            ChatEvent::Complete { message_id } => {
                // Tolerate a missing llm_end: finalize whatever is still open
                // for this turn (or everything, when the event is
                // uncorrelated).
                match &message_id {
                    Some(_) => {
                        self.finalize_stream(&stream_key(&message_id), message_id.clone());
                    }
                    None => {
                        let keys: Vec<String> =
                            self.active_streams.keys().cloned().collect();
                        for key in keys {
                            let mid =
                                (!key.is_empty()).then(|| key.clone());
                            self.finalize_stream(&key, mid);
                        }
                    }
                }
                Some(RouterNotice::TurnComplete { message_id })
            }

            ChatEvent::Pong => None,

            ChatEvent::Unknown { raw } => {
                debug!(event = %raw, "ignoring unrecognized chat event");
                None
            }
        }
    }

    /// Server echo of a user message: confirm the matching pending entry
    /// instead of appending a duplicate.
    fn confirm_or_append_user(
        &mut self,
        content: String,
        message_id: Option<String>,
        timestamp: Option<String>,
    ) {
        let matched = self.messages.iter_mut().find(|m| {
            m.role == MessageRole::User
                && m.delivery == DeliveryState::Pending
                && match (&m.message_id, &message_id) {
                    (Some(ours), Some(theirs)) => ours == theirs,
                    // Uncorrelated echo: match the oldest pending entry
                    // with the same text.
                    _ => m.content == content,
                }
        });

        match matched {
            Some(msg) => {
                msg.delivery = DeliveryState::Confirmed;
                if msg.timestamp.is_none() {
                    msg.timestamp = timestamp;
                }
            }
            None => {
                self.messages.push(
                    ChatMessage::new(MessageRole::User, content)
                        .with_message_id(message_id)
                        .with_timestamp(timestamp),
                );
            }
        }
    }

    /// Close the streaming buffer for a turn and persist it as one
    /// assistant message. No-op when there is no buffer; empty buffers are
    /// discarded rather than rendered as blank messages.
    fn finalize_stream(&mut self, key: &str, message_id: Option<String>) {
        if let Some(text) = self.active_streams.remove(key) {
            if !text.is_empty() {
                self.messages.push(
                    ChatMessage::new(MessageRole::Assistant, text).with_message_id(message_id),
                );
            }
        }
    }

    /// Attach a tool's output to its running marker. Markers are keyed by
    /// turn and tool name, so the same tool running in two turns at once
    /// pairs each output with its own start. `hidden` tool calls are
    /// internal-only: their marker is removed from the visible log.
    fn close_tool_call(
        &mut self,
        tool_name: String,
        output: Option<Value>,
        hidden: bool,
        message_id: Option<String>,
    ) {
        let open_idx = self.messages.iter().rposition(|m| {
            m.role == MessageRole::Tool
                && m.tool_name.as_deref() == Some(tool_name.as_str())
                && m.message_id == message_id
                && m.tool_output.is_none()
        });

        if hidden {
            if let Some(idx) = open_idx {
                self.messages.remove(idx);
            }
            return;
        }

        match open_idx {
            Some(idx) => {
                self.messages[idx].tool_output = output;
            }
            None => {
                // tool_end without a matching tool_start; still worth showing.
                let mut msg = ChatMessage::new(MessageRole::Tool, tool_name.clone())
                    .with_message_id(message_id);
                msg.tool_name = Some(tool_name);
                msg.tool_output = output;
                self.messages.push(msg);
            }
        }
    }
}

fn stream_key(message_id: &Option<String>) -> String {
    message_id.clone().unwrap_or_else(|| UNCORRELATED.to_string())
}
