//! Chat message model for message-history channels
//!
//! Conversation history lives in an append channel of kind
//! [`ValueKind::Messages`](crate::state::ValueKind::Messages): a JSON array of
//! [`Message`] objects. Helpers here convert between that channel value and
//! typed messages so node handlers do not hand-roll JSON.
//!
//! ```rust
//! use stategraph_core::messages::{self, Message};
//! use stategraph_core::state::State;
//!
//! let mut state = State::new();
//! state.insert("messages".into(), messages::to_value(&[Message::human("hello")]).unwrap());
//!
//! let history = messages::from_state(&state, "messages").unwrap();
//! assert_eq!(history[0].content, "hello");
//!
//! let update = messages::append_update("messages", vec![Message::ai("hi")]).unwrap();
//! assert!(update.contains_key("messages"));
//! ```

use crate::state::{State, StateUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default name of the message-history channel
pub const MESSAGES_CHANNEL: &str = "messages";

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions or context for the model
    System,
    #[serde(alias = "user")]
    Human,
    #[serde(alias = "assistant")]
    Ai,
    /// Result of a tool invocation
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Associates the tool's result message with this call
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls (for AI messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Tool call ID (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Ai, content)
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// True for an AI message that asks for at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        self.role == MessageRole::Ai && !self.tool_calls.is_empty()
    }
}

/// Serialize messages into a channel value
pub fn to_value(messages: &[Message]) -> serde_json::Result<Value> {
    serde_json::to_value(messages)
}

/// Read a message channel; an absent channel is an empty history
pub fn from_state(state: &State, channel: &str) -> serde_json::Result<Vec<Message>> {
    match state.get(channel) {
        Some(value) if !value.is_null() => Vec::<Message>::deserialize(value),
        _ => Ok(Vec::new()),
    }
}

/// Partial update appending `messages` to `channel`
pub fn append_update(channel: &str, messages: Vec<Message>) -> serde_json::Result<StateUpdate> {
    let mut update = StateUpdate::new();
    update.insert(channel.to_string(), to_value(&messages)?);
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let message = Message::ai("hi").with_id("m1");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"id": "m1", "role": "ai", "content": "hi"}));
    }

    #[test]
    fn test_role_aliases() {
        let message: Message =
            serde_json::from_value(json!({"role": "assistant", "content": "ok"})).unwrap();
        assert_eq!(message.role, MessageRole::Ai);

        let message: Message =
            serde_json::from_value(json!({"role": "user", "content": "hey"})).unwrap();
        assert_eq!(message.role, MessageRole::Human);
    }

    #[test]
    fn test_state_round_trip() {
        let history = vec![Message::human("hello"), Message::ai("hi")];
        let mut state = State::new();
        state.insert(MESSAGES_CHANNEL.into(), to_value(&history).unwrap());

        let restored = from_state(&state, MESSAGES_CHANNEL).unwrap();
        assert_eq!(restored, history);
        assert!(from_state(&State::new(), MESSAGES_CHANNEL).unwrap().is_empty());
    }

    #[test]
    fn test_tool_calls() {
        let call = ToolCall::new("search", json!({"query": "rust"}));
        let message = Message::ai("").with_tool_calls(vec![call.clone()]);
        assert!(message.has_tool_calls());

        let result = Message::tool("found it", call.id.clone());
        assert_eq!(result.tool_call_id.as_deref(), Some(call.id.as_str()));
        assert!(!result.has_tool_calls());
    }
}
