//! Chat model capability consumed by agent nodes
//!
//! Agents never talk to a provider directly. They hold an
//! `Arc<dyn ChatModel>` passed in at construction, so the same graph runs
//! against a hosted model in production and a scripted one in tests.
//!
//! ```rust
//! use stategraph_prebuilt::model::{ChatModel, MockChatModel};
//! use stategraph_core::Message;
//!
//! # #[tokio::main]
//! # async fn main() -> stategraph_prebuilt::Result<()> {
//! let model = MockChatModel::new();
//! let reply = model.generate(&[Message::human("hello")]).await?;
//! assert_eq!(reply.content, "Mock response to: hello");
//! # Ok(())
//! # }
//! ```

use crate::error::{PrebuiltError, Result};
use async_trait::async_trait;
use serde_json::json;
use stategraph_core::{Message, MessageRole};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Produces the next message of a conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a reply to `messages`
    async fn generate(&self, messages: &[Message]) -> Result<Message>;

    /// Name used in logs
    fn name(&self) -> &str {
        "chat-model"
    }
}

/// Replies "Mock response to: <last human message>"
#[derive(Debug, Default)]
pub struct MockChatModel;

impl MockChatModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(&self, messages: &[Message]) -> Result<Message> {
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Human)
            .map_or("", |message| message.content.as_str());
        Ok(Message::ai(format!("Mock response to: {}", prompt)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Replays a fixed queue of replies and records every prompt it saw
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Message>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedChatModel {
    pub fn new(replies: impl IntoIterator<Item = Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Script of plain AI text replies
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|text| Message::ai(text)))
    }

    /// Prompts received so far, oldest first
    pub async fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, messages: &[Message]) -> Result<Message> {
        self.prompts.lock().await.push(messages.to_vec());
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| PrebuiltError::model("scripted model has no replies left"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Evaluator stand-in: rejects the first `accept_after - 1` answers, then
/// accepts, replying with evaluator JSON
#[derive(Debug)]
pub struct MockEvaluatorModel {
    accept_after: usize,
    calls: AtomicUsize,
}

impl MockEvaluatorModel {
    pub fn new(accept_after: usize) -> Self {
        Self {
            accept_after: accept_after.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockEvaluatorModel {
    async fn generate(&self, _messages: &[Message]) -> Result<Message> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let accepted = call >= self.accept_after;
        let feedback = if accepted {
            "The answer meets the success criteria.".to_string()
        } else {
            format!("Attempt {} is incomplete; address every part of the criteria.", call)
        };
        let reply = json!({
            "feedback": feedback,
            "success_criteria_met": accepted,
            "user_input_needed": false,
        });
        Ok(Message::ai(reply.to_string()))
    }

    fn name(&self) -> &str {
        "mock-evaluator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_uses_last_human_message() {
        let model = MockChatModel::new();
        let reply = model
            .generate(&[
                Message::system("be brief"),
                Message::human("first"),
                Message::ai("ok"),
                Message::human("second"),
            ])
            .await
            .unwrap();
        assert_eq!(reply.role, MessageRole::Ai);
        assert_eq!(reply.content, "Mock response to: second");
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let model = ScriptedChatModel::from_texts(["one", "two"]);
        assert_eq!(model.generate(&[]).await.unwrap().content, "one");
        assert_eq!(
            model.generate(&[Message::human("x")]).await.unwrap().content,
            "two"
        );
        assert!(matches!(
            model.generate(&[]).await,
            Err(PrebuiltError::Model(_))
        ));

        let prompts = model.prompts().await;
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[1][0].content, "x");
        assert_eq!(model.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_mock_evaluator_accepts_on_schedule() {
        let model = MockEvaluatorModel::new(2);
        let first: serde_json::Value =
            serde_json::from_str(&model.generate(&[]).await.unwrap().content).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&model.generate(&[]).await.unwrap().content).unwrap();
        assert_eq!(first["success_criteria_met"], json!(false));
        assert_eq!(second["success_criteria_met"], json!(true));
        assert_eq!(model.calls(), 2);
    }
}
