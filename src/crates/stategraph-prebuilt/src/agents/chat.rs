//! Chat agents - A model answering over a persisted message history
//!
//! Two shapes:
//!
//! ```text
//! create_chat_agent:   START ──► agent ──► END
//!
//! create_tool_agent:   START ──► agent ──tools──► tools
//!                                  ▲                │
//!                                  └────────────────┘
//!                                  │
//!                                  └──end──► END
//! ```
//!
//! Both keep the conversation in the `messages` channel, so invoking again on
//! the same thread continues the conversation.
//!
//! ```rust
//! use stategraph_prebuilt::{create_chat_agent, MockChatModel};
//! use stategraph_core::{messages, EngineConfig, Message, MESSAGES_CHANNEL};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = create_chat_agent(Arc::new(MockChatModel::new()), EngineConfig::default())?;
//!
//! let input = messages::append_update(MESSAGES_CHANNEL, vec![Message::human("hello")])?;
//! let state = agent.invoke(input, "thread-1").await?;
//!
//! let history = messages::from_state(&state, MESSAGES_CHANNEL)?;
//! assert_eq!(history[1].content, "Mock response to: hello");
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::model::ChatModel;
use crate::tool_node::{tools_condition, ToolNode, END_LABEL, TOOLS_LABEL};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use stategraph_core::messages::{self, Message, MessageRole, MESSAGES_CHANNEL};
use stategraph_core::node::{NodeHandler, NodeResult};
use stategraph_core::state::State;
use stategraph_core::{CompiledGraph, EngineConfig, StateGraph, END};
use std::sync::Arc;

/// Node name of the model step
pub const AGENT_NODE: &str = "agent";

/// Node name of the tool step
pub const TOOLS_NODE: &str = "tools";

/// Node that sends the history to a model and appends the reply
pub struct AgentNode {
    model: Arc<dyn ChatModel>,
    system_prompt: Option<String>,
}

impl AgentNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system_prompt: None,
        }
    }

    /// Prefix every prompt with a system message; it is never stored in state
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn prompt(&self, history: Vec<Message>) -> Vec<Message> {
        match &self.system_prompt {
            Some(system) => with_system_message(history, system),
            None => history,
        }
    }
}

#[async_trait]
impl NodeHandler for AgentNode {
    async fn run(&self, state: State) -> NodeResult {
        let history = messages::from_state(&state, MESSAGES_CHANNEL)?;
        let reply = self.model.generate(&self.prompt(history)).await?;
        tracing::debug!(
            model = self.model.name(),
            tool_calls = reply.tool_calls.len(),
            "Model replied"
        );
        Ok(messages::append_update(MESSAGES_CHANNEL, vec![reply])?)
    }
}

/// Replace the first system message's content, or put one in front
pub(crate) fn with_system_message(mut history: Vec<Message>, content: &str) -> Vec<Message> {
    match history
        .iter_mut()
        .find(|message| message.role == MessageRole::System)
    {
        Some(system) => system.content = content.to_string(),
        None => history.insert(0, Message::system(content)),
    }
    history
}

/// Multi-turn chat: one model step per invocation
pub fn create_chat_agent(model: Arc<dyn ChatModel>, config: EngineConfig) -> Result<CompiledGraph> {
    build_chat_agent(AgentNode::new(model), config)
}

/// [`create_chat_agent`] with an explicit agent node, e.g. one carrying a system prompt
pub fn build_chat_agent(agent: AgentNode, config: EngineConfig) -> Result<CompiledGraph> {
    let mut graph = StateGraph::with_messages();
    graph
        .add_node_handler(AGENT_NODE, Arc::new(agent))
        .declare_writes(AGENT_NODE, [MESSAGES_CHANNEL])
        .set_entry(AGENT_NODE)
        .add_finish(AGENT_NODE);
    Ok(graph.compile_with_config(config)?)
}

/// Search-then-respond loop: the agent calls tools until it answers directly
pub fn create_tool_agent(
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    config: EngineConfig,
) -> Result<CompiledGraph> {
    let mut graph = StateGraph::with_messages();
    graph
        .add_node_handler(AGENT_NODE, Arc::new(AgentNode::new(model)))
        .add_node_handler(TOOLS_NODE, Arc::new(ToolNode::new(tools)))
        .declare_writes(AGENT_NODE, [MESSAGES_CHANNEL])
        .declare_writes(TOOLS_NODE, [MESSAGES_CHANNEL])
        .set_entry(AGENT_NODE)
        .add_conditional_edge(
            AGENT_NODE,
            tools_condition,
            [(TOOLS_LABEL, TOOLS_NODE), (END_LABEL, END)],
        )
        .add_edge(TOOLS_NODE, AGENT_NODE);
    Ok(graph.compile_with_config(config)?)
}
