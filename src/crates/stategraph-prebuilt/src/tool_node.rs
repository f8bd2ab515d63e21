//! ToolNode - Graph Node for Tool Execution
//!
//! [`ToolNode`] bridges model tool calling and actual tool execution. Put it
//! behind an agent node and route to it with [`tools_condition`]:
//!
//! ```text
//!   agent ──tools──► tools ──► agent
//!     │
//!     └──end──► END
//! ```
//!
//! When it runs, the node:
//! 1. Finds the last AI message in the `messages` channel
//! 2. Runs every tool call of that message concurrently
//! 3. Appends one tool message per call, in call order, answering its `id`
//!
//! # Error Handling
//!
//! | Setting | Failed tool call |
//! |---------|------------------|
//! | `with_error_handling(true)` (default) | Tool message `"Error: ..."` the model can react to |
//! | `with_error_handling(false)` | The node fails and the run stops with `NodeExecution` |
//!
//! ```rust
//! use stategraph_prebuilt::{mock_tools, tool_node::ToolNode};
//! use stategraph_core::StateGraph;
//! use std::sync::Arc;
//!
//! let mut graph = StateGraph::with_messages();
//! graph.add_node_handler("tools", Arc::new(ToolNode::new(mock_tools())));
//! ```

use crate::error::Result;
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use stategraph_core::messages::{self, Message, ToolCall, MESSAGES_CHANNEL};
use stategraph_core::node::{NodeHandler, NodeResult};
use stategraph_core::state::State;
use std::sync::Arc;

/// Label [`tools_condition`] returns when the model asked for tools
pub const TOOLS_LABEL: &str = "tools";

/// Label [`tools_condition`] returns when the model answered directly
pub const END_LABEL: &str = "end";

/// ToolNode executes the tool calls of the latest AI message
#[derive(Clone, Debug)]
pub struct ToolNode {
    registry: Arc<ToolRegistry>,

    /// Report tool failures as messages instead of failing the node
    handle_tool_errors: bool,

    channel: String,
}

impl ToolNode {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            handle_tool_errors: true,
            channel: MESSAGES_CHANNEL.to_string(),
        }
    }

    /// Set whether to handle tool errors gracefully (default: true)
    pub fn with_error_handling(mut self, handle_errors: bool) -> Self {
        self.handle_tool_errors = handle_errors;
        self
    }

    /// Read and append to a message channel other than `messages`
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the pending tool calls found in `state` and return the tool messages
    pub async fn execute(&self, state: &State) -> Result<Vec<Message>> {
        let history = messages::from_state(state, &self.channel)?;
        let calls = pending_tool_calls(&history);
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(calls = calls.len(), "Executing tool calls");

        let runs = calls.into_iter().map(|call| {
            let registry = Arc::clone(&self.registry);
            async move {
                let result = registry.invoke(&call.name, call.args.clone()).await;
                (call, result)
            }
        });

        futures::future::join_all(runs)
            .await
            .into_iter()
            .map(|(call, result)| self.tool_message(call, result))
            .collect()
    }

    fn tool_message(&self, call: ToolCall, result: Result<String>) -> Result<Message> {
        let content = match result {
            Ok(output) => output,
            Err(e) if self.handle_tool_errors => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                format!("Error: {}", e)
            }
            Err(e) => return Err(e),
        };
        Ok(Message::tool(content, call.id).with_name(call.name))
    }
}

#[async_trait]
impl NodeHandler for ToolNode {
    async fn run(&self, state: State) -> NodeResult {
        let results = self.execute(&state).await?;
        Ok(messages::append_update(&self.channel, results)?)
    }
}

/// Tool calls of the last AI message, if any
fn pending_tool_calls(history: &[Message]) -> Vec<ToolCall> {
    history
        .iter()
        .rev()
        .find(|message| message.role == messages::MessageRole::Ai)
        .map(|message| message.tool_calls.clone())
        .unwrap_or_default()
}

/// Route after an agent node: [`TOOLS_LABEL`] if its last message requested
/// tools, otherwise [`END_LABEL`]
pub fn tools_condition(state: &State) -> &'static str {
    let requested = messages::from_state(state, MESSAGES_CHANNEL)
        .ok()
        .and_then(|history| history.last().map(Message::has_tool_calls))
        .unwrap_or(false);

    if requested {
        TOOLS_LABEL
    } else {
        END_LABEL
    }
}

impl From<ToolRegistry> for ToolNode {
    fn from(registry: ToolRegistry) -> Self {
        Self::new(registry)
    }
}
