//! # stategraph-core - Stateful Graph Execution with Durable Threads
//!
//! Build agent workflows as directed graphs of async nodes that read and
//! update a shared state, with every step checkpointed per conversation thread.
//!
//! ## Overview
//!
//! - **Typed state channels** - Each channel declares a value kind and a merge
//!   policy (replace, append, or a custom reducer)
//! - **Validated graphs** - [`StateGraph::compile`] rejects undeclared writes,
//!   unknown targets and unrouted nodes before anything runs
//! - **Conditional routing** - Decision functions map state to closed label sets
//! - **Durable threads** - A checkpoint after every superstep; resume, inspect,
//!   edit or rewind any thread
//! - **Bounded execution** - Step limits for cycles, deadlines for nodes
//! - **Streaming** - Real-time [`ExecutionEvent`]s for progress monitoring
//!
//! ## Core Concepts
//!
//! ### 1. State and Channels
//!
//! The state is a JSON object. Each key is a channel declared on the graph with
//! a [`ValueKind`](state::ValueKind) and a [`MergePolicy`](state::MergePolicy).
//! Nodes return partial updates; the engine merges them channel by channel.
//!
//! ### 2. Supersteps
//!
//! Exactly one node runs per superstep. Its update is merged, the node's
//! outgoing edge picks the next node (or [`END`]), and a checkpoint records the
//! merged state together with that next node.
//!
//! ```text
//!   input ──► merge ──► [entry] ──► merge ──► route ──► checkpoint ──► [next] ──► ... ──► END
//! ```
//!
//! ### 3. Threads
//!
//! A thread id names an independent history. Invoking a graph on an existing
//! thread continues from its latest checkpoint; different threads never share
//! state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stategraph_core::{StateGraph, END};
//! use stategraph_core::state::{ChannelSpec, State, ValueKind};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::new();
//! graph.add_channel("messages", ChannelSpec::append(ValueKind::Array));
//! graph.add_channel("success_criteria_met", ChannelSpec::replace(ValueKind::Bool));
//!
//! graph.add_node("worker", |_state: State| async move {
//!     Ok(json!({"messages": ["draft"]}).as_object().cloned().unwrap_or_default())
//! });
//! graph.add_node("evaluator", |state: State| async move {
//!     let drafts = state["messages"].as_array().map_or(0, |m| m.len());
//!     Ok(json!({"success_criteria_met": drafts >= 3}).as_object().cloned().unwrap_or_default())
//! });
//!
//! graph.set_entry("worker");
//! graph.add_edge("worker", "evaluator");
//! graph.add_conditional_edge(
//!     "evaluator",
//!     |state: &State| {
//!         if state.get("success_criteria_met").and_then(|v| v.as_bool()) == Some(true) {
//!             "done"
//!         } else {
//!             "retry"
//!         }
//!     },
//!     [("retry", "worker"), ("done", END)],
//! );
//!
//! let compiled = graph.compile()?;
//! let state = compiled.invoke(Default::default(), "thread-1").await?;
//! assert_eq!(state["messages"], json!(["draft", "draft", "draft"]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! Graphs keep checkpoints in memory unless given a store:
//!
//! ```rust,no_run
//! # use stategraph_core::CompiledGraph;
//! use stategraph_checkpoint::SqliteCheckpointSaver;
//! use std::sync::Arc;
//!
//! # async fn example(compiled: CompiledGraph) -> Result<(), Box<dyn std::error::Error>> {
//! let saver = SqliteCheckpointSaver::connect("sqlite:memory.db").await?;
//! let compiled = compiled.with_checkpointer(Arc::new(saver));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod messages;
pub mod node;
pub mod router;
pub mod state;
pub mod visualization;

pub use builder::StateGraph;
pub use compiled::{CompiledGraph, EventStream, ExecutionEvent, StateSnapshot};
pub use config::EngineConfig;
pub use error::{FailurePhase, GraphError, Result};
pub use graph::{Graph, NodeId, NodeSpec, Target, END, START};
pub use messages::{Message, MessageRole, ToolCall, MESSAGES_CHANNEL};
pub use node::{handler_fn, NodeError, NodeExecutor, NodeHandler, NodeResult};
pub use state::{
    AppendReducer, ChannelSpec, FnReducer, MergePolicy, Reducer, ReplaceReducer, State, StateError,
    StateSchema, StateUpdate, SumReducer, ValueKind,
};
pub use visualization::{visualize, VisualizationFormat, VisualizationOptions};

pub use stategraph_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, InMemoryCheckpointSaver,
    SqliteCheckpointSaver,
};
