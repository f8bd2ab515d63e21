//! # stategraph-prebuilt - Ready-made Agents on the Graph Engine
//!
//! Agent graphs built from `stategraph-core` with the model and the tools
//! injected as capabilities:
//!
//! - **[Chat models](model)** - The [`ChatModel`] trait plus deterministic mocks
//! - **[Tools](tools)** - The [`Tool`] trait, [`ToolRegistry`] and four mock tools
//! - **[ToolNode](tool_node)** - Runs requested tool calls inside a graph
//! - **[Agents](agents)** - Chat, tool-calling and worker/evaluator graphs
//!
//! # Quick Start
//!
//! ```rust
//! use stategraph_prebuilt::{create_worker_evaluator, mock_tools, task_input};
//! use stategraph_prebuilt::model::{MockChatModel, MockEvaluatorModel};
//! use stategraph_core::EngineConfig;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = create_worker_evaluator(
//!     Arc::new(MockChatModel::new()),
//!     Arc::new(MockEvaluatorModel::new(1)),
//!     mock_tools(),
//!     EngineConfig::default(),
//! )?;
//!
//! let state = agent
//!     .invoke(task_input("Summarize Rust's ownership model", "Two sentences")?, "task-1")
//!     .await?;
//! assert_eq!(state["success_criteria_met"], true);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  stategraph-prebuilt                          │
//! │  ChatModel   Tool/ToolRegistry   ToolNode     │
//! │  chat agent  tool agent  worker/evaluator     │
//! └─────────────┬─────────────────────────────────┘
//!               │ builds
//!               ↓
//! ┌───────────────────────────────────────────────┐
//! │  stategraph-core                              │
//! │  StateGraph → CompiledGraph → checkpoints     │
//! └───────────────────────────────────────────────┘
//! ```

pub mod agents;
pub mod error;
pub mod model;
pub mod tool_node;
pub mod tools;

pub use agents::{
    create_chat_agent, create_tool_agent, create_worker_evaluator, task_input, EvaluatorOutput,
};
pub use error::{PrebuiltError, Result};
pub use model::{ChatModel, MockChatModel, MockEvaluatorModel, ScriptedChatModel};
pub use tool_node::{tools_condition, ToolNode};
pub use tools::{mock_tools, Tool, ToolRegistry};
