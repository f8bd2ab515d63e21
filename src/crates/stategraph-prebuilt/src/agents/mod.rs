//! Prebuilt agent graphs
//!
//! | Agent | Topology | Use for |
//! |-------|----------|---------|
//! | [`create_chat_agent`] | `agent → END` | Multi-turn chat with memory per thread |
//! | [`create_tool_agent`] | `agent ⇄ tools` | Answers that need lookups or calculations |
//! | [`create_worker_evaluator`] | `worker ⇄ tools`, `worker → evaluator → worker/END` | Tasks with explicit success criteria |
//!
//! Every constructor takes its models and tools as arguments and returns a
//! [`CompiledGraph`](stategraph_core::CompiledGraph) with the in-memory
//! checkpointer; swap it with `with_checkpointer` for durable threads.

pub mod chat;
pub mod worker_evaluator;

pub use chat::{build_chat_agent, create_chat_agent, create_tool_agent, AgentNode};
pub use worker_evaluator::{
    create_worker_evaluator, format_conversation, route_after_evaluation, task_input,
    EvaluatorNode, EvaluatorOutput, WorkerNode,
};
