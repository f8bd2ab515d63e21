//! CompiledGraph execution engine for running stateful workflows
//!
//! Once a graph is built using [`StateGraph`](crate::StateGraph) and compiled,
//! it becomes a [`CompiledGraph`] that can run any number of threads. A thread
//! is an independent conversation or task identified by a caller-chosen id;
//! its state lives only in the checkpoint store, so a thread survives process
//! restarts when the store does.
//!
//! # Key Types
//!
//! - [`CompiledGraph`] - The executable graph runtime
//! - [`ExecutionEvent`] - Events emitted by [`CompiledGraph::stream`]
//! - [`StateSnapshot`] - Point-in-time view of a thread
//! - [`EventStream`] - Async stream of execution events
//!
//! # Execution Modes
//!
//! - `invoke` runs from the entry node to END and returns the final state.
//! - `resume` continues a thread from the node its latest checkpoint names.
//! - `stream` runs like `invoke` in a background task and yields events.
//!
//! Runs on the same thread are serialized; runs on different threads proceed
//! concurrently and never observe each other's state.

mod execution;
mod graph;
mod state;
mod streaming;
#[cfg(test)]
mod tests;
mod types;

pub use graph::CompiledGraph;
pub use types::{EventStream, ExecutionEvent, StateSnapshot};
