//! Node handlers and the node executor
//!
//! A node's logic is a [`NodeHandler`]: given the current state, produce a
//! partial update. Handlers may call out to models and tools; the engine only
//! sees the returned update or error.
//!
//! [`NodeExecutor`] is the dispatch shim between the engine and a handler. It
//! applies the per-superstep deadline and turns handler failures into
//! [`GraphError::NodeExecution`] / [`GraphError::NodeTimeout`]. It has no retry
//! policy; a handler that wants retries or wants to report failure through state
//! does so itself.
//!
//! ```rust
//! use stategraph_core::node::{handler_fn, NodeExecutor};
//! use stategraph_core::graph::NodeSpec;
//! use stategraph_core::state::State;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let node = NodeSpec::new(
//!     "greet",
//!     handler_fn(|_state: State| async move {
//!         Ok(json!({"messages": ["hi"]}).as_object().cloned().unwrap_or_default())
//!     }),
//! );
//!
//! let update = NodeExecutor::new(None).run(&node, State::new()).await.unwrap();
//! assert_eq!(update["messages"], json!(["hi"]));
//! # }
//! ```

use crate::error::{GraphError, Result};
use crate::graph::NodeSpec;
use crate::state::{State, StateUpdate};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Error a handler may return; any error type converts into it with `?`
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of running a handler
pub type NodeResult = std::result::Result<StateUpdate, NodeError>;

/// Logic of one node
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Produce a partial update from the current state
    async fn run(&self, state: State) -> NodeResult;
}

/// Adapter turning an async closure into a [`NodeHandler`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> NodeHandler for FnHandler<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = NodeResult> + Send + 'static,
{
    async fn run(&self, state: State) -> NodeResult {
        (self.f)(state).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn NodeHandler>
where
    F: Fn(State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = NodeResult> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Runs one node against the current state
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeExecutor {
    timeout: Option<Duration>,
}

impl NodeExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invoke the node's handler, bounded by the deadline if one is set
    pub async fn run(&self, node: &NodeSpec, state: State) -> Result<StateUpdate> {
        let call = node.handler.run(state);

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GraphError::NodeTimeout {
                    node: node.name.clone(),
                    timeout_ms: limit.as_millis().try_into().unwrap_or(u64::MAX),
                }
            })?,
            None => call.await,
        };

        outcome.map_err(|cause| GraphError::node_execution(&node.name, cause.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: serde_json::Value) -> StateUpdate {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_runs_handler() {
        let node = NodeSpec::new(
            "echo",
            handler_fn(|state: State| async move {
                let input = state.get("input").cloned().unwrap_or_default();
                Ok(update(json!({"output": input})))
            }),
        );
        let mut state = State::new();
        state.insert("input".into(), json!("ping"));

        let result = NodeExecutor::default().run(&node, state).await.unwrap();
        assert_eq!(result["output"], json!("ping"));
    }

    #[tokio::test]
    async fn test_handler_error_carries_node_name() {
        let node = NodeSpec::new(
            "flaky",
            handler_fn(|_state: State| async move { Err::<StateUpdate, NodeError>("upstream 503".into()) }),
        );

        let err = NodeExecutor::default().run(&node, State::new()).await.unwrap_err();
        match err {
            GraphError::NodeExecution { node, cause } => {
                assert_eq!(node, "flaky");
                assert_eq!(cause, "upstream 503");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let node = NodeSpec::new(
            "slow",
            handler_fn(|_state: State| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(StateUpdate::new())
            }),
        );

        let executor = NodeExecutor::new(Some(Duration::from_millis(100)));
        let err = executor.run(&node, State::new()).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::NodeTimeout { ref node, timeout_ms: 100 } if node == "slow"
        ));
    }
}
