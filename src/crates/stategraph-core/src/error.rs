//! Error types and error handling for graph operations
//!
//! Every failure the engine can report is a [`GraphError`]. Variants fall into
//! two phases, exposed through [`GraphError::phase`]:
//!
//! ```text
//! GraphError
//! ├── Configuration phase (fix the graph; never expected in production)
//! │   ├── Configuration       - undeclared channel writes, bad config values
//! │   └── GraphDefinition     - invalid node/edge wiring found by compile()
//! └── Runtime phase (expected occasionally; thread stays resumable)
//!     ├── NodeExecution       - a handler returned an error
//!     ├── Routing             - decision function produced an unmapped label
//!     ├── StepLimitExceeded   - a cycle ran past the configured maximum
//!     ├── NodeTimeout         - a handler exceeded its deadline
//!     ├── ThreadNotFound      - resume/inspect of a thread with no checkpoint
//!     ├── State               - a merge policy rejected a value
//!     ├── Checkpoint          - persistence failures
//!     └── Serialization / Yaml / Io
//! ```
//!
//! Checkpoints are appended strictly after a successful merge and routing
//! decision, so none of these failures can corrupt a previously committed
//! checkpoint. A runtime failure leaves the thread at its last good state.
//!
//! # Matching Specific Errors
//!
//! ```rust
//! use stategraph_core::error::{FailurePhase, GraphError};
//!
//! fn report(err: &GraphError) -> String {
//!     match err {
//!         GraphError::NodeExecution { node, cause } => format!("{} failed: {}", node, cause),
//!         GraphError::StepLimitExceeded { limit, .. } => format!("gave up after {} steps", limit),
//!         _ if err.phase() == FailurePhase::Configuration => format!("bad graph: {}", err),
//!         _ => err.to_string(),
//!     }
//! }
//! ```

use crate::state::StateError;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Whether a failure was caused by how the graph was defined or by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// Detected while building or validating; retrying cannot help
    Configuration,
    /// Detected while executing; the thread is resumable
    Runtime,
}

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// A write or input names a channel the graph never declared, or engine
    /// configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node/edge wiring is invalid; `compile()` never yields a partial graph
    #[error("Graph definition error: {0}")]
    GraphDefinition(String),

    /// A node handler returned an error
    #[error("Node '{node}' execution failed: {cause}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from the handler
        cause: String,
    },

    /// A decision function returned a label missing from its label map
    #[error("Routing from node '{node}' failed: label '{label}' is not mapped")]
    Routing { node: String, label: String },

    /// The run executed `limit` nodes without reaching the terminal marker
    #[error("Step limit of {limit} exceeded at thread step {step}")]
    StepLimitExceeded {
        limit: usize,
        /// Step of the last checkpoint written before giving up
        step: u64,
    },

    /// A node handler did not finish within the per-superstep deadline
    #[error("Node '{node}' timed out after {timeout_ms}ms")]
    NodeTimeout { node: String, timeout_ms: u64 },

    /// The thread has no checkpoint to resume or inspect
    #[error("Thread '{0}' has no checkpoint")]
    ThreadNotFound(String),

    /// A merge policy rejected an update
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] stategraph_checkpoint::CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error while loading configuration
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create a node execution error with context
    ///
    /// ```rust
    /// use stategraph_core::error::GraphError;
    ///
    /// let err = GraphError::node_execution("llm_call", "API timeout");
    /// assert_eq!(err.to_string(), "Node 'llm_call' execution failed: API timeout");
    /// ```
    pub fn node_execution(node: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            cause: cause.into(),
        }
    }

    pub fn routing(node: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            label: label.into(),
        }
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::GraphDefinition(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classify the failure as configuration-time or run-time
    pub fn phase(&self) -> FailurePhase {
        match self {
            Self::Configuration(_) | Self::GraphDefinition(_) => FailurePhase::Configuration,
            _ => FailurePhase::Runtime,
        }
    }

    /// True when re-invoking with the same thread id is safe and may succeed.
    ///
    /// Routing errors are logic bugs in a decision function; re-running will
    /// hit the same label again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NodeExecution { .. }
                | Self::NodeTimeout { .. }
                | Self::StepLimitExceeded { .. }
                | Self::Checkpoint(_)
                | Self::Io(_)
        )
    }
}
