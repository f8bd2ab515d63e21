//! Error Types - Prebuilt Component Errors
//!
//! # Error Categories
//!
//! - **Tool Errors** - Unknown tools, bad arguments, failed invocations
//! - **Model Errors** - A chat model could not produce a reply
//! - **Graph Errors** - Underlying graph build or execution errors
//!
//! # Example
//!
//! ```rust
//! use stategraph_prebuilt::{PrebuiltError, Result};
//!
//! fn lookup(name: &str) -> Result<String> {
//!     Err(PrebuiltError::ToolNotFound(name.to_string()))
//! }
//!
//! match lookup("browser") {
//!     Ok(result) => println!("Success: {}", result),
//!     Err(PrebuiltError::ToolNotFound(name)) => eprintln!("no tool named {}", name),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// Result type for prebuilt operations
pub type Result<T> = std::result::Result<T, PrebuiltError>;

/// Errors that can occur in prebuilt components
#[derive(Error, Debug)]
pub enum PrebuiltError {
    /// No tool registered under this name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution error
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Invalid tool input
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    /// The chat model failed to reply
    #[error("Model error: {0}")]
    Model(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph error
    #[error("Graph error: {0}")]
    Graph(#[from] stategraph_core::GraphError),
}

impl PrebuiltError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}
