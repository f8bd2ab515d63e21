//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// A write would not extend the thread's history.
    ///
    /// Checkpoints are append-only and strictly ordered by step; a second
    /// writer advancing the same thread, or a replayed write, lands here.
    #[error("Checkpoint step {step} for thread '{thread_id}' does not follow latest step {latest}")]
    StepConflict {
        thread_id: String,
        step: u64,
        latest: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from the SQLite backend
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),
}

impl CheckpointError {
    pub fn step_conflict(thread_id: impl Into<String>, step: u64, latest: u64) -> Self {
        Self::StepConflict {
            thread_id: thread_id.into(),
            step,
            latest,
        }
    }
}
