//! Storage trait for checkpoint backends
//!
//! [`CheckpointSaver`] is the only resource the execution engine shares across
//! concurrently running threads. Implementations must:
//!
//! - scope every write by thread id, so independent threads never contend on a
//!   single global lock for longer than a map lookup;
//! - treat a thread's history as append-only and strictly ordered by `step`,
//!   rejecting a write whose step does not exceed the thread's latest step with
//!   [`CheckpointError::StepConflict`](crate::CheckpointError::StepConflict);
//! - return the highest-step checkpoint from [`get_latest`](CheckpointSaver::get_latest).
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  CompiledGraph (engine loop) │
//! │  merge → route → put()       │
//! └──────────────┬───────────────┘
//!                │ CheckpointSaver
//!        ┌───────┴────────┐
//!        ▼                ▼
//!  ┌───────────┐   ┌──────────────┐
//!  │ In-memory │   │ SQLite (sqlx)│
//!  └───────────┘   └──────────────┘
//! ```
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, Result, ThreadId};
//! use async_trait::async_trait;
//! use std::collections::BTreeSet;
//!
//! struct RedisSaver { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisSaver {
//!     async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
//!         // ZADD checkpoints:{thread} NX {step} {json}
//!         todo!()
//!     }
//!
//!     async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
//!         // ZREVRANGE checkpoints:{thread} 0 0
//!         todo!()
//!     }
//!
//!     async fn list_threads(&self) -> Result<BTreeSet<ThreadId>> { todo!() }
//!     async fn get_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> { todo!() }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, ThreadId},
    error::Result,
};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Core trait for implementing checkpoint storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) to support concurrent
/// graph executions against one store.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint to its thread's history.
    ///
    /// Fails with `StepConflict` unless `checkpoint.step` is strictly greater
    /// than the thread's latest step. A stored checkpoint is never modified.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Highest-step checkpoint of a thread, or `None` for an unknown thread.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoint at an exact step.
    async fn get(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> {
        Ok(self
            .get_history(thread_id)
            .await?
            .into_iter()
            .find(|checkpoint| checkpoint.step == step))
    }

    /// Every thread with at least one checkpoint.
    async fn list_threads(&self) -> Result<BTreeSet<ThreadId>>;

    /// All checkpoints of a thread in ascending step order.
    async fn get_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;
}
