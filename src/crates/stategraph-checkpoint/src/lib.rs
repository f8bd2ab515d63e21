//! # stategraph-checkpoint - Thread-Scoped State Persistence
//!
//! Checkpoint data model and storage backends for the stategraph execution
//! engine. After every superstep the engine appends a [`Checkpoint`] holding the
//! merged channel values and the node that runs next. A thread's checkpoints are
//! strictly ordered by step and never rewritten, so any failure leaves the
//! thread resumable from its last good snapshot.
//!
//! ## Core Concepts
//!
//! ### 1. CheckpointSaver Trait
//!
//! The [`CheckpointSaver`] trait is the storage interface:
//!
//! - **`put()`** - Append a checkpoint to its thread
//! - **`get_latest()`** - Highest-step checkpoint of a thread
//! - **`list_threads()`** - Every thread with history
//! - **`get_history()`** - A thread's checkpoints in step order
//!
//! ### 2. Backends
//!
//! - [`InMemoryCheckpointSaver`] - Sharded concurrent map, for tests and short-lived processes
//! - [`SqliteCheckpointSaver`] - Append-only `(thread_id, step)` table via sqlx
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stategraph_checkpoint::{
//!     ChannelValues, Checkpoint, CheckpointSaver, SqliteCheckpointSaver,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = SqliteCheckpointSaver::connect("sqlite:memory.db").await?;
//!
//!     let mut values = ChannelValues::new();
//!     values.insert("messages".to_string(), json!([{"role": "human", "content": "hello"}]));
//!     saver.put(Checkpoint::new("thread-123", 1, values, Some("agent".into()))).await?;
//!
//!     for checkpoint in saver.get_history("thread-123").await? {
//!         println!("step {} -> {:?}", checkpoint.step, checkpoint.next_node);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Ordering
//!
//! ```text
//! thread "t1":  step 1 ──► step 2 ──► step 3      (get_latest = step 3)
//! thread "t2":  step 1                            (independent history)
//!
//! put(t1, step 3) again  ──►  StepConflict { latest: 3 }
//! ```
//!
//! Writes to different threads never contend on a shared lock; writes to the
//! same thread are serialized by the step check.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    ChannelValues, Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, ThreadId,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use sqlite::SqliteCheckpointSaver;
pub use traits::CheckpointSaver;
