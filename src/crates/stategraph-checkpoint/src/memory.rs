//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's history in a sharded
//! concurrent map. Writes to different threads land on independent shards, so
//! concurrent conversations do not serialize behind one lock.
//!
//! ```text
//! DashMap<ThreadId, Vec<Checkpoint>>
//!   "session-1" → [step 1, step 2, step 3]
//!   "session-2" → [step 1]
//! ```
//!
//! Data is lost when the process exits; use
//! [`SqliteCheckpointSaver`](crate::SqliteCheckpointSaver) for durable threads.
//!
//! # Example
//!
//! ```rust
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, ChannelValues, InMemoryCheckpointSaver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!     saver.put(Checkpoint::new("session-1", 1, ChannelValues::new(), None)).await?;
//!
//!     let latest = saver.get_latest("session-1").await?;
//!     assert_eq!(latest.map(|c| c.step), Some(1));
//!     Ok(())
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, ThreadId},
    error::{CheckpointError, Result},
    traits::CheckpointSaver,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<DashMap<ThreadId, Vec<Checkpoint>>>;

/// In-memory checkpoint saver implementation
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut entries = self
            .storage
            .entry(checkpoint.thread_id.clone())
            .or_default();

        if let Some(latest) = entries.last() {
            if checkpoint.step <= latest.step {
                return Err(CheckpointError::step_conflict(
                    checkpoint.thread_id,
                    checkpoint.step,
                    latest.step,
                ));
            }
        }

        tracing::trace!(thread_id = %checkpoint.thread_id, step = checkpoint.step, "Stored checkpoint");
        entries.push(checkpoint);
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .storage
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn get(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> {
        Ok(self.storage.get(thread_id).and_then(|entries| {
            entries
                .binary_search_by_key(&step, |c| c.step)
                .ok()
                .map(|idx| entries[idx].clone())
        }))
    }

    async fn list_threads(&self) -> Result<BTreeSet<ThreadId>> {
        Ok(self
            .storage
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn get_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .storage
            .get(thread_id)
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ChannelValues;
    use serde_json::json;

    fn checkpoint(thread: &str, step: u64) -> Checkpoint {
        let mut values = ChannelValues::new();
        values.insert("step".to_string(), json!(step));
        Checkpoint::new(thread, step, values, Some("agent".to_string()))
    }

    #[tokio::test]
    async fn test_save_and_load_latest() {
        let saver = InMemoryCheckpointSaver::new();
        saver.put(checkpoint("thread-1", 1)).await.unwrap();
        saver.put(checkpoint("thread-1", 2)).await.unwrap();

        let latest = saver.get_latest("thread-1").await.unwrap().unwrap();
        assert_eq!(latest.step, 2);
        assert_eq!(latest.values["step"], json!(2));
    }

    #[tokio::test]
    async fn test_get_latest_is_idempotent() {
        let saver = InMemoryCheckpointSaver::new();
        saver.put(checkpoint("thread-1", 1)).await.unwrap();

        let first = saver.get_latest("thread-1").await.unwrap();
        let second = saver.get_latest("thread-1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let saver = InMemoryCheckpointSaver::new();
        assert!(saver.get_latest("missing").await.unwrap().is_none());
        assert!(saver.get_history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_increasing_step() {
        let saver = InMemoryCheckpointSaver::new();
        saver.put(checkpoint("thread-1", 2)).await.unwrap();

        let same = saver.put(checkpoint("thread-1", 2)).await;
        assert!(matches!(same, Err(CheckpointError::StepConflict { latest: 2, .. })));

        let older = saver.put(checkpoint("thread-1", 1)).await;
        assert!(matches!(older, Err(CheckpointError::StepConflict { step: 1, .. })));

        // Rejected writes leave history untouched
        assert_eq!(saver.get_history("thread-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_thread_id() {
        let saver = InMemoryCheckpointSaver::new();
        let result = saver.put(checkpoint("", 1)).await;
        assert!(matches!(result, Err(CheckpointError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_history_and_get_by_step() {
        let saver = InMemoryCheckpointSaver::new();
        for step in 1..=3 {
            saver.put(checkpoint("thread-1", step)).await.unwrap();
        }

        let history = saver.get_history("thread-1").await.unwrap();
        let steps: Vec<u64> = history.iter().map(|c| c.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);

        let second = saver.get("thread-1", 2).await.unwrap().unwrap();
        assert_eq!(second.values["step"], json!(2));
        assert!(saver.get("thread-1", 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let saver = InMemoryCheckpointSaver::new();
        saver.put(checkpoint("thread-1", 1)).await.unwrap();
        saver.put(checkpoint("thread-2", 1)).await.unwrap();
        saver.put(checkpoint("thread-2", 2)).await.unwrap();

        let threads = saver.list_threads().await.unwrap();
        assert_eq!(threads.into_iter().collect::<Vec<_>>(), vec!["thread-1", "thread-2"]);

        let history = saver.get_history("thread-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history.iter().all(|c| c.thread_id == "thread-1"));
        assert_eq!(saver.get_history("thread-2").await.unwrap().len(), 2);
    }
}
