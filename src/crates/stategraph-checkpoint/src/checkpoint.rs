//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is an immutable snapshot of one thread's state taken after a
//! superstep, together with the name of the node that runs next. Checkpoints of a
//! thread form a strictly increasing sequence of steps; later checkpoints supersede
//! earlier ones without deleting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a checkpoint
pub type CheckpointId = String;

/// Caller-chosen identifier of an independent execution history
pub type ThreadId = String;

/// Channel name to channel value, as stored in a snapshot
pub type ChannelValues = serde_json::Map<String, Value>;

/// What produced a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written by the execution loop after a node ran
    Loop,
    /// Written by a manual state update
    Update,
    /// Copied from an earlier step of the same thread
    Fork,
}

/// Metadata attached to each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Node whose update produced this snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Identifier of the engine run that wrote the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Snapshot of a thread's state after one superstep
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Format version
    pub v: i32,

    pub id: CheckpointId,

    pub thread_id: ThreadId,

    /// Position in the thread's history, starting at 1
    pub step: u64,

    /// Value of every channel after the merge
    pub values: ChannelValues,

    /// Node about to run; `None` once the thread reached the terminal marker
    pub next_node: Option<String>,

    pub metadata: CheckpointMetadata,

    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(
        thread_id: impl Into<ThreadId>,
        step: u64,
        values: ChannelValues,
        next_node: Option<String>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            step,
            values,
            next_node,
            metadata: CheckpointMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when no node is left to run for this thread
    pub fn is_terminal(&self) -> bool {
        self.next_node.is_none()
    }
}
