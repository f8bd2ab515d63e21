//! Type definitions for compiled graph execution

use crate::state::State;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use stategraph_checkpoint::{Checkpoint, CheckpointMetadata};
use std::pin::Pin;

/// Events emitted while a streamed run executes
///
/// Events arrive in execution order:
///
/// ```text
/// NodeStart → NodeEnd → CheckpointSaved → NodeStart → ... → Completed
///                                                         └─→ Failed
/// ```
///
/// `Completed` or `Failed` is always the last event of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A node is about to run
    NodeStart { node: String, step: u64 },

    /// A node returned; `update` is its partial update before merging
    NodeEnd {
        node: String,
        step: u64,
        update: State,
    },

    /// A checkpoint was durably written
    CheckpointSaved {
        step: u64,
        next_node: Option<String>,
    },

    /// The run reached END
    Completed { state: State },

    /// The run failed; `error` is the rendered [`GraphError`](crate::GraphError)
    Failed { error: String },
}

impl ExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::Completed { .. } | ExecutionEvent::Failed { .. })
    }
}

/// Stream of execution events
pub type EventStream = Pin<Box<dyn Stream<Item = ExecutionEvent> + Send>>;

/// Point-in-time view of a thread, built from one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub thread_id: String,

    /// Merged channel values
    pub values: State,

    /// Node the next superstep runs; `None` once the thread reached END
    pub next_node: Option<String>,

    pub step: u64,

    pub metadata: CheckpointMetadata,

    pub created_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// True once the thread reached END
    pub fn is_finished(&self) -> bool {
        self.next_node.is_none()
    }
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            values: checkpoint.values,
            next_node: checkpoint.next_node,
            step: checkpoint.step,
            metadata: checkpoint.metadata,
            created_at: checkpoint.created_at,
        }
    }
}
