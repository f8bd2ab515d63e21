//! State inspection and manipulation
//!
//! Reads go straight to the checkpoint store. Writes (`update_state`,
//! `rewind`) append a new checkpoint rather than editing history, so every
//! earlier step stays inspectable.

use super::types::StateSnapshot;
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::router::route;
use crate::state::StateUpdate;
use stategraph_checkpoint::{Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSource};
use std::collections::BTreeSet;

impl CompiledGraph {
    /// Latest state of a thread, or `None` if it has no checkpoint
    ///
    /// Repeated calls without an intervening run return the same snapshot.
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        let latest = self.checkpointer.get_latest(thread_id).await?;
        Ok(latest.map(StateSnapshot::from))
    }

    /// Every snapshot of a thread in ascending step order
    pub async fn get_state_history(&self, thread_id: &str) -> Result<Vec<StateSnapshot>> {
        let history = self.checkpointer.get_history(thread_id).await?;
        Ok(history.into_iter().map(StateSnapshot::from).collect())
    }

    /// Every thread with at least one checkpoint
    pub async fn list_threads(&self) -> Result<BTreeSet<String>> {
        Ok(self.checkpointer.list_threads().await?)
    }

    /// Merge an update into a thread's state outside of a run
    ///
    /// The update is merged with each channel's policy and stored as a new
    /// checkpoint. With `as_node`, the update is treated as that node's output:
    /// its declared writes apply and the next node is chosen by its outgoing
    /// edge. Without it, the thread keeps its pending next node; a new thread
    /// starts pending at the entry node.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use stategraph_core::CompiledGraph;
    /// # use serde_json::json;
    /// # async fn example(graph: CompiledGraph) -> Result<(), Box<dyn std::error::Error>> {
    /// let correction = json!({"feedback": "Use metric units"});
    /// let snapshot = graph
    ///     .update_state("thread-1", correction.as_object().cloned().unwrap_or_default(), None)
    ///     .await?;
    /// println!("now at step {}", snapshot.step);
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, update))]
    pub async fn update_state(
        &self,
        thread_id: &str,
        update: StateUpdate,
        as_node: Option<&str>,
    ) -> Result<StateSnapshot> {
        if thread_id.is_empty() {
            return Err(GraphError::configuration("thread id must not be empty"));
        }
        let _guard = self.locks.acquire(thread_id).await;
        let schema = self.graph.schema();

        let undeclared = schema.undeclared(&update);
        if !undeclared.is_empty() {
            return Err(GraphError::configuration(format!(
                "update writes undeclared channel(s): {}",
                undeclared.join(", ")
            )));
        }

        let (mut state, last_step, pending) = match self.checkpointer.get_latest(thread_id).await? {
            Some(checkpoint) => (checkpoint.values, checkpoint.step, checkpoint.next_node),
            None => (schema.initial_state(), 0, Some(self.graph.entry.clone())),
        };

        let next_node = match as_node {
            Some(name) => {
                let node = self.graph.node(name).ok_or_else(|| {
                    GraphError::configuration(format!("update attributed to unknown node '{}'", name))
                })?;
                if let Some(channel) = update.keys().find(|channel| !node.may_write(channel)) {
                    return Err(GraphError::configuration(format!(
                        "node '{}' may not write channel '{}'",
                        name, channel
                    )));
                }
                schema.apply(&mut state, &update)?;
                let edge = self.graph.edge(name).ok_or_else(|| {
                    GraphError::definition(format!("node '{}' has no outgoing edge", name))
                })?;
                route(name, edge, &state)?.into_next_node()
            }
            None => {
                schema.apply(&mut state, &update)?;
                pending
            }
        };

        let mut metadata = CheckpointMetadata::new().with_source(CheckpointSource::Update);
        if let Some(name) = as_node {
            metadata = metadata.with_node(name);
        }
        let checkpoint = Checkpoint::new(thread_id, last_step + 1, state, next_node).with_metadata(metadata);
        self.checkpointer.put(checkpoint.clone()).await?;

        tracing::info!(step = checkpoint.step, "State updated");
        Ok(checkpoint.into())
    }

    /// Make an earlier step the thread's latest state again
    ///
    /// Copies the values and pending node of the checkpoint at `step` into a
    /// new checkpoint at the head of the history. A following
    /// [`resume`](Self::resume) continues from that point; nothing is deleted.
    #[tracing::instrument(skip(self))]
    pub async fn rewind(&self, thread_id: &str, step: u64) -> Result<StateSnapshot> {
        let _guard = self.locks.acquire(thread_id).await;

        let latest = self
            .checkpointer
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(thread_id.to_string()))?;
        let target = self
            .checkpointer
            .get(thread_id, step)
            .await?
            .ok_or_else(|| {
                CheckpointError::NotFound(format!("thread '{}' has no step {}", thread_id, step))
            })?;

        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Fork)
            .with_extra("forked_from", serde_json::json!(step));
        let checkpoint = Checkpoint::new(thread_id, latest.step + 1, target.values, target.next_node)
            .with_metadata(metadata);
        self.checkpointer.put(checkpoint.clone()).await?;

        tracing::info!(from = step, step = checkpoint.step, next = ?checkpoint.next_node, "Thread rewound");
        Ok(checkpoint.into())
    }
}
