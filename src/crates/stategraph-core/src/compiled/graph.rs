//! CompiledGraph struct and builder methods

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::node::NodeExecutor;
use dashmap::DashMap;
use stategraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-thread exclusion
///
/// Two runs on the same thread would both read the same latest checkpoint and
/// race to write the next step. Runs on different threads never contend. An
/// entry lives only while some run holds or waits on it.
#[derive(Debug, Default)]
pub(crate) struct ThreadLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ThreadLocks {
    /// Wait until no other run holds `thread_id`
    pub(crate) async fn acquire(&self, thread_id: &str) -> ThreadGuard<'_> {
        let lock = self
            .locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ThreadGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held for the duration of a run; releases the thread and prunes its entry
pub(crate) struct ThreadGuard<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map's Arc is the last one unless a run is waiting
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Compiled graph ready for execution
///
/// Cloning is cheap; clones share the graph definition, the checkpoint store
/// and the thread locks.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) checkpointer: Arc<dyn CheckpointSaver>,
    pub(crate) config: EngineConfig,
    pub(crate) executor: NodeExecutor,
    pub(crate) locks: Arc<ThreadLocks>,
}

impl CompiledGraph {
    /// Create a compiled graph backed by an in-memory checkpoint store
    pub(crate) fn new(graph: Graph, config: EngineConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer: Arc::new(InMemoryCheckpointSaver::new()),
            executor: NodeExecutor::new(config.node_timeout()),
            config,
            locks: Arc::new(ThreadLocks::default()),
        }
    }

    /// Set the checkpoint store
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = saver;
        self
    }

    /// Get a reference to the underlying graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        self.checkpointer.clone()
    }

    /// Render the graph as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        crate::visualization::to_mermaid(&self.graph)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
