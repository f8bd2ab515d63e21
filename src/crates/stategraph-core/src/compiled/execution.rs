//! Superstep execution loop
//!
//! One run of a thread is a sequence of supersteps. Each superstep executes
//! exactly one node:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ superstep N                                                  │
//!   │                                                              │
//!   │  NodeExecutor::run ──► check writes ──► schema.apply(update) │
//!   │        │                                     │               │
//!   │   error/timeout                          route(edge)         │
//!   │        │                                     │               │
//!   │        ▼                                     ▼               │
//!   │   run fails,                 checkpoint {step N, next_node}  │
//!   │   no checkpoint                              │               │
//!   └──────────────────────────────────────────────┼───────────────┘
//!                                                  ▼
//!                                  END? return state : superstep N+1
//! ```
//!
//! A checkpoint is written only after the update merged and the next target is
//! known, so the latest checkpoint of a thread always describes a consistent
//! state plus the node to run next. Any failure before that point leaves the
//! previous checkpoint as the thread's latest.

use super::types::ExecutionEvent;
use super::CompiledGraph;
use crate::error::{FailurePhase, GraphError, Result};
use crate::graph::{NodeSpec, Target};
use crate::router::route;
use crate::state::{State, StateUpdate};
use stategraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};
use tokio::sync::mpsc;
use uuid::Uuid;

impl CompiledGraph {
    /// Run the graph for a thread and return the final state
    ///
    /// The input is merged into the thread's latest state (or the schema's
    /// initial state for a new thread) using each channel's merge policy, then
    /// execution starts at the entry node and continues until END.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use stategraph_core::{StateGraph, END};
    /// use stategraph_core::state::{ChannelSpec, State, ValueKind};
    /// use serde_json::json;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut graph = StateGraph::new();
    /// graph.add_channel("count", ChannelSpec::replace(ValueKind::Number));
    /// graph.add_node("inc", |state: State| async move {
    ///     let n = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
    ///     Ok(json!({"count": n + 1}).as_object().cloned().unwrap_or_default())
    /// });
    /// graph.set_entry("inc").add_finish("inc");
    ///
    /// let compiled = graph.compile()?;
    /// let first = compiled.invoke(Default::default(), "counter").await?;
    /// let second = compiled.invoke(Default::default(), "counter").await?;
    /// assert_eq!(first["count"], json!(1));
    /// assert_eq!(second["count"], json!(2));
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, input), fields(channels = input.len()))]
    pub async fn invoke(&self, input: StateUpdate, thread_id: &str) -> Result<State> {
        self.execute(input, thread_id, None).await
    }

    /// Continue a thread from its latest checkpoint without new input
    ///
    /// Runs the node recorded as next in the latest checkpoint with a fresh
    /// step budget. A thread that already reached END returns its state
    /// unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, thread_id: &str) -> Result<State> {
        let run_id = Uuid::new_v4().to_string();
        let _guard = self.locks.acquire(thread_id).await;

        let latest = self
            .checkpointer
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(thread_id.to_string()))?;

        match latest.next_node {
            None => {
                tracing::debug!(step = latest.step, "Thread already finished");
                Ok(latest.values)
            }
            Some(next) => {
                tracing::info!(step = latest.step, next = %next, "Resuming thread");
                let result = self
                    .run_loop(latest.values, latest.step, Target::Node(next), thread_id, &run_id, None)
                    .await;
                log_outcome(&result);
                result
            }
        }
    }

    /// Shared body of `invoke` and `stream`
    pub(crate) async fn execute(
        &self,
        input: StateUpdate,
        thread_id: &str,
        events: Option<&mpsc::Sender<ExecutionEvent>>,
    ) -> Result<State> {
        let run_id = Uuid::new_v4().to_string();
        let _guard = self.locks.acquire(thread_id).await;

        let result = match self.prepare(&input, thread_id).await {
            Ok((state, last_step)) => {
                tracing::info!(
                    run_id = %run_id,
                    last_step,
                    entry = self.graph.entry(),
                    "Starting run"
                );
                let entry = Target::Node(self.graph.entry.clone());
                self.run_loop(state, last_step, entry, thread_id, &run_id, events)
                    .await
            }
            Err(e) => Err(e),
        };

        log_outcome(&result);
        if let Some(tx) = events {
            let event = match &result {
                Ok(state) => ExecutionEvent::Completed {
                    state: state.clone(),
                },
                Err(e) => ExecutionEvent::Failed {
                    error: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        }
        result
    }

    /// Load the thread's latest state and merge the input into it
    async fn prepare(&self, input: &StateUpdate, thread_id: &str) -> Result<(State, u64)> {
        if thread_id.is_empty() {
            return Err(GraphError::configuration("thread id must not be empty"));
        }

        let schema = self.graph.schema();
        let undeclared = schema.undeclared(input);
        if !undeclared.is_empty() {
            return Err(GraphError::configuration(format!(
                "input writes undeclared channel(s): {}",
                undeclared.join(", ")
            )));
        }

        let (mut state, last_step) = match self.checkpointer.get_latest(thread_id).await? {
            Some(checkpoint) => (checkpoint.values, checkpoint.step),
            None => (schema.initial_state(), 0),
        };
        schema.apply(&mut state, input)?;

        Ok((state, last_step))
    }

    /// Execute supersteps from `start` until END or failure
    async fn run_loop(
        &self,
        mut state: State,
        mut last_step: u64,
        start: Target,
        thread_id: &str,
        run_id: &str,
        events: Option<&mpsc::Sender<ExecutionEvent>>,
    ) -> Result<State> {
        let mut target = start;
        let mut executed: usize = 0;

        while let Target::Node(name) = target {
            let node = self.graph.node(&name).ok_or_else(|| {
                GraphError::definition(format!("node '{}' is not part of this graph", name))
            })?;
            let step = last_step + 1;

            emit(events, ExecutionEvent::NodeStart {
                node: name.clone(),
                step,
            })
            .await;
            tracing::debug!(node = %name, step, "Executing node");

            let update = self.executor.run(node, state.clone()).await?;

            emit(events, ExecutionEvent::NodeEnd {
                node: name.clone(),
                step,
                update: update.clone(),
            })
            .await;

            self.check_writes(node, &update)?;
            self.graph.schema().apply(&mut state, &update)?;

            let edge = self.graph.edge(&name).ok_or_else(|| {
                GraphError::definition(format!("node '{}' has no outgoing edge", name))
            })?;
            let next = route(&name, edge, &state)?;

            let metadata = CheckpointMetadata::new()
                .with_source(CheckpointSource::Loop)
                .with_node(name.as_str())
                .with_run_id(run_id);
            let checkpoint = Checkpoint::new(thread_id, step, state.clone(), next.clone().into_next_node())
                .with_metadata(metadata);
            self.checkpointer.put(checkpoint).await?;

            last_step = step;
            executed += 1;
            emit(events, ExecutionEvent::CheckpointSaved {
                step,
                next_node: next.node().map(str::to_string),
            })
            .await;

            if !next.is_end() && executed >= self.config.max_steps {
                return Err(GraphError::StepLimitExceeded {
                    limit: self.config.max_steps,
                    step,
                });
            }
            target = next;
        }

        tracing::debug!(executed, last_step, "Reached END");
        Ok(state)
    }

    /// Reject writes to undeclared channels or outside a node's declared writes
    fn check_writes(&self, node: &NodeSpec, update: &StateUpdate) -> Result<()> {
        let undeclared = self.graph.schema().undeclared(update);
        if !undeclared.is_empty() {
            return Err(GraphError::configuration(format!(
                "node '{}' wrote undeclared channel(s): {}",
                node.name,
                undeclared.join(", ")
            )));
        }

        let forbidden: Vec<&str> = update
            .keys()
            .map(String::as_str)
            .filter(|channel| !node.may_write(channel))
            .collect();
        if !forbidden.is_empty() {
            return Err(GraphError::configuration(format!(
                "node '{}' wrote channel(s) outside its declared writes: {}",
                node.name,
                forbidden.join(", ")
            )));
        }
        Ok(())
    }
}

async fn emit(events: Option<&mpsc::Sender<ExecutionEvent>>, event: ExecutionEvent) {
    if let Some(tx) = events {
        // A dropped receiver only stops the stream, not the run
        let _ = tx.send(event).await;
    }
}

fn log_outcome(result: &Result<State>) {
    match result {
        Ok(_) => tracing::info!("Run completed"),
        Err(e) if e.phase() == FailurePhase::Configuration => {
            tracing::error!(error = %e, "Run rejected")
        }
        Err(e) => tracing::warn!(error = %e, retryable = e.is_retryable(), "Run failed"),
    }
}
