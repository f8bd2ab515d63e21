//! Streaming execution methods
//!
//! ```text
//! ┌──────────────┐    Bounded Channel (100)    ┌─────────────┐
//! │  Superstep   │ ──────────────────────────> │   Client    │
//! │     loop     │       ExecutionEvent         │   Consumer  │
//! └──────────────┘                              └─────────────┘
//!       ↓
//!   Backpressure: the loop waits when the channel is full
//! ```

use super::types::{EventStream, ExecutionEvent};
use super::CompiledGraph;
use crate::state::StateUpdate;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const EVENT_BUFFER: usize = 100;

impl CompiledGraph {
    /// Run the graph in a background task and stream its events
    ///
    /// The run has the same semantics and checkpoints as
    /// [`invoke`](Self::invoke). The stream ends after a `Completed` or
    /// `Failed` event. Dropping the stream does not cancel the run.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use stategraph_core::{CompiledGraph, ExecutionEvent};
    /// use futures::StreamExt;
    ///
    /// # async fn example(graph: CompiledGraph) -> Result<(), Box<dyn std::error::Error>> {
    /// let mut events = graph.stream(Default::default(), "thread-1");
    /// while let Some(event) = events.next().await {
    ///     match event {
    ///         ExecutionEvent::NodeStart { node, step } => println!("step {step}: {node}"),
    ///         ExecutionEvent::Failed { error } => eprintln!("{error}"),
    ///         _ => {}
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn stream(&self, input: StateUpdate, thread_id: impl Into<String>) -> EventStream {
        let (tx, rx) = mpsc::channel::<ExecutionEvent>(EVENT_BUFFER);
        let graph = self.clone();
        let thread_id = thread_id.into();

        tokio::spawn(async move {
            // The outcome is delivered as the final event
            let _ = graph.execute(input, &thread_id, Some(&tx)).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
