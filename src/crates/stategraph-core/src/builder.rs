//! StateGraph builder API for constructing stateful graph workflows
//!
//! [`StateGraph`] collects channel declarations, nodes and edges through a
//! fluent `&mut Self` interface, then [`compile`](StateGraph::compile)s them
//! into an immutable [`CompiledGraph`]. Mistakes made while building are
//! recorded and reported by `compile`, which either returns a fully valid graph
//! or an error; there is no partially compiled graph.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  StateGraph (builder)                      │
//! │  channels: messages(append) done(replace)  │
//! │  nodes:    worker, evaluator               │
//! │  edges:    worker → evaluator              │
//! │            evaluator ─decide→ {worker,END} │
//! └──────────────────────┬─────────────────────┘
//!                        │ compile()
//!                        ▼
//! ┌────────────────────────────────────────────┐
//! │  CompiledGraph (Arc<Graph> + checkpointer) │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Validation performed by `compile`
//!
//! - **Configuration**: channel declarations are consistent; declared node
//!   writes name declared channels.
//! - **Definition**: node names are unique and not reserved; the entry node
//!   exists; every edge source and target exists (or is [`END`]); every node has
//!   exactly one outgoing edge set; label maps are non-empty.
//!
//! Cycles are allowed. The engine bounds them with its step limit.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stategraph_core::{StateGraph, END};
//! use stategraph_core::state::{ChannelSpec, State, ValueKind};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::new();
//! graph.add_channel("messages", ChannelSpec::append(ValueKind::Array));
//! graph.add_node("agent", |_state: State| async move {
//!     Ok(json!({"messages": ["hi"]}).as_object().cloned().unwrap_or_default())
//! });
//! graph.set_entry("agent");
//! graph.add_edge("agent", END);
//!
//! let compiled = graph.compile()?;
//! let input = json!({"messages": ["hello"]});
//! let state = compiled.invoke(input.as_object().cloned().unwrap_or_default(), "t1").await?;
//! assert_eq!(state["messages"], json!(["hello", "hi"]));
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{reachable_from, ConditionalEdge, Edge, Graph, NodeId, NodeSpec, Target, END, START};
use crate::messages::MESSAGES_CHANNEL;
use crate::node::{handler_fn, NodeHandler, NodeResult};
use crate::state::{ChannelSpec, MergePolicy, State, StateSchema, ValueKind};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Builder for stateful graphs
#[derive(Default)]
pub struct StateGraph {
    schema: StateSchema,
    nodes: BTreeMap<NodeId, NodeSpec>,
    /// Every edge set added, in order, so duplicates can be reported
    edges: Vec<(NodeId, Edge)>,
    entry: Option<NodeId>,
    /// Problems found while building, reported by `compile`
    problems: Vec<String>,
}

impl StateGraph {
    /// Create an empty builder with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a `messages` channel holding chat history
    pub fn with_messages() -> Self {
        let mut graph = Self::new();
        graph.add_channel(MESSAGES_CHANNEL, ChannelSpec::append(ValueKind::Messages));
        graph
    }

    /// Start from an existing schema
    pub fn with_schema(schema: StateSchema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Declare a channel
    pub fn add_channel(&mut self, name: impl Into<String>, spec: ChannelSpec) -> &mut Self {
        self.schema.add_channel(name, spec);
        self
    }

    /// Declare a channel from its kind and merge policy
    pub fn add_channel_with(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        policy: MergePolicy,
    ) -> &mut Self {
        self.add_channel(name, ChannelSpec::new(kind, policy))
    }

    /// Add a node whose logic is an async closure
    ///
    /// ```rust
    /// use stategraph_core::StateGraph;
    /// use stategraph_core::state::{State, StateUpdate};
    /// use serde_json::json;
    ///
    /// let mut graph = StateGraph::new();
    /// graph.add_node("count", |state: State| async move {
    ///     let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
    ///     let mut update = StateUpdate::new();
    ///     update.insert("n".into(), json!(n + 1));
    ///     Ok(update)
    /// });
    /// ```
    pub fn add_node<F, Fut>(&mut self, name: impl Into<NodeId>, f: F) -> &mut Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeResult> + Send + 'static,
    {
        self.add_node_handler(name, handler_fn(f))
    }

    /// Add a node backed by a [`NodeHandler`] implementation
    pub fn add_node_handler(&mut self, name: impl Into<NodeId>, handler: Arc<dyn NodeHandler>) -> &mut Self {
        let name = name.into();
        self.insert_node(NodeSpec::new(name, handler))
    }

    /// Add a node restricted to writing the given channels
    pub fn add_node_with_writes<F, Fut, I, S>(&mut self, name: impl Into<NodeId>, writes: I, f: F) -> &mut Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeResult> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = NodeSpec::new(name, handler_fn(f)).with_writes(writes);
        self.insert_node(spec)
    }

    /// Add a fully specified node
    pub fn add_node_spec(&mut self, spec: NodeSpec) -> &mut Self {
        self.insert_node(spec)
    }

    /// Restrict an already added node to writing the given channels
    pub fn declare_writes<I, S>(&mut self, name: &str, writes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.nodes.remove(name) {
            Some(spec) => {
                self.nodes.insert(name.to_string(), spec.with_writes(writes));
            }
            None => self
                .problems
                .push(format!("writes declared for unknown node '{}'", name)),
        }
        self
    }

    fn insert_node(&mut self, spec: NodeSpec) -> &mut Self {
        let name = spec.name.clone();
        if name == START || name == END {
            self.problems
                .push(format!("'{}' is reserved and cannot name a node", name));
        } else if name.is_empty() {
            self.problems.push("node names cannot be empty".to_string());
        } else if self.nodes.contains_key(&name) {
            self.problems.push(format!("node '{}' is added twice", name));
        } else {
            self.nodes.insert(name, spec);
        }
        self
    }

    /// Add a static edge; `add_edge(START, node)` sets the entry node
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        let to = to.into();

        if to == START {
            self.problems
                .push(format!("edge from '{}' targets START", from));
            return self;
        }
        if from == START {
            return self.set_entry(to);
        }

        self.edges.push((from, Edge::Static(Target::from_name(to))));
        self
    }

    /// Add a conditional edge routed by `decision` through `label_map`
    ///
    /// `label_map` pairs each label the decision function may return with a
    /// node name or [`END`].
    ///
    /// ```rust
    /// use stategraph_core::{StateGraph, END};
    /// use stategraph_core::state::State;
    ///
    /// let mut graph = StateGraph::new();
    /// graph.add_conditional_edge(
    ///     "evaluator",
    ///     |state: &State| {
    ///         let met = state.get("success_criteria_met").and_then(|v| v.as_bool());
    ///         if met == Some(true) { "done" } else { "retry" }
    ///     },
    ///     [("retry", "worker"), ("done", END)],
    /// );
    /// ```
    pub fn add_conditional_edge<F, L, I, K, V>(
        &mut self,
        from: impl Into<NodeId>,
        decision: F,
        label_map: I,
    ) -> &mut Self
    where
        F: Fn(&State) -> L + Send + Sync + 'static,
        L: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let from = from.into();
        let mut branches = BTreeMap::new();
        for (label, target) in label_map {
            let label = label.into();
            let target = target.into();
            if target == START {
                self.problems.push(format!(
                    "label '{}' of node '{}' targets START",
                    label, from
                ));
                continue;
            }
            if branches.insert(label.clone(), Target::from_name(target)).is_some() {
                self.problems
                    .push(format!("label '{}' of node '{}' is mapped twice", label, from));
            }
        }

        let decision = Arc::new(move |state: &State| -> String { decision(state).into() });
        self.edges
            .push((from, Edge::Conditional(ConditionalEdge::new(decision, branches))));
        self
    }

    /// Set the node execution starts from
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        let node = node.into();
        match &self.entry {
            Some(existing) if *existing != node => self.problems.push(format!(
                "entry node set to both '{}' and '{}'",
                existing, node
            )),
            _ => self.entry = Some(node),
        }
        self
    }

    /// Add an edge from `node` to [`END`]
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(node, END)
    }

    /// Compile with default engine configuration
    pub fn compile(self) -> Result<CompiledGraph> {
        self.compile_with_config(EngineConfig::default())
    }

    /// Validate and compile into an executable graph
    pub fn compile_with_config(self, config: EngineConfig) -> Result<CompiledGraph> {
        config.validate()?;
        let graph = self.build(&config)?;
        tracing::debug!(
            nodes = graph.node_count(),
            channels = graph.schema().len(),
            entry = graph.entry(),
            "Graph compiled"
        );
        Ok(CompiledGraph::new(graph, config))
    }

    fn build(mut self, config: &EngineConfig) -> Result<Graph> {
        if let Some(window) = config.message_window {
            if let Some(spec) = self.schema.channel_mut(MESSAGES_CHANNEL) {
                if let MergePolicy::Append { window: w @ None } = &mut spec.policy {
                    *w = Some(window);
                }
            }
        }

        self.check_configuration()?;

        let mut problems = std::mem::take(&mut self.problems);
        let mut edges: BTreeMap<NodeId, Edge> = BTreeMap::new();

        for (from, edge) in self.edges {
            if from == END {
                problems.push("END cannot have outgoing edges".to_string());
                continue;
            }
            if !self.nodes.contains_key(&from) {
                problems.push(format!("edge source '{}' is not a node", from));
                continue;
            }
            if let Edge::Conditional(conditional) = &edge {
                if conditional.branches().is_empty() {
                    problems.push(format!("conditional edge of '{}' has no labels", from));
                }
            }
            for target in edge.targets() {
                if let Target::Node(name) = target {
                    if !self.nodes.contains_key(name) {
                        problems.push(format!(
                            "edge from '{}' targets unknown node '{}'",
                            from, name
                        ));
                    }
                }
            }
            if edges.contains_key(&from) {
                problems.push(format!("node '{}' has more than one outgoing edge set", from));
                continue;
            }
            edges.insert(from, edge);
        }

        for name in self.nodes.keys() {
            if !edges.contains_key(name) {
                problems.push(format!("node '{}' has no outgoing edge", name));
            }
        }

        let entry = match self.entry {
            Some(entry) if self.nodes.contains_key(&entry) => Some(entry),
            Some(entry) => {
                problems.push(format!("entry node '{}' does not exist", entry));
                None
            }
            None => {
                problems.push("no entry node set".to_string());
                None
            }
        };

        if !problems.is_empty() {
            return Err(GraphError::definition(problems.join("; ")));
        }
        // Unreachable only when problems were found, which returned above
        let entry = entry.ok_or_else(|| GraphError::definition("no entry node set"))?;

        let reachable = reachable_from(&entry, &edges);
        for name in self.nodes.keys() {
            if !reachable.contains(name.as_str()) {
                tracing::warn!(node = %name, "Node is unreachable from the entry node");
            }
        }

        Ok(Graph {
            schema: self.schema,
            nodes: self.nodes,
            edges,
            entry,
        })
    }

    /// Channel declarations and declared writes
    fn check_configuration(&self) -> Result<()> {
        let mut problems = Vec::new();
        for (name, spec) in self.schema.channels() {
            if let Err(problem) = spec.check(name) {
                problems.push(problem);
            }
        }
        for (name, spec) in &self.nodes {
            for channel in spec.writes.iter().flatten() {
                if !self.schema.contains(channel) {
                    problems.push(format!(
                        "node '{}' declares a write to undeclared channel '{}'",
                        name, channel
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GraphError::configuration(problems.join("; ")))
        }
    }
}
