//! Immutable graph definition: nodes, edges, entry and terminal markers
//!
//! A [`Graph`] is produced only by a successful
//! [`StateGraph::compile`](crate::StateGraph::compile) and is never mutated
//! afterwards, so one `Arc<Graph>` is shared by every concurrently running
//! thread.
//!
//! ```text
//!            ┌────────┐  static   ┌───────────┐
//!  START ───►│ worker │──────────►│ evaluator │
//!            └────────┘           └─────┬─────┘
//!                 ▲   "retry"           │ decision(state) -> label
//!                 └─────────────────────┤
//!                                       │ "done"
//!                                       ▼
//!                                      END
//! ```
//!
//! Every node owns exactly one outgoing edge set: either one static edge or one
//! conditional edge whose label map is closed and checked at compile time.

use crate::node::NodeHandler;
use crate::state::{State, StateSchema};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Node identifier, unique within a graph
pub type NodeId = String;

/// Alias usable as the source of an edge to mark the entry node
pub const START: &str = "__start__";

/// Terminal marker; not a real node
pub const END: &str = "__end__";

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Node(NodeId),
    End,
}

impl Target {
    /// Interpret a name, mapping [`END`] to the terminal marker
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == END {
            Target::End
        } else {
            Target::Node(name)
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Target::End)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Node(name) => name,
            Target::End => END,
        }
    }

    /// Node name, or `None` for the terminal marker
    pub fn node(&self) -> Option<&str> {
        match self {
            Target::Node(name) => Some(name),
            Target::End => None,
        }
    }

    /// The form stored in checkpoints
    pub fn into_next_node(self) -> Option<String> {
        match self {
            Target::Node(name) => Some(name),
            Target::End => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inspects state at a conditional edge and returns a label
pub type DecisionFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Decision function plus its closed label → target map
#[derive(Clone)]
pub struct ConditionalEdge {
    pub(crate) decision: DecisionFn,
    pub(crate) branches: BTreeMap<String, Target>,
}

impl ConditionalEdge {
    pub fn new(decision: DecisionFn, branches: BTreeMap<String, Target>) -> Self {
        Self { decision, branches }
    }

    pub fn decide(&self, state: &State) -> String {
        (self.decision)(state)
    }

    pub fn branches(&self) -> &BTreeMap<String, Target> {
        &self.branches
    }
}

/// Outgoing edge set of a node
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge
    Static(Target),
    Conditional(ConditionalEdge),
}

impl Edge {
    /// Every target this edge can lead to
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Edge::Static(target) => vec![target],
            Edge::Conditional(edge) => edge.branches.values().collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static(target) => f.debug_tuple("Static").field(target).finish(),
            Edge::Conditional(edge) => f
                .debug_struct("Conditional")
                .field("decision", &"<function>")
                .field("branches", &edge.branches)
                .finish(),
        }
    }
}

/// A named unit of work
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,

    pub handler: Arc<dyn NodeHandler>,

    /// Channels this node may write; `None` allows any declared channel
    pub writes: Option<BTreeSet<String>>,
}

impl NodeSpec {
    pub fn new(name: impl Into<NodeId>, handler: Arc<dyn NodeHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            writes: None,
        }
    }

    pub fn with_writes<I, S>(mut self, writes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes = Some(writes.into_iter().map(Into::into).collect());
        self
    }

    pub fn may_write(&self, channel: &str) -> bool {
        self.writes
            .as_ref()
            .map_or(true, |writes| writes.contains(channel))
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("handler", &"<handler>")
            .field("writes", &self.writes)
            .finish()
    }
}

/// Validated, immutable graph
#[derive(Debug)]
pub struct Graph {
    pub(crate) schema: StateSchema,
    pub(crate) nodes: BTreeMap<NodeId, NodeSpec>,
    pub(crate) edges: BTreeMap<NodeId, Edge>,
    pub(crate) entry: NodeId,
}

impl Graph {
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes reachable from the entry node
    pub fn reachable(&self) -> BTreeSet<&str> {
        reachable_from(&self.entry, &self.edges)
    }
}

/// Breadth-first walk over edge targets
pub(crate) fn reachable_from<'a>(
    entry: &'a str,
    edges: &'a BTreeMap<NodeId, Edge>,
) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut queue = std::collections::VecDeque::from([entry]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        if let Some(edge) = edges.get(node) {
            for target in edge.targets() {
                if let Some(next) = target.node() {
                    queue.push_back(next);
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_name() {
        assert_eq!(Target::from_name(END), Target::End);
        assert_eq!(Target::from_name("agent"), Target::Node("agent".into()));
        assert_eq!(Target::End.as_str(), END);
        assert_eq!(Target::End.into_next_node(), None);
        assert_eq!(
            Target::from_name("agent").into_next_node().as_deref(),
            Some("agent")
        );
    }

    #[test]
    fn test_reachable_follows_cycles() {
        let mut edges = BTreeMap::new();
        edges.insert("worker".to_string(), Edge::Static(Target::from_name("evaluator")));
        let branches = BTreeMap::from([
            ("retry".to_string(), Target::from_name("worker")),
            ("done".to_string(), Target::End),
        ]);
        edges.insert(
            "evaluator".to_string(),
            Edge::Conditional(ConditionalEdge::new(Arc::new(|_: &State| "done".to_string()), branches)),
        );
        edges.insert("orphan".to_string(), Edge::Static(Target::End));

        let reachable = reachable_from("worker", &edges);
        assert!(reachable.contains("worker"));
        assert!(reachable.contains("evaluator"));
        assert!(!reachable.contains("orphan"));
    }
}
