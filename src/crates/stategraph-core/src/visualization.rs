//! Graph visualization in Mermaid and DOT formats
//!
//! Renders a compiled [`Graph`] for documentation and debugging. Static edges
//! become solid arrows; conditional edges become one dashed arrow per label.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Mermaid:  flowchart TD                                  │
//! │              start((START)) --> worker                   │
//! │              worker --> evaluator                        │
//! │              evaluator -. "retry" .-> worker             │
//! │              evaluator -. "done" .-> end_((END))         │
//! │                                                          │
//! │  DOT:      digraph { "worker" -> "evaluator"; ... }      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use stategraph_core::{StateGraph, END};
//! use stategraph_core::state::{State, StateUpdate};
//! use stategraph_core::visualization::{visualize, VisualizationOptions};
//!
//! let mut graph = StateGraph::new();
//! graph.add_node("agent", |_state: State| async move { Ok(StateUpdate::new()) });
//! graph.set_entry("agent").add_edge("agent", END);
//! let compiled = graph.compile().unwrap();
//!
//! let mermaid = compiled.to_mermaid();
//! assert!(mermaid.contains("agent --> end_"));
//!
//! let dot = visualize(compiled.graph(), &VisualizationOptions::dot().with_title("Chat"));
//! assert!(dot.starts_with("digraph"));
//! ```

use crate::graph::{Edge, Graph, Target};
use std::fmt::Write;

/// Visualization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualizationFormat {
    /// Mermaid flowchart, renders natively on GitHub
    #[default]
    Mermaid,
    /// DOT format for Graphviz
    Dot,
}

/// Visualization options
#[derive(Debug, Clone, Default)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    /// Show each node's declared writes in its label
    pub include_details: bool,
    pub title: Option<String>,
}

impl VisualizationOptions {
    pub fn mermaid() -> Self {
        Self::default()
    }

    pub fn dot() -> Self {
        Self {
            format: VisualizationFormat::Dot,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

/// Visualize a graph as a string
pub fn visualize(graph: &Graph, options: &VisualizationOptions) -> String {
    match options.format {
        VisualizationFormat::Mermaid => visualize_mermaid(graph, options),
        VisualizationFormat::Dot => visualize_dot(graph, options),
    }
}

/// Mermaid flowchart with default options
pub fn to_mermaid(graph: &Graph) -> String {
    visualize_mermaid(graph, &VisualizationOptions::mermaid())
}

const START_ID: &str = "start";
const END_ID: &str = "end_";

fn node_label(graph: &Graph, name: &str, options: &VisualizationOptions) -> String {
    let writes = graph.node(name).and_then(|spec| spec.writes.as_ref());
    match writes {
        Some(writes) if options.include_details => {
            let writes: Vec<&str> = writes.iter().map(String::as_str).collect();
            format!("{}\nwrites: {}", name, writes.join(", "))
        }
        _ => name.to_string(),
    }
}

fn visualize_mermaid(graph: &Graph, options: &VisualizationOptions) -> String {
    let mut output = String::new();
    if let Some(title) = &options.title {
        let _ = writeln!(output, "---\ntitle: {}\n---", escape_mermaid(title));
    }
    output.push_str("flowchart TD\n");
    let _ = writeln!(output, "    {}((START))", START_ID);
    let _ = writeln!(output, "    {}((END))", END_ID);

    for name in graph.node_names() {
        let shape = match graph.edge(name) {
            Some(Edge::Conditional(_)) => ("{", "}"),
            _ => ("[", "]"),
        };
        let _ = writeln!(
            output,
            "    {}{}\"{}\"{}",
            sanitize_id(name),
            shape.0,
            escape_mermaid(&node_label(graph, name, options)).replace('\n', "<br/>"),
            shape.1
        );
    }

    let _ = writeln!(output, "    {} --> {}", START_ID, sanitize_id(graph.entry()));
    for name in graph.node_names() {
        match graph.edge(name) {
            Some(Edge::Static(target)) => {
                let _ = writeln!(output, "    {} --> {}", sanitize_id(name), mermaid_target(target));
            }
            Some(Edge::Conditional(conditional)) => {
                for (label, target) in conditional.branches() {
                    let _ = writeln!(
                        output,
                        "    {} -. \"{}\" .-> {}",
                        sanitize_id(name),
                        escape_mermaid(label),
                        mermaid_target(target)
                    );
                }
            }
            None => {}
        }
    }

    output
}

fn mermaid_target(target: &Target) -> String {
    match target {
        Target::Node(name) => sanitize_id(name),
        Target::End => END_ID.to_string(),
    }
}

fn visualize_dot(graph: &Graph, options: &VisualizationOptions) -> String {
    let mut output = String::from("digraph {\n    rankdir=TB;\n");
    if let Some(title) = &options.title {
        let _ = writeln!(output, "    label=\"{}\";", escape_dot(title));
    }
    output.push_str("    \"START\" [shape=circle];\n    \"END\" [shape=doublecircle];\n");

    for name in graph.node_names() {
        let shape = match graph.edge(name) {
            Some(Edge::Conditional(_)) => "diamond",
            _ => "box",
        };
        let _ = writeln!(
            output,
            "    \"{}\" [shape={}, label=\"{}\"];",
            escape_dot(name),
            shape,
            escape_dot(&node_label(graph, name, options))
        );
    }

    let _ = writeln!(output, "    \"START\" -> \"{}\";", escape_dot(graph.entry()));
    for name in graph.node_names() {
        match graph.edge(name) {
            Some(Edge::Static(target)) => {
                let _ = writeln!(output, "    \"{}\" -> \"{}\";", escape_dot(name), dot_target(target));
            }
            Some(Edge::Conditional(conditional)) => {
                for (label, target) in conditional.branches() {
                    let _ = writeln!(
                        output,
                        "    \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];",
                        escape_dot(name),
                        dot_target(target),
                        escape_dot(label)
                    );
                }
            }
            None => {}
        }
    }

    output.push_str("}\n");
    output
}

fn dot_target(target: &Target) -> String {
    match target {
        Target::Node(name) => escape_dot(name),
        Target::End => "END".to_string(),
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Mermaid ids must be alphanumeric plus underscore
fn sanitize_id(s: &str) -> String {
    let id: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    // Mermaid treats a bare `end` as a keyword
    if id == "end" || id == START_ID || id == END_ID {
        format!("n_{}", id)
    } else {
        id
    }
}
