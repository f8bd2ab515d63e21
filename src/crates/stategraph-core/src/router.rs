//! Router: resolves a node's outgoing edge to the next target
//!
//! A static edge resolves to its target. A conditional edge evaluates its
//! decision function and looks the label up in the closed label map. A label
//! missing from the map is a [`GraphError::Routing`]; it never falls through to
//! the terminal marker, which would disguise a decision bug as a normal finish.

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Target};
use crate::state::State;

/// Resolve the next target after `node` ran
pub fn route(node: &str, edge: &Edge, state: &State) -> Result<Target> {
    match edge {
        Edge::Static(target) => Ok(target.clone()),
        Edge::Conditional(conditional) => {
            let label = conditional.decide(state);
            match conditional.branches().get(&label) {
                Some(target) => {
                    tracing::debug!(node, %label, next = %target, "Conditional edge resolved");
                    Ok(target.clone())
                }
                None => Err(GraphError::routing(node, label)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConditionalEdge;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn flag_edge() -> Edge {
        let branches = BTreeMap::from([
            ("retry".to_string(), Target::from_name("worker")),
            ("done".to_string(), Target::End),
        ]);
        Edge::Conditional(ConditionalEdge::new(
            Arc::new(|state: &State| match state.get("verdict").and_then(|v| v.as_str()) {
                Some(label) => label.to_string(),
                None => "retry".to_string(),
            }),
            branches,
        ))
    }

    #[test]
    fn test_static_edge() {
        let edge = Edge::Static(Target::from_name("evaluator"));
        let target = route("worker", &edge, &State::new()).unwrap();
        assert_eq!(target, Target::Node("evaluator".into()));
    }

    #[test]
    fn test_conditional_edge() {
        let edge = flag_edge();
        let mut state = State::new();
        assert_eq!(route("evaluator", &edge, &state).unwrap(), Target::from_name("worker"));

        state.insert("verdict".into(), json!("done"));
        assert_eq!(route("evaluator", &edge, &state).unwrap(), Target::End);
    }

    #[test]
    fn test_unmapped_label_is_an_error() {
        let edge = flag_edge();
        let mut state = State::new();
        state.insert("verdict".into(), json!("maybe"));

        let err = route("evaluator", &edge, &state).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Routing { ref node, ref label } if node == "evaluator" && label == "maybe"
        ));
    }
}
