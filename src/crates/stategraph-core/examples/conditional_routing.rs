//! Conditional routing example
//!
//! A worker drafts until it decides the draft is ready, then an evaluator
//! accepts or sends it back. The step limit stops a loop that never
//! converges; the failed thread can be rewound and resumed.

use serde_json::json;
use stategraph_core::state::{State, StateUpdate};
use stategraph_core::{ChannelSpec, EngineConfig, GraphError, StateGraph, ValueKind, END};

fn drafts(state: &State) -> usize {
    state["drafts"].as_array().map_or(0, Vec::len)
}

fn build(needed: usize, max_steps: usize) -> Result<stategraph_core::CompiledGraph, GraphError> {
    let mut graph = StateGraph::new();
    graph
        .add_channel("drafts", ChannelSpec::append(ValueKind::Array))
        .add_channel(
            "accepted",
            ChannelSpec::replace(ValueKind::Bool).with_default(json!(false)),
        );

    graph.add_node_with_writes("worker", ["drafts"], |state: State| async move {
        let mut update = StateUpdate::new();
        update.insert("drafts".into(), json!([format!("draft {}", drafts(&state) + 1)]));
        Ok(update)
    });
    graph.add_node_with_writes("evaluator", ["accepted"], move |state: State| async move {
        let mut update = StateUpdate::new();
        update.insert("accepted".into(), json!(drafts(&state) >= needed));
        Ok(update)
    });

    graph.set_entry("worker");
    graph.add_conditional_edge(
        "worker",
        |state: &State| if drafts(state) % 2 == 0 { "ready" } else { "revise" },
        [("revise", "worker"), ("ready", "evaluator")],
    );
    graph.add_conditional_edge(
        "evaluator",
        |state: &State| {
            if state["accepted"].as_bool() == Some(true) {
                "finish"
            } else {
                "retry"
            }
        },
        [("retry", "worker"), ("finish", END)],
    );

    graph.compile_with_config(EngineConfig::default().with_max_steps(max_steps))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Conditional Routing Example ===\n");

    let compiled = build(4, 25)?;
    let state = compiled.invoke(StateUpdate::new(), "converges").await?;
    println!("drafts: {}", state["drafts"]);
    for snapshot in compiled.get_state_history("converges").await? {
        println!(
            "  step {:>2} -> {}",
            snapshot.step,
            snapshot.next_node.as_deref().unwrap_or("END")
        );
    }

    println!("\nWith a step limit of 4:");
    let tight = build(4, 4)?;
    match tight.invoke(StateUpdate::new(), "limited").await {
        Err(GraphError::StepLimitExceeded { limit, step }) => {
            println!("  stopped after {} steps at thread step {}", limit, step);
        }
        other => println!("  unexpected outcome: {:?}", other.map(|s| s["drafts"].clone())),
    }

    // Resuming grants a fresh step budget
    let state = tight.resume("limited").await?;
    println!("  resumed to completion with {} drafts", drafts(&state));

    let forked = tight.rewind("limited", 2).await?;
    println!("  rewound: new step {} waits on {:?}", forked.step, forked.next_node);

    Ok(())
}
