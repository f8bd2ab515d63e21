//! Simple graph example
//!
//! A single `agent` node answering over an append-merged message channel,
//! invoked twice on the same thread.

use serde_json::json;
use stategraph_core::state::{State, StateUpdate};
use stategraph_core::{ChannelSpec, StateGraph, ValueKind, END};

fn reply(state: &State) -> StateUpdate {
    let last = state["messages"]
        .as_array()
        .and_then(|messages| messages.last())
        .and_then(|message| message.as_str())
        .unwrap_or_default()
        .to_string();

    let mut update = StateUpdate::new();
    update.insert("messages".into(), json!([format!("echo: {}", last)]));
    update
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Simple Graph Example ===\n");

    let mut graph = StateGraph::new();
    graph.add_channel("messages", ChannelSpec::append(ValueKind::Array));

    graph.add_node("agent", |state: State| async move { Ok(reply(&state)) });
    graph.set_entry("agent");
    graph.add_edge("agent", END);

    let compiled = graph.compile()?;
    println!("{}", compiled.to_mermaid());

    for line in ["hello", "how are you?"] {
        let mut input = StateUpdate::new();
        input.insert("messages".into(), json!([line]));

        let state = compiled.invoke(input, "demo").await?;
        println!("messages: {}", state["messages"]);
    }

    let snapshot = compiled.get_state("demo").await?;
    if let Some(snapshot) = snapshot {
        println!(
            "\nThread 'demo' is at step {} (finished: {})",
            snapshot.step,
            snapshot.is_finished()
        );
    }

    Ok(())
}
