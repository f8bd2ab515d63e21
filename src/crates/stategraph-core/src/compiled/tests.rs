//! Tests for CompiledGraph

use super::graph::ThreadLocks;
use super::{CompiledGraph, ExecutionEvent};
use crate::error::GraphError;
use crate::state::{ChannelSpec, State, StateUpdate, ValueKind};
use crate::{StateGraph, END};
use futures::StreamExt;
use serde_json::{json, Value};
use stategraph_checkpoint::CheckpointSource;
use std::sync::Arc;
use std::time::Duration;

fn update(value: Value) -> StateUpdate {
    value.as_object().cloned().unwrap()
}

/// counter → END, incrementing `count` on every run
fn counter_graph() -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("count", ChannelSpec::replace(ValueKind::Number));
    graph.add_channel("note", ChannelSpec::replace(ValueKind::String));
    graph.add_node_with_writes("counter", ["count"], |state: State| async move {
        let n = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(update(json!({"count": n + 1})))
    });
    graph.set_entry("counter").add_finish("counter");
    graph.compile().unwrap()
}

/// first → second → END
fn two_step_graph() -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("trail", ChannelSpec::append(ValueKind::Array));
    graph.add_node("first", |_state: State| async move { Ok(update(json!({"trail": ["first"]}))) });
    graph.add_node("second", |_state: State| async move {
        Ok(update(json!({"trail": ["second"]})))
    });
    graph.set_entry("first");
    graph.add_edge("first", "second").add_finish("second");
    graph.compile().unwrap()
}

#[tokio::test]
async fn test_default_checkpointer_persists_between_runs() {
    let compiled = counter_graph();
    compiled.invoke(StateUpdate::new(), "t").await.unwrap();
    let state = compiled.invoke(StateUpdate::new(), "t").await.unwrap();
    assert_eq!(state["count"], json!(2));

    let snapshot = compiled.get_state("t").await.unwrap().unwrap();
    assert_eq!(snapshot.step, 2);
    assert!(snapshot.is_finished());
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Loop));
    assert_eq!(snapshot.metadata.node.as_deref(), Some("counter"));
}

#[tokio::test]
async fn test_writes_outside_declaration_fail() {
    let mut graph = StateGraph::new();
    graph.add_channel("count", ChannelSpec::replace(ValueKind::Number));
    graph.add_channel("note", ChannelSpec::replace(ValueKind::String));
    graph.add_node_with_writes("counter", ["count"], |_state: State| async move {
        Ok(update(json!({"note": "sneaky"})))
    });
    graph.set_entry("counter").add_finish("counter");
    let compiled = graph.compile().unwrap();

    let err = compiled.invoke(StateUpdate::new(), "t").await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(ref m) if m.contains("outside its declared writes")));
    assert!(compiled.get_state("t").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_thread_id_rejected() {
    let err = counter_graph().invoke(StateUpdate::new(), "").await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));
}

#[tokio::test]
async fn test_resume_unknown_thread() {
    let err = counter_graph().resume("nobody").await.unwrap_err();
    assert!(matches!(err, GraphError::ThreadNotFound(ref t) if t == "nobody"));
}

#[tokio::test]
async fn test_resume_finished_thread_returns_state() {
    let compiled = counter_graph();
    compiled.invoke(StateUpdate::new(), "t").await.unwrap();

    let state = compiled.resume("t").await.unwrap();
    assert_eq!(state["count"], json!(1));
    assert_eq!(compiled.get_state_history("t").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_state_keeps_pending_node() {
    let compiled = counter_graph();
    compiled.invoke(StateUpdate::new(), "t").await.unwrap();

    let snapshot = compiled
        .update_state("t", update(json!({"note": "checked"})), None)
        .await
        .unwrap();
    assert_eq!(snapshot.step, 2);
    assert_eq!(snapshot.values["note"], json!("checked"));
    assert_eq!(snapshot.values["count"], json!(1));
    assert!(snapshot.next_node.is_none());
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Update));
}

#[tokio::test]
async fn test_update_state_on_new_thread_pends_entry() {
    let compiled = two_step_graph();
    let snapshot = compiled
        .update_state("fresh", update(json!({"trail": ["seed"]})), None)
        .await
        .unwrap();
    assert_eq!(snapshot.step, 1);
    assert_eq!(snapshot.next_node.as_deref(), Some("first"));

    let state = compiled.resume("fresh").await.unwrap();
    assert_eq!(state["trail"], json!(["seed", "first", "second"]));
}

#[tokio::test]
async fn test_update_state_as_node_routes() {
    let compiled = two_step_graph();
    let snapshot = compiled
        .update_state("t", update(json!({"trail": ["manual"]})), Some("first"))
        .await
        .unwrap();
    assert_eq!(snapshot.next_node.as_deref(), Some("second"));
    assert_eq!(snapshot.metadata.node.as_deref(), Some("first"));

    let state = compiled.resume("t").await.unwrap();
    assert_eq!(state["trail"], json!(["manual", "second"]));
}

#[tokio::test]
async fn test_update_state_rejects_bad_input() {
    let compiled = counter_graph();
    let err = compiled
        .update_state("t", update(json!({"mood": "happy"})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));

    let err = compiled
        .update_state("t", update(json!({"note": "x"})), Some("counter"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Configuration(ref m) if m.contains("may not write")));

    let err = compiled
        .update_state("t", update(json!({"count": 1})), Some("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));
    assert!(compiled.get_state("t").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rewind_copies_earlier_step() {
    let compiled = counter_graph();
    for _ in 0..3 {
        compiled.invoke(StateUpdate::new(), "t").await.unwrap();
    }

    let snapshot = compiled.rewind("t", 1).await.unwrap();
    assert_eq!(snapshot.step, 4);
    assert_eq!(snapshot.values["count"], json!(1));
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Fork));
    assert_eq!(snapshot.metadata.extra["forked_from"], json!(1));

    let state = compiled.invoke(StateUpdate::new(), "t").await.unwrap();
    assert_eq!(state["count"], json!(2));
    assert_eq!(compiled.get_state_history("t").await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_rewind_missing_step() {
    let compiled = counter_graph();
    assert!(matches!(
        compiled.rewind("t", 1).await.unwrap_err(),
        GraphError::ThreadNotFound(_)
    ));

    compiled.invoke(StateUpdate::new(), "t").await.unwrap();
    assert!(matches!(
        compiled.rewind("t", 9).await.unwrap_err(),
        GraphError::Checkpoint(_)
    ));
}

#[tokio::test]
async fn test_stream_event_order() {
    let compiled = two_step_graph();
    let events: Vec<ExecutionEvent> = compiled.stream(StateUpdate::new(), "t").collect().await;

    assert_eq!(events.len(), 7);
    assert_eq!(
        events[0],
        ExecutionEvent::NodeStart {
            node: "first".into(),
            step: 1
        }
    );
    assert!(matches!(events[1], ExecutionEvent::NodeEnd { ref node, .. } if node == "first"));
    assert_eq!(
        events[2],
        ExecutionEvent::CheckpointSaved {
            step: 1,
            next_node: Some("second".into())
        }
    );
    assert_eq!(
        events[5],
        ExecutionEvent::CheckpointSaved {
            step: 2,
            next_node: None
        }
    );
    match &events[6] {
        ExecutionEvent::Completed { state } => assert_eq!(state["trail"], json!(["first", "second"])),
        other => panic!("unexpected final event: {other:?}"),
    }
    assert!(events[6].is_terminal());
}

#[tokio::test]
async fn test_stream_reports_failure_last() {
    let mut graph = StateGraph::new();
    graph.add_node("broken", |_state: State| async move {
        Err::<StateUpdate, crate::node::NodeError>("boom".into())
    });
    graph.set_entry("broken").add_finish("broken");
    let compiled = graph.compile().unwrap();

    let events: Vec<ExecutionEvent> = compiled.stream(StateUpdate::new(), "t").collect().await;
    assert_eq!(events.len(), 2);
    match &events[1] {
        ExecutionEvent::Failed { error } => assert!(error.contains("boom")),
        other => panic!("unexpected final event: {other:?}"),
    }
}

#[tokio::test]
async fn test_same_thread_runs_are_serialized() {
    let mut graph = StateGraph::new();
    graph.add_channel("count", ChannelSpec::replace(ValueKind::Number));
    graph.add_node("slow_counter", |state: State| async move {
        let n = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(update(json!({"count": n + 1})))
    });
    graph.set_entry("slow_counter").add_edge("slow_counter", END);
    let compiled = graph.compile().unwrap();

    let runs = (0..4).map(|_| {
        let compiled = compiled.clone();
        tokio::spawn(async move { compiled.invoke(StateUpdate::new(), "shared").await })
    });
    for run in futures::future::join_all(runs).await {
        run.unwrap().unwrap();
    }

    let snapshot = compiled.get_state("shared").await.unwrap().unwrap();
    assert_eq!(snapshot.values["count"], json!(4));
    assert_eq!(snapshot.step, 4);
}

#[tokio::test]
async fn test_thread_locks_are_per_thread() {
    let locks = Arc::new(ThreadLocks::default());
    let held = locks.acquire("a").await;

    // A different thread is not blocked by "a"
    let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
    assert!(other.is_ok());

    let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("a")).await;
    assert!(same.is_err());
    drop(held);
    assert!(tokio::time::timeout(Duration::from_millis(50), locks.acquire("a"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_thread_locks_released_after_runs() {
    let compiled = counter_graph();
    for i in 0..50 {
        compiled
            .invoke(StateUpdate::new(), &format!("t{i}"))
            .await
            .unwrap();
    }
    compiled.resume("t0").await.unwrap();
    compiled.get_state_history("t1").await.unwrap();
    assert_eq!(compiled.locks.len(), 0);
    assert_eq!(compiled.list_threads().await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_waiting_run_keeps_thread_lock() {
    let locks = Arc::new(ThreadLocks::default());
    let held = locks.acquire("a").await;

    let waiter = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let _guard = locks.acquire("a").await;
            locks.len()
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);

    // The entry outlives the first guard while the waiter holds it
    assert_eq!(waiter.await.unwrap(), 1);
    assert_eq!(locks.len(), 0);
}

#[test]
fn test_mermaid_from_compiled() {
    let diagram = two_step_graph().to_mermaid();
    assert!(diagram.starts_with("flowchart TD"));
    assert!(diagram.contains("first --> second"));
}
