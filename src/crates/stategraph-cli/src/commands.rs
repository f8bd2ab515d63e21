//! Command handlers
//!
//! Each handler writes its output to the given writer so the binary can pass
//! stdout and tests can pass a buffer.

use clap::ValueEnum;
use serde_json::Value;
use stategraph_checkpoint::CheckpointSaver;
use stategraph_core::messages::{self, Message, MESSAGES_CHANNEL};
use stategraph_core::state::State;
use stategraph_core::{CompiledGraph, EngineConfig};
use stategraph_prebuilt::{
    create_chat_agent, create_tool_agent, create_worker_evaluator, mock_tools, task_input,
    MockChatModel, MockEvaluatorModel,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Prebuilt agent selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Chat,
    Tools,
    Worker,
}

/// Compile an agent wired to the mock model and mock tools
pub fn build_agent(
    kind: AgentKind,
    engine: EngineConfig,
    accept_after: usize,
) -> anyhow::Result<CompiledGraph> {
    let model = Arc::new(MockChatModel::new());
    let graph = match kind {
        AgentKind::Chat => create_chat_agent(model, engine)?,
        AgentKind::Tools => create_tool_agent(model, mock_tools(), engine)?,
        AgentKind::Worker => create_worker_evaluator(
            model,
            Arc::new(MockEvaluatorModel::new(accept_after)),
            mock_tools(),
            engine,
        )?,
    };
    Ok(graph)
}

fn last_message(state: &State) -> anyhow::Result<Option<Message>> {
    Ok(messages::from_state(state, MESSAGES_CHANNEL)?.pop())
}

fn message_count(values: &serde_json::Map<String, Value>) -> usize {
    values
        .get(MESSAGES_CHANNEL)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Invoke the agent once per non-empty input line; `quit` or `exit` stops early
///
/// Returns the number of turns taken.
pub async fn chat<R, W>(
    agent: &CompiledGraph,
    thread_id: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut turns = 0;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "quit" | "exit") {
            break;
        }

        let update = messages::append_update(MESSAGES_CHANNEL, vec![Message::human(text)])?;
        let state = agent.invoke(update, thread_id).await?;
        if let Some(reply) = last_message(&state)? {
            writeln!(out, "Assistant: {}", reply.content)?;
        }
        turns += 1;
    }

    tracing::info!(thread_id, turns, "Chat session ended");
    Ok(turns)
}

/// Run the worker/evaluator loop once and report its outcome
pub async fn task<W: Write>(
    agent: &CompiledGraph,
    thread_id: &str,
    task: &str,
    criteria: &str,
    out: &mut W,
) -> anyhow::Result<State> {
    let state = agent.invoke(task_input(task, criteria)?, thread_id).await?;

    let flag = |name: &str| state.get(name).and_then(Value::as_bool).unwrap_or(false);
    writeln!(out, "Success criteria met: {}", flag("success_criteria_met"))?;
    writeln!(out, "User input needed: {}", flag("user_input_needed"))?;
    if let Some(feedback) = state.get("feedback_on_work").and_then(Value::as_str) {
        writeln!(out, "Feedback: {}", feedback)?;
    }
    if let Some(message) = last_message(&state)? {
        writeln!(out, "Final message: {}", message.content)?;
    }
    Ok(state)
}

/// Print every thread id, one per line
pub async fn threads<W: Write>(saver: &dyn CheckpointSaver, out: &mut W) -> anyhow::Result<usize> {
    let threads = saver.list_threads().await?;
    if threads.is_empty() {
        writeln!(out, "No threads")?;
    }
    for thread_id in &threads {
        writeln!(out, "{}", thread_id)?;
    }
    Ok(threads.len())
}

/// Print one line per checkpoint of a thread
pub async fn history<W: Write>(
    saver: &dyn CheckpointSaver,
    thread_id: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let history = saver.get_history(thread_id).await?;
    if history.is_empty() {
        anyhow::bail!("thread '{}' has no checkpoints", thread_id);
    }

    writeln!(out, "{:<6} {:<12} {:<10} {}", "STEP", "NEXT", "MESSAGES", "SOURCE")?;
    for checkpoint in &history {
        let source = checkpoint
            .metadata
            .source
            .as_ref()
            .map_or_else(|| "-".to_string(), |source| format!("{:?}", source).to_lowercase());
        writeln!(
            out,
            "{:<6} {:<12} {:<10} {}",
            checkpoint.step,
            checkpoint.next_node.as_deref().unwrap_or("END"),
            message_count(&checkpoint.values),
            source
        )?;
    }
    Ok(())
}

/// Print the Mermaid flowchart of an agent
pub fn graph<W: Write>(kind: AgentKind, out: &mut W) -> anyhow::Result<()> {
    let agent = build_agent(kind, EngineConfig::default(), 1)?;
    write!(out, "{}", agent.to_mermaid())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[tokio::test]
    async fn test_chat_turns() {
        let agent = build_agent(AgentKind::Chat, EngineConfig::default(), 1).unwrap();
        let mut out = Vec::new();

        let turns = chat(&agent, "t", &b"hello\n\nagain\nquit\nignored\n"[..], &mut out)
            .await
            .unwrap();

        assert_eq!(turns, 2);
        assert_eq!(
            output(out),
            "Assistant: Mock response to: hello\nAssistant: Mock response to: again\n"
        );
        let snapshot = agent.get_state("t").await.unwrap().unwrap();
        assert_eq!(snapshot.step, 2);
    }

    #[tokio::test]
    async fn test_task_reports_flags() {
        let agent = build_agent(AgentKind::Worker, EngineConfig::default(), 2).unwrap();
        let mut out = Vec::new();

        task(&agent, "t", "Write a limerick", "Five lines", &mut out)
            .await
            .unwrap();

        let text = output(out);
        assert!(text.contains("Success criteria met: true"));
        assert!(text.contains("User input needed: false"));
        assert!(text.contains("Final message: Evaluator Feedback on this answer:"));
    }

    #[tokio::test]
    async fn test_threads_and_history() {
        let agent = build_agent(AgentKind::Chat, EngineConfig::default(), 1).unwrap();
        chat(&agent, "alpha", &b"hi\n"[..], &mut Vec::new()).await.unwrap();
        let saver = agent.checkpointer();

        let mut out = Vec::new();
        assert_eq!(threads(saver.as_ref(), &mut out).await.unwrap(), 1);
        assert_eq!(output(out), "alpha\n");

        let mut out = Vec::new();
        history(saver.as_ref(), "alpha", &mut out).await.unwrap();
        let text = output(out);
        let rows: Vec<_> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("1 "));
        assert!(rows[1].contains("END"));
        assert!(rows[1].contains("loop"));

        assert!(history(saver.as_ref(), "missing", &mut Vec::new()).await.is_err());
    }

    #[test]
    fn test_graph_renders_each_agent() {
        let mut out = Vec::new();
        graph(AgentKind::Tools, &mut out).unwrap();
        let text = output(out);
        assert!(text.starts_with("flowchart TD"));
        assert!(text.contains("tools --> agent"));
    }
}
