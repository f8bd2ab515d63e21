//! Worker/Evaluator - A worker answers, an evaluator judges against criteria
//!
//! ```text
//!   START ──► worker ──tools──► tools ──► worker
//!               │
//!               └──done──► evaluator ──retry──► worker
//!                              │
//!                              └──finish──► END
//! ```
//!
//! The worker sees the success criteria and, after a rejection, the
//! evaluator's feedback in its system prompt. The evaluator's model must reply
//! with [`EvaluatorOutput`] JSON. The loop finishes once the criteria are met
//! or the evaluator decides the user has to step in; a reply that cannot be
//! parsed counts as the latter, so a confused evaluator stops the loop instead
//! of spinning until the step limit.
//!
//! # State Channels
//!
//! | Channel | Kind | Merge | Written by |
//! |---------|------|-------|------------|
//! | `messages` | messages | append | worker, tools, evaluator |
//! | `success_criteria` | string | replace | caller |
//! | `feedback_on_work` | string | replace | evaluator |
//! | `success_criteria_met` | bool (default `false`) | replace | evaluator |
//! | `user_input_needed` | bool (default `false`) | replace | evaluator |

use crate::agents::chat::with_system_message;
use crate::error::Result;
use crate::model::ChatModel;
use crate::tool_node::{tools_condition, ToolNode, END_LABEL, TOOLS_LABEL};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stategraph_core::messages::{self, Message, MessageRole, MESSAGES_CHANNEL};
use stategraph_core::node::{NodeHandler, NodeResult};
use stategraph_core::state::{ChannelSpec, State, StateUpdate, ValueKind};
use stategraph_core::{CompiledGraph, EngineConfig, StateGraph, END};
use std::sync::{Arc, OnceLock};

pub const WORKER_NODE: &str = "worker";
pub const TOOLS_NODE: &str = "tools";
pub const EVALUATOR_NODE: &str = "evaluator";

pub const SUCCESS_CRITERIA: &str = "success_criteria";
pub const FEEDBACK_ON_WORK: &str = "feedback_on_work";
pub const SUCCESS_CRITERIA_MET: &str = "success_criteria_met";
pub const USER_INPUT_NEEDED: &str = "user_input_needed";

/// Structured verdict the evaluator model replies with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorOutput {
    /// Feedback on the worker's response
    pub feedback: String,

    pub success_criteria_met: bool,

    /// More input is needed from the user, or the worker is stuck
    pub user_input_needed: bool,
}

impl EvaluatorOutput {
    /// Parse a model reply, tolerating a fenced ```json block around the object
    pub fn parse(reply: &str) -> Option<Self> {
        static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
        let fenced = FENCED.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").ok());

        let body = fenced
            .as_ref()
            .and_then(|re| re.captures(reply))
            .and_then(|caps| caps.get(1))
            .map_or(reply.trim(), |m| m.as_str());

        serde_json::from_str(body).ok()
    }

    /// Whether the loop should stop here
    pub fn is_final(&self) -> bool {
        self.success_criteria_met || self.user_input_needed
    }
}

/// Caller input starting (or restarting) a task on a thread
pub fn task_input(task: impl Into<String>, criteria: impl Into<String>) -> Result<StateUpdate> {
    let mut input = messages::append_update(MESSAGES_CHANNEL, vec![Message::human(task)])?;
    input.insert(SUCCESS_CRITERIA.into(), Value::String(criteria.into()));
    // Feedback on an earlier task must not leak into this one
    input.insert(FEEDBACK_ON_WORK.into(), Value::Null);
    input.insert(SUCCESS_CRITERIA_MET.into(), Value::Bool(false));
    input.insert(USER_INPUT_NEEDED.into(), Value::Bool(false));
    Ok(input)
}

fn text_channel<'a>(state: &'a State, channel: &str) -> Option<&'a str> {
    state
        .get(channel)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn flag(state: &State, channel: &str) -> bool {
    state.get(channel).and_then(Value::as_bool).unwrap_or(false)
}

/// Does the work, asking for tools or giving an answer
pub struct WorkerNode {
    model: Arc<dyn ChatModel>,
}

impl WorkerNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn system_prompt(state: &State) -> String {
        let criteria = text_channel(state, SUCCESS_CRITERIA).unwrap_or("(none given)");
        let mut prompt = format!(
            "You are a helpful assistant that can use tools to complete tasks.\n\
             You keep working on a task until either you have a question or clarification for the user, \
             or the success criteria is met.\n\
             This is the success criteria: {}\n\
             Reply either with a question for the user about this assignment, or with your final response.\n\
             If you have a question for the user, clearly state that you are asking a question, for example:\n\n\
             Question: Please clarify whether you want a summary or a detailed answer\n\n\
             If you have finished, reply with the final answer and don't ask a question.",
            criteria
        );

        if let Some(feedback) = text_channel(state, FEEDBACK_ON_WORK) {
            prompt.push_str(&format!(
                "\n\nPreviously you thought you completed the assignment, but your reply was rejected \
                 because the success criteria was not met.\n\
                 Here is the feedback on why this was rejected: {}\n\
                 With this feedback in mind, continue the assignment, ensuring that you meet the \
                 success criteria or ask for more information if needed.",
                feedback
            ));
        }
        prompt
    }
}

#[async_trait]
impl NodeHandler for WorkerNode {
    async fn run(&self, state: State) -> NodeResult {
        let history = messages::from_state(&state, MESSAGES_CHANNEL)?;
        let prompt = with_system_message(history, &Self::system_prompt(&state));
        let reply = self.model.generate(&prompt).await?;
        Ok(messages::append_update(MESSAGES_CHANNEL, vec![reply])?)
    }
}

/// Judges the worker's last answer
pub struct EvaluatorNode {
    model: Arc<dyn ChatModel>,
}

impl EvaluatorNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn prompt(state: &State, history: &[Message]) -> Vec<Message> {
        let last_response = history.last().map_or("", |message| message.content.as_str());
        let criteria = text_channel(state, SUCCESS_CRITERIA).unwrap_or("(none given)");

        let system = "You are an evaluator that determines whether the assistant has met the success criteria. \
             Assess the assistant's last response based on the given criteria. Reply with JSON of the form \
             {\"feedback\": string, \"success_criteria_met\": bool, \"user_input_needed\": bool}.";

        let mut request = format!(
            "You are evaluating a conversation between the user and assistant.\n\
             The entire conversation, with the user's original request and all replies, is:\n\
             {}\n\
             The success criteria for this assignment is:\n{}\n\n\
             And the final response from the assistant that you are evaluating is:\n{}\n\n\
             Respond with your feedback and your decision on whether the success criteria has been met. \
             Also decide if more user input is required, either because the assistant is stuck, \
             or because the user needs to clarify their request.",
            format_conversation(history),
            criteria,
            last_response
        );

        if let Some(previous) = text_channel(state, FEEDBACK_ON_WORK) {
            request.push_str(&format!(
                "\nIn a prior attempt from the assistant, you provided this feedback: {}\n\
                 If the assistant is repeating the same mistakes, consider responding that user input is needed.",
                previous
            ));
        }

        vec![Message::system(system), Message::human(request)]
    }
}

/// Transcript of user and assistant turns for the evaluator
pub fn format_conversation(history: &[Message]) -> String {
    let mut conversation = String::from("Conversation history:\n\n");
    for message in history {
        match message.role {
            MessageRole::Human => {
                conversation.push_str(&format!("User: {}\n", message.content));
            }
            MessageRole::Ai => {
                let text = if message.content.is_empty() {
                    "[Tools use]"
                } else {
                    message.content.as_str()
                };
                conversation.push_str(&format!("Assistant: {}\n", text));
            }
            MessageRole::System | MessageRole::Tool => {}
        }
    }
    conversation
}

#[async_trait]
impl NodeHandler for EvaluatorNode {
    async fn run(&self, state: State) -> NodeResult {
        let history = messages::from_state(&state, MESSAGES_CHANNEL)?;
        let reply = self.model.generate(&Self::prompt(&state, &history)).await?;

        let verdict = EvaluatorOutput::parse(&reply.content).unwrap_or_else(|| {
            tracing::warn!(reply = %reply.content, "Evaluator reply is not valid verdict JSON");
            EvaluatorOutput {
                feedback: format!("Could not understand the evaluation: {}", reply.content),
                success_criteria_met: false,
                user_input_needed: true,
            }
        });

        tracing::info!(
            met = verdict.success_criteria_met,
            user_input_needed = verdict.user_input_needed,
            "Evaluated answer"
        );

        let note = Message::ai(format!("Evaluator Feedback on this answer: {}", verdict.feedback));
        let mut update = messages::append_update(MESSAGES_CHANNEL, vec![note])?;
        update.insert(FEEDBACK_ON_WORK.into(), json!(verdict.feedback));
        update.insert(SUCCESS_CRITERIA_MET.into(), json!(verdict.success_criteria_met));
        update.insert(USER_INPUT_NEEDED.into(), json!(verdict.user_input_needed));
        Ok(update)
    }
}

/// Route out of the evaluator: `"finish"` or `"retry"`
pub fn route_after_evaluation(state: &State) -> &'static str {
    if flag(state, SUCCESS_CRITERIA_MET) || flag(state, USER_INPUT_NEEDED) {
        "finish"
    } else {
        "retry"
    }
}

/// Compile the worker/evaluator loop
pub fn create_worker_evaluator(
    worker_model: Arc<dyn ChatModel>,
    evaluator_model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    config: EngineConfig,
) -> Result<CompiledGraph> {
    let mut graph = StateGraph::with_messages();
    graph
        .add_channel(SUCCESS_CRITERIA, ChannelSpec::replace(ValueKind::String))
        .add_channel(FEEDBACK_ON_WORK, ChannelSpec::replace(ValueKind::String))
        .add_channel(
            SUCCESS_CRITERIA_MET,
            ChannelSpec::replace(ValueKind::Bool).with_default(json!(false)),
        )
        .add_channel(
            USER_INPUT_NEEDED,
            ChannelSpec::replace(ValueKind::Bool).with_default(json!(false)),
        );

    graph
        .add_node_handler(WORKER_NODE, Arc::new(WorkerNode::new(worker_model)))
        .add_node_handler(TOOLS_NODE, Arc::new(ToolNode::new(tools)))
        .add_node_handler(EVALUATOR_NODE, Arc::new(EvaluatorNode::new(evaluator_model)))
        .declare_writes(WORKER_NODE, [MESSAGES_CHANNEL])
        .declare_writes(TOOLS_NODE, [MESSAGES_CHANNEL])
        .declare_writes(
            EVALUATOR_NODE,
            [
                MESSAGES_CHANNEL,
                FEEDBACK_ON_WORK,
                SUCCESS_CRITERIA_MET,
                USER_INPUT_NEEDED,
            ],
        );

    graph
        .set_entry(WORKER_NODE)
        .add_conditional_edge(
            WORKER_NODE,
            tools_condition,
            [(TOOLS_LABEL, TOOLS_NODE), (END_LABEL, EVALUATOR_NODE)],
        )
        .add_edge(TOOLS_NODE, WORKER_NODE)
        .add_conditional_edge(
            EVALUATOR_NODE,
            route_after_evaluation,
            [("retry", WORKER_NODE), ("finish", END)],
        );

    Ok(graph.compile_with_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MockChatModel, MockEvaluatorModel, ScriptedChatModel};
    use crate::tools::mock_tools;
    use stategraph_core::messages::ToolCall;
    use stategraph_core::GraphError;

    fn agent(
        worker: Arc<dyn ChatModel>,
        evaluator: Arc<dyn ChatModel>,
    ) -> CompiledGraph {
        create_worker_evaluator(worker, evaluator, mock_tools(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_verdict() {
        let plain = r#"{"feedback": "good", "success_criteria_met": true, "user_input_needed": false}"#;
        let verdict = EvaluatorOutput::parse(plain).unwrap();
        assert!(verdict.success_criteria_met);
        assert!(verdict.is_final());

        let fenced = "Here you go:\n```json\n{\"feedback\": \"more\", \"success_criteria_met\": false, \"user_input_needed\": false}\n```";
        let verdict = EvaluatorOutput::parse(fenced).unwrap();
        assert_eq!(verdict.feedback, "more");
        assert!(!verdict.is_final());

        assert!(EvaluatorOutput::parse("looks fine to me").is_none());
    }

    #[test]
    fn test_format_conversation() {
        let history = vec![
            Message::system("ignored"),
            Message::human("task"),
            Message::ai(""),
            Message::tool("result", "call_1"),
            Message::ai("answer"),
        ];
        assert_eq!(
            format_conversation(&history),
            "Conversation history:\n\nUser: task\nAssistant: [Tools use]\nAssistant: answer\n"
        );
    }

    #[tokio::test]
    async fn test_accepted_first_time() {
        let graph = agent(Arc::new(MockChatModel::new()), Arc::new(MockEvaluatorModel::new(1)));

        let state = graph
            .invoke(task_input("write a haiku", "three lines").unwrap(), "t")
            .await
            .unwrap();

        assert_eq!(state[SUCCESS_CRITERIA_MET], json!(true));
        assert_eq!(state[USER_INPUT_NEEDED], json!(false));
        let history = messages::from_state(&state, MESSAGES_CHANNEL).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "Mock response to: write a haiku");
        assert!(history[2].content.starts_with("Evaluator Feedback on this answer:"));
    }

    #[tokio::test]
    async fn test_rejection_feeds_back_into_worker() {
        let worker = Arc::new(ScriptedChatModel::from_texts(["draft", "final"]));
        let evaluator = Arc::new(MockEvaluatorModel::new(2));
        let graph = agent(worker.clone(), evaluator.clone());

        let state = graph
            .invoke(task_input("summarize", "one sentence").unwrap(), "t")
            .await
            .unwrap();

        assert_eq!(evaluator.calls(), 2);
        assert_eq!(state[SUCCESS_CRITERIA_MET], json!(true));

        let prompts = worker.prompts().await;
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0][0].content.contains("Previously you thought"));
        assert!(prompts[1][0].content.contains("Attempt 1 is incomplete"));
        assert_eq!(prompts[1][0].role, MessageRole::System);

        // worker, evaluator, worker, evaluator
        let history = graph.get_state_history("t").await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_new_task_clears_previous_feedback() {
        let worker = Arc::new(ScriptedChatModel::from_texts(["draft", "final", "second task"]));
        let evaluator = Arc::new(MockEvaluatorModel::new(2));
        let graph = agent(worker.clone(), evaluator.clone());

        graph
            .invoke(task_input("summarize", "one sentence").unwrap(), "t")
            .await
            .unwrap();
        let state = graph
            .invoke(task_input("translate", "in french").unwrap(), "t")
            .await
            .unwrap();

        assert_eq!(state[SUCCESS_CRITERIA], json!("in french"));
        assert_eq!(state[SUCCESS_CRITERIA_MET], json!(true));

        let prompts = worker.prompts().await;
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1][0].content.contains("Previously you thought"));
        assert!(!prompts[2][0].content.contains("Previously you thought"));
        assert!(prompts[2][0].content.contains("in french"));
    }

    #[test]
    fn test_task_input_resets_loop_channels() {
        let input = task_input("task", "criteria").unwrap();
        assert_eq!(input[FEEDBACK_ON_WORK], Value::Null);
        assert_eq!(input[SUCCESS_CRITERIA_MET], json!(false));
        assert_eq!(input[USER_INPUT_NEEDED], json!(false));
    }

    #[tokio::test]
    async fn test_worker_uses_tools_before_evaluation() {
        let worker = Arc::new(ScriptedChatModel::new([
            Message::ai("").with_tool_calls(vec![ToolCall::new(
                "mock_calculator",
                json!({"expression": "1000*1.05*1.05*1.05"}),
            )]),
            Message::ai("The final amount is 1157.63"),
        ]));
        let graph = agent(worker, Arc::new(MockEvaluatorModel::new(1)));

        let state = graph
            .invoke(task_input("compound interest", "show the amount").unwrap(), "t")
            .await
            .unwrap();

        let history = messages::from_state(&state, MESSAGES_CHANNEL).unwrap();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::Human,
                MessageRole::Ai,
                MessageRole::Tool,
                MessageRole::Ai,
                MessageRole::Ai
            ]
        );
        assert!(history[2].content.starts_with("Mock calculation: 1000*1.05*1.05*1.05 = 1157.6"));
    }

    #[tokio::test]
    async fn test_unparseable_verdict_stops_loop() {
        let evaluator = Arc::new(ScriptedChatModel::from_texts(["seems fine"]));
        let graph = agent(Arc::new(MockChatModel::new()), evaluator);

        let state = graph
            .invoke(task_input("task", "criteria").unwrap(), "t")
            .await
            .unwrap();

        assert_eq!(state[SUCCESS_CRITERIA_MET], json!(false));
        assert_eq!(state[USER_INPUT_NEEDED], json!(true));
        assert!(graph.get_state("t").await.unwrap().unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_never_satisfied_hits_step_limit() {
        let config = EngineConfig::default().with_max_steps(6);
        let graph = create_worker_evaluator(
            Arc::new(MockChatModel::new()),
            Arc::new(MockEvaluatorModel::new(usize::MAX)),
            mock_tools(),
            config,
        )
        .unwrap();

        let err = graph
            .invoke(task_input("task", "impossible").unwrap(), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::StepLimitExceeded { limit: 6, .. }));
    }

    #[test]
    fn test_mermaid_shows_loop() {
        let graph = agent(Arc::new(MockChatModel::new()), Arc::new(MockEvaluatorModel::new(1)));
        let mermaid = graph.to_mermaid();
        assert!(mermaid.contains("tools --> worker"));
        assert!(mermaid.contains(r#"evaluator -. "retry" .-> worker"#));
    }
}
