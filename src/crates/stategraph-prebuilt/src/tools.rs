//! Tools - Named capabilities an agent can invoke
//!
//! A tool takes JSON arguments and returns text for the model to read. The
//! engine never sees tools directly; a [`ToolNode`](crate::tool_node::ToolNode)
//! runs the tool calls a model requested and appends the results to the
//! conversation.
//!
//! # Implementing a Tool
//!
//! ```rust
//! use stategraph_prebuilt::{Result, Tool};
//! use async_trait::async_trait;
//! use serde_json::Value;
//!
//! struct Shout;
//!
//! #[async_trait]
//! impl Tool for Shout {
//!     fn name(&self) -> &str {
//!         "shout"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Upper-cases its input"
//!     }
//!
//!     async fn invoke(&self, args: Value) -> Result<String> {
//!         Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
//!     }
//! }
//! ```
//!
//! # Mock Tools
//!
//! [`mock_tools`] registers stand-ins for web search, a calculator, a file
//! reader and a data analyzer. They return canned text and never touch the
//! network or the filesystem.

use crate::error::{PrebuiltError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named capability with JSON input and text output
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    /// Run the tool
    async fn invoke(&self, args: Value) -> Result<String>;
}

/// Tool metadata, as advertised to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool registry for managing multiple tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn metadata(&self) -> Vec<ToolMetadata> {
        self.tools
            .values()
            .map(|tool| ToolMetadata {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Invoke a tool by name
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| PrebuiltError::ToolNotFound(name.to_string()))?;
        tracing::debug!(tool = name, "Invoking tool");
        tool.invoke(args).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Read the single string argument of a mock tool
///
/// Accepts either `{"<key>": "..."}` or a bare JSON string.
fn string_arg(args: &Value, key: &str) -> Result<String> {
    match args {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PrebuiltError::invalid_input(format!("missing string argument '{}'", key))),
        other => Err(PrebuiltError::invalid_input(format!(
            "expected an object with '{}', got {}",
            key, other
        ))),
    }
}

fn single_arg_schema(key: &str) -> Value {
    json!({
        "type": "object",
        "properties": {key: {"type": "string"}},
        "required": [key],
    })
}

/// Canned search results
#[derive(Debug, Default)]
pub struct MockWebSearch;

#[async_trait]
impl Tool for MockWebSearch {
    fn name(&self) -> &str {
        "mock_web_search"
    }

    fn description(&self) -> &str {
        "Mock web search tool for demonstration."
    }

    fn input_schema(&self) -> Value {
        single_arg_schema("query")
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let query = string_arg(&args, "query")?;
        Ok(format!(
            "Mock search results for '{}': Found 5 relevant articles about the topic.",
            query
        ))
    }
}

/// Evaluates `+ - * /` arithmetic with parentheses
#[derive(Debug, Default)]
pub struct MockCalculator;

#[async_trait]
impl Tool for MockCalculator {
    fn name(&self) -> &str {
        "mock_calculator"
    }

    fn description(&self) -> &str {
        "Mock calculator tool for demonstration."
    }

    fn input_schema(&self) -> Value {
        single_arg_schema("expression")
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let expression = string_arg(&args, "expression")?;
        Ok(match evaluate(&expression) {
            Some(result) => format!("Mock calculation: {} = {}", expression, format_number(result)),
            None => format!("Mock calculation: Could not evaluate '{}'", expression),
        })
    }
}

/// Pretends to read a file
#[derive(Debug, Default)]
pub struct MockFileReader;

#[async_trait]
impl Tool for MockFileReader {
    fn name(&self) -> &str {
        "mock_file_reader"
    }

    fn description(&self) -> &str {
        "Mock file reader tool for demonstration."
    }

    fn input_schema(&self) -> Value {
        single_arg_schema("filename")
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let filename = string_arg(&args, "filename")?;
        Ok(format!(
            "Mock file content from '{}': This is sample content that would be read from the file.",
            filename
        ))
    }
}

/// Pretends to analyze a described dataset
#[derive(Debug, Default)]
pub struct MockDataAnalyzer;

#[async_trait]
impl Tool for MockDataAnalyzer {
    fn name(&self) -> &str {
        "mock_data_analyzer"
    }

    fn description(&self) -> &str {
        "Mock data analyzer tool for demonstration."
    }

    fn input_schema(&self) -> Value {
        single_arg_schema("data_description")
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let description = string_arg(&args, "data_description")?;
        Ok(format!(
            "Mock analysis of '{}': Generated 3 key insights and 2 charts.",
            description
        ))
    }
}

/// Registry holding all four mock tools
pub fn mock_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(MockWebSearch))
        .register(Arc::new(MockCalculator))
        .register(Arc::new(MockFileReader))
        .register(Arc::new(MockDataAnalyzer));
    registry
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Recursive-descent evaluation; `None` on syntax errors or division by zero
fn evaluate(expression: &str) -> Option<f64> {
    let tokens: Vec<char> = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Arithmetic { tokens: &tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos == tokens.len() && value.is_finite() {
        Some(value)
    } else {
        None
    }
}

struct Arithmetic<'a> {
    tokens: &'a [char],
    pos: usize,
}

impl Arithmetic<'_> {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' {
                value * rhs
            } else if rhs == 0.0 {
                return None;
            } else {
                value / rhs
            };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            '-' => {
                self.pos += 1;
                Some(-self.factor()?)
            }
            '(' => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek()? != ')' {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.tokens[start..self.pos].iter().collect();
                literal.parse().ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its arguments"
        }

        async fn invoke(&self, args: Value) -> Result<String> {
            Ok(args.to_string())
        }
    }

    #[tokio::test]
    async fn test_registry_invokes_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let output = registry.invoke("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(output, r#"{"a":1}"#);

        let err = registry.invoke("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, PrebuiltError::ToolNotFound(ref name) if name == "missing"));
    }

    #[test]
    fn test_mock_registry_metadata() {
        let registry = mock_tools();
        assert_eq!(
            registry.names(),
            vec![
                "mock_calculator",
                "mock_data_analyzer",
                "mock_file_reader",
                "mock_web_search"
            ]
        );
        let metadata = registry.metadata();
        assert_eq!(metadata[3].input_schema["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn test_mock_web_search() {
        let output = MockWebSearch
            .invoke(json!({"query": "rust async"}))
            .await
            .unwrap();
        assert_eq!(
            output,
            "Mock search results for 'rust async': Found 5 relevant articles about the topic."
        );
        assert!(MockWebSearch.invoke(json!({"q": 1})).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_calculator() {
        let calc = MockCalculator;
        assert_eq!(
            calc.invoke(json!({"expression": "2 + 3 * (4 - 1)"})).await.unwrap(),
            "Mock calculation: 2 + 3 * (4 - 1) = 11"
        );
        assert_eq!(
            calc.invoke(json!("10 / 4")).await.unwrap(),
            "Mock calculation: 10 / 4 = 2.5"
        );
        assert_eq!(
            calc.invoke(json!("1 / 0")).await.unwrap(),
            "Mock calculation: Could not evaluate '1 / 0'"
        );
        assert_eq!(
            calc.invoke(json!("import os")).await.unwrap(),
            "Mock calculation: Could not evaluate 'import os'"
        );
    }

    #[test]
    fn test_evaluate_precedence_and_unary() {
        assert_eq!(evaluate("-2*3+1"), Some(-5.0));
        assert_eq!(evaluate("(1+2)*(3+4)"), Some(21.0));
        assert_eq!(evaluate("1.5*2"), Some(3.0));
        assert_eq!(evaluate("(1+2"), None);
        assert_eq!(evaluate(""), None);
    }
}
