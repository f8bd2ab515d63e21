//! Engine configuration and YAML loading
//!
//! [`EngineConfig`] carries the knobs of the execution loop. It is passed
//! explicitly into [`StateGraph::compile_with_config`](crate::StateGraph::compile_with_config);
//! nothing is read from process-wide state at run time.
//!
//! Configuration files are YAML. String values may reference environment
//! variables as `${ENV_VAR:default}`; a value that is exactly one placeholder is
//! re-read as a YAML scalar, so `max_steps: ${MAX_STEPS:25}` yields a number.
//!
//! ```yaml
//! max_steps: ${STATEGRAPH_MAX_STEPS:40}
//! node_timeout_ms: 30000
//! message_window: 50
//! ```
//!
//! After the file, `STATEGRAPH_MAX_STEPS` and `STATEGRAPH_NODE_TIMEOUT_MS` in
//! the environment override the loaded values.

use crate::error::{GraphError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: usize = 25;
pub const MAX_STEPS_ENV: &str = "STATEGRAPH_MAX_STEPS";
pub const NODE_TIMEOUT_ENV: &str = "STATEGRAPH_NODE_TIMEOUT_MS";

/// Execution loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node executions allowed per run before `StepLimitExceeded`
    pub max_steps: usize,

    /// Deadline for a single node handler; none means wait indefinitely
    pub node_timeout_ms: Option<u64>,

    /// Retention bound applied to the `messages` channel
    pub message_window: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            node_timeout_ms: None,
            message_window: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn with_message_window(mut self, window: usize) -> Self {
        self.message_window = Some(window);
        self
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(GraphError::configuration("max_steps must be at least 1"));
        }
        if self.node_timeout_ms == Some(0) {
            return Err(GraphError::configuration("node_timeout_ms must be positive"));
        }
        if self.message_window == Some(0) {
            return Err(GraphError::configuration("message_window must be positive"));
        }
        Ok(())
    }

    /// Parse from YAML text, expanding `${ENV:default}` placeholders
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        parse_yaml(content)
    }

    /// Load a YAML file, apply environment overrides, and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_yaml(path)?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STATEGRAPH_MAX_STEPS` / `STATEGRAPH_NODE_TIMEOUT_MS`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    pub(crate) fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(MAX_STEPS_ENV) {
            self.max_steps = raw.trim().parse().map_err(|_| {
                GraphError::configuration(format!("{} is not a number: '{}'", MAX_STEPS_ENV, raw))
            })?;
        }
        if let Some(raw) = lookup(NODE_TIMEOUT_ENV) {
            let timeout: u64 = raw.trim().parse().map_err(|_| {
                GraphError::configuration(format!("{} is not a number: '{}'", NODE_TIMEOUT_ENV, raw))
            })?;
            self.node_timeout_ms = Some(timeout);
        }
        Ok(self)
    }
}

/// Load and deserialize a YAML file with environment expansion
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "Loading configuration");
    parse_yaml(&content)
}

/// Deserialize YAML text with environment expansion
pub fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T> {
    parse_yaml_with(content, |key| env::var(key).ok())
}

pub(crate) fn parse_yaml_with<T, F>(content: &str, lookup: F) -> Result<T>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<String>,
{
    let mut value: YamlValue = serde_yaml::from_str(content)?;
    // An empty document means "all defaults"
    if value.is_null() {
        value = YamlValue::Mapping(Default::default());
    }
    expand_variables(&mut value, &lookup)?;
    Ok(serde_yaml::from_value(value)?)
}

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").ok())
        .as_ref()
}

/// Expand environment variables in the format ${ENV_VAR:default}
fn expand_variables<F>(value: &mut YamlValue, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        YamlValue::String(s) => {
            if let Some(expanded) = expand_env_in_string(s, lookup) {
                let whole = placeholder_regex()
                    .and_then(|re| re.find(s))
                    .map_or(false, |m| m.start() == 0 && m.end() == s.len());
                *value = if whole {
                    serde_yaml::from_str(&expanded)
                        .unwrap_or(YamlValue::String(expanded))
                } else {
                    YamlValue::String(expanded)
                };
            }
        }
        YamlValue::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_variables(v, lookup)?;
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                expand_variables(item, lookup)?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Expand environment variables in a string
fn expand_env_in_string<F>(s: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !s.contains("${") {
        return None;
    }

    let expanded = placeholder_regex()?.replace_all(s, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        lookup(var_name).unwrap_or_else(|| default_value.to_string())
    });

    Some(expanded.into_owned())
}
