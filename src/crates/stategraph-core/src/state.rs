//! State channel model: declared channels and their merge policies
//!
//! The state threaded through a run is a mapping from channel name to JSON
//! value. Every channel is declared up front with a [`ValueKind`] and a
//! [`MergePolicy`] that decides how a node's partial update combines with the
//! current value.
//!
//! | Policy | Behavior | Use Case |
//! |--------|----------|----------|
//! | [`MergePolicy::Replace`] | New value overwrites old | Flags, feedback text, criteria |
//! | [`MergePolicy::Append`] | `current ++ incoming`, order kept, no dedup, optional window | Message history |
//! | [`MergePolicy::Custom`] | Caller-supplied [`Reducer`] seeded with an identity element | Counters, maxima |
//!
//! Updates are applied per channel and all-or-nothing: if any channel of an
//! update is undeclared or rejects its value, the state is left untouched.
//!
//! ```rust
//! use stategraph_core::state::{ChannelSpec, MergePolicy, StateSchema, SumReducer, ValueKind};
//! use serde_json::json;
//!
//! let mut schema = StateSchema::new();
//! schema.add_channel("messages", ChannelSpec::append(ValueKind::Array));
//! schema.add_channel("status", ChannelSpec::replace(ValueKind::String));
//! schema.add_channel(
//!     "tokens",
//!     ChannelSpec::new(ValueKind::Number, MergePolicy::custom(SumReducer, json!(0))),
//! );
//!
//! let mut state = schema.initial_state();
//! let update = json!({"messages": ["hello"], "status": "thinking", "tokens": 12});
//! schema.apply(&mut state, update.as_object().unwrap()).unwrap();
//!
//! assert_eq!(state["messages"], json!(["hello"]));
//! assert_eq!(state["tokens"], json!(12));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Live channel values of one run
pub type State = Map<String, Value>;

/// Partial update returned by a node: only the channels it writes
pub type StateUpdate = Map<String, Value>;

/// Errors raised while merging an update into state
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    /// The update names a channel the schema does not declare
    #[error("Channel '{0}' is not declared")]
    UndeclaredChannel(String),

    #[error("Channel '{channel}' expects {expected}, got {found}")]
    TypeMismatch {
        channel: String,
        expected: ValueKind,
        found: String,
    },

    /// Append channels only accept sequences
    #[error("Channel '{channel}' appends sequences, got {found}")]
    AppendRequiresSequence { channel: String, found: String },

    #[error("Reducer '{reducer}' failed on channel '{channel}': {message}")]
    Reducer {
        channel: String,
        reducer: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Short JSON type name for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declared value type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Any,
    String,
    Bool,
    Number,
    Array,
    Object,
    /// Sequence of chat messages, each an object with `role` and `content`
    Messages,
}

impl ValueKind {
    /// Whether a value has this kind. `null` only matches [`ValueKind::Any`].
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::String => value.is_string(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Number => value.is_number(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
            ValueKind::Messages => value
                .as_array()
                .map_or(false, |items| items.iter().all(is_message_value)),
        }
    }

    /// Kinds whose values are sequences, the only ones an append channel can hold
    pub fn is_sequence(&self) -> bool {
        matches!(self, ValueKind::Any | ValueKind::Array | ValueKind::Messages)
    }
}

fn is_message_value(value: &Value) -> bool {
    value.get("role").map_or(false, Value::is_string) && value.get("content").is_some()
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Messages => "messages",
        };
        f.write_str(name)
    }
}

/// Combines the current value of a channel with an incoming write
///
/// Implementations must be pure. `current` is never absent: on a channel's
/// first write the schema passes the policy's identity element instead.
///
/// ```rust
/// use stategraph_core::state::Reducer;
/// use serde_json::{json, Value};
///
/// /// Keeps the maximum numeric value
/// struct MaxReducer;
///
/// impl Reducer for MaxReducer {
///     fn reduce(&self, current: &Value, update: &Value) -> Result<Value, String> {
///         let a = current.as_f64().ok_or("current is not a number")?;
///         let b = update.as_f64().ok_or("update is not a number")?;
///         Ok(json!(a.max(b)))
///     }
///
///     fn name(&self) -> &str {
///         "max"
///     }
/// }
/// ```
pub trait Reducer: Send + Sync {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String>;

    /// Human-readable name used in errors and logs
    fn name(&self) -> &str;
}

/// Replaces the current value with the update
#[derive(Debug, Clone, Default)]
pub struct ReplaceReducer;

impl Reducer for ReplaceReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> std::result::Result<Value, String> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "replace"
    }
}

/// Concatenates the update onto the current sequence
///
/// Order is preserved and nothing is deduplicated. With a `window`, only the
/// last `window` items survive the concatenation.
#[derive(Debug, Clone, Default)]
pub struct AppendReducer {
    pub window: Option<usize>,
}

impl AppendReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            window: Some(window),
        }
    }
}

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match (current, update) {
            (Value::Array(curr_arr), Value::Array(upd_arr)) => {
                let mut result = Vec::with_capacity(curr_arr.len() + upd_arr.len());
                result.extend_from_slice(curr_arr);
                result.extend_from_slice(upd_arr);
                if let Some(window) = self.window {
                    if result.len() > window {
                        result.drain(..result.len() - window);
                    }
                }
                Ok(Value::Array(result))
            }
            _ => Err(format!(
                "append requires two arrays, got {} and {}",
                json_type_name(current),
                json_type_name(update)
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Adds numeric values; pair with identity `0`
#[derive(Debug, Clone, Default)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a_i64), Some(b_i64)) = (a.as_i64(), b.as_i64()) {
                    a_i64
                        .checked_add(b_i64)
                        .map(|sum| Value::Number(sum.into()))
                        .ok_or_else(|| "integer overflow".to_string())
                } else if let (Some(a_f64), Some(b_f64)) = (a.as_f64(), b.as_f64()) {
                    serde_json::Number::from_f64(a_f64 + b_f64)
                        .map(Value::Number)
                        .ok_or_else(|| "sum is not a finite number".to_string())
                } else {
                    Err("cannot add non-numeric values".to_string())
                }
            }
            _ => Err(format!(
                "sum requires numbers, got {} and {}",
                json_type_name(current),
                json_type_name(update)
            )),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

type ReduceFn = dyn Fn(&Value, &Value) -> std::result::Result<Value, String> + Send + Sync;

/// Reducer built from a closure
#[derive(Clone)]
pub struct FnReducer {
    name: String,
    f: Arc<ReduceFn>,
}

impl FnReducer {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl Reducer for FnReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        (self.f)(current, update)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FnReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer")
            .field("name", &self.name)
            .field("f", &"<function>")
            .finish()
    }
}

/// How writes to a channel combine with its current value
///
/// Fixed for the lifetime of a graph definition.
#[derive(Clone)]
pub enum MergePolicy {
    Replace,
    Append {
        /// Keep only the last N items after each merge
        window: Option<usize>,
    },
    Custom {
        reducer: Arc<dyn Reducer>,
        /// Stands in for the current value on a channel's first write
        identity: Value,
    },
}

impl MergePolicy {
    pub fn append() -> Self {
        Self::Append { window: None }
    }

    pub fn append_window(window: usize) -> Self {
        Self::Append {
            window: Some(window),
        }
    }

    pub fn custom(reducer: impl Reducer + 'static, identity: Value) -> Self {
        Self::Custom {
            reducer: Arc::new(reducer),
            identity,
        }
    }

    /// Custom policy from a closure
    pub fn custom_fn<F>(name: impl Into<String>, identity: Value, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self::custom(FnReducer::new(name, f), identity)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Replace => "replace",
            Self::Append { .. } => "append",
            Self::Custom { reducer, .. } => reducer.name(),
        }
    }

    /// Value merged against when the channel has no current value
    pub fn identity(&self) -> Value {
        match self {
            Self::Replace => Value::Null,
            Self::Append { .. } => Value::Array(Vec::new()),
            Self::Custom { identity, .. } => identity.clone(),
        }
    }

    fn reduce(&self, current: &Value, incoming: &Value) -> std::result::Result<Value, String> {
        match self {
            Self::Replace => ReplaceReducer.reduce(current, incoming),
            Self::Append { window } => AppendReducer { window: *window }.reduce(current, incoming),
            Self::Custom { reducer, .. } => reducer.reduce(current, incoming),
        }
    }
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => f.write_str("Replace"),
            Self::Append { window } => f.debug_struct("Append").field("window", window).finish(),
            Self::Custom { reducer, identity } => f
                .debug_struct("Custom")
                .field("reducer", &reducer.name())
                .field("identity", identity)
                .finish(),
        }
    }
}

/// Declaration of one channel
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub kind: ValueKind,
    pub policy: MergePolicy,
    /// Seeds the channel when a thread starts without a checkpoint
    pub default: Option<Value>,
}

impl ChannelSpec {
    pub fn new(kind: ValueKind, policy: MergePolicy) -> Self {
        Self {
            kind,
            policy,
            default: None,
        }
    }

    pub fn replace(kind: ValueKind) -> Self {
        Self::new(kind, MergePolicy::Replace)
    }

    pub fn append(kind: ValueKind) -> Self {
        Self::new(kind, MergePolicy::append())
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Bound an append channel's retention; ignored for other policies
    pub fn with_window(mut self, window: usize) -> Self {
        if let MergePolicy::Append { window: w } = &mut self.policy {
            *w = Some(window);
        }
        self
    }

    /// Problems with this declaration, if any
    pub(crate) fn check(&self, name: &str) -> std::result::Result<(), String> {
        if matches!(self.policy, MergePolicy::Append { .. }) && !self.kind.is_sequence() {
            return Err(format!(
                "channel '{}' appends but is declared as {}",
                name, self.kind
            ));
        }
        if let MergePolicy::Append { window: Some(0) } = self.policy {
            return Err(format!("channel '{}' has an empty append window", name));
        }
        if let Some(default) = &self.default {
            if !self.kind.accepts(default) {
                return Err(format!(
                    "default of channel '{}' is {}, expected {}",
                    name,
                    json_type_name(default),
                    self.kind
                ));
            }
        }
        Ok(())
    }
}

/// The set of declared channels of a graph
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    channels: BTreeMap<String, ChannelSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel, replacing any earlier declaration of the same name
    pub fn add_channel(&mut self, name: impl Into<String>, spec: ChannelSpec) {
        self.channels.insert(name.into(), spec);
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.get(name)
    }

    pub(crate) fn channel_mut(&mut self, name: &str) -> Option<&mut ChannelSpec> {
        self.channels.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&String, &ChannelSpec)> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// State of a thread that has no checkpoint yet.
    ///
    /// Channels with a default start at it; append channels without one start
    /// empty; every other channel starts absent.
    pub fn initial_state(&self) -> State {
        self.channels
            .iter()
            .filter_map(|(name, spec)| {
                let value = match (&spec.default, &spec.policy) {
                    (Some(default), _) => default.clone(),
                    (None, MergePolicy::Append { .. }) => Value::Array(Vec::new()),
                    (None, _) => return None,
                };
                Some((name.clone(), value))
            })
            .collect()
    }

    /// Names in `update` that are not declared channels, in update order
    pub fn undeclared<'a>(&self, update: &'a StateUpdate) -> Vec<&'a str> {
        update
            .keys()
            .filter(|key| !self.channels.contains_key(key.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Merge one incoming value into a channel
    pub fn merge(&self, channel: &str, current: Option<&Value>, incoming: &Value) -> Result<Value> {
        let spec = self
            .channels
            .get(channel)
            .ok_or_else(|| StateError::UndeclaredChannel(channel.to_string()))?;

        if matches!(spec.policy, MergePolicy::Append { .. }) && !incoming.is_array() {
            return Err(StateError::AppendRequiresSequence {
                channel: channel.to_string(),
                found: json_type_name(incoming).to_string(),
            });
        }

        let identity;
        let current = match current {
            Some(value) if !value.is_null() => value,
            _ => {
                identity = spec.policy.identity();
                &identity
            }
        };

        let merged = spec
            .policy
            .reduce(current, incoming)
            .map_err(|message| StateError::Reducer {
                channel: channel.to_string(),
                reducer: spec.policy.name().to_string(),
                message,
            })?;

        // A replace channel may be cleared with null
        let clearing = merged.is_null() && matches!(spec.policy, MergePolicy::Replace);
        if !clearing && !spec.kind.accepts(&merged) {
            return Err(StateError::TypeMismatch {
                channel: channel.to_string(),
                expected: spec.kind,
                found: json_type_name(&merged).to_string(),
            });
        }

        Ok(merged)
    }

    /// Apply a partial update to `state`, all channels or none
    pub fn apply(&self, state: &mut State, update: &StateUpdate) -> Result<()> {
        if let Some(name) = self.undeclared(update).first() {
            return Err(StateError::UndeclaredChannel(name.to_string()));
        }

        let mut merged = Vec::with_capacity(update.len());
        for (channel, incoming) in update {
            let value = self.merge(channel, state.get(channel), incoming)?;
            merged.push((channel.clone(), value));
        }

        for (channel, value) in merged {
            state.insert(channel, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> StateUpdate {
        value.as_object().cloned().unwrap()
    }

    fn chat_schema() -> StateSchema {
        let mut schema = StateSchema::new();
        schema.add_channel("messages", ChannelSpec::append(ValueKind::Array));
        schema.add_channel("status", ChannelSpec::replace(ValueKind::String));
        schema.add_channel(
            "count",
            ChannelSpec::new(ValueKind::Number, MergePolicy::custom(SumReducer, json!(0))),
        );
        schema
    }

    #[test]
    fn test_replace_ignores_current() {
        let schema = chat_schema();
        let mut state = State::new();
        schema.apply(&mut state, &update(json!({"status": "thinking"}))).unwrap();
        schema.apply(&mut state, &update(json!({"status": "done"}))).unwrap();
        assert_eq!(state["status"], json!("done"));
    }

    #[test]
    fn test_append_preserves_order() {
        let schema = chat_schema();
        let mut state = schema.initial_state();
        for item in ["a", "b", "c"] {
            schema.apply(&mut state, &update(json!({"messages": [item]}))).unwrap();
        }
        assert_eq!(state["messages"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let schema = chat_schema();
        let mut state = schema.initial_state();
        schema.apply(&mut state, &update(json!({"messages": ["a", "a"]}))).unwrap();
        schema.apply(&mut state, &update(json!({"messages": ["a"]}))).unwrap();
        assert_eq!(state["messages"], json!(["a", "a", "a"]));
    }

    #[test]
    fn test_append_requires_sequence() {
        let schema = chat_schema();
        let mut state = schema.initial_state();
        let err = schema
            .apply(&mut state, &update(json!({"messages": "hello"})))
            .unwrap_err();
        assert!(matches!(err, StateError::AppendRequiresSequence { .. }));
    }

    #[test]
    fn test_append_window() {
        let mut schema = StateSchema::new();
        schema.add_channel("messages", ChannelSpec::append(ValueKind::Array).with_window(2));
        let mut state = schema.initial_state();
        schema.apply(&mut state, &update(json!({"messages": [1, 2]}))).unwrap();
        schema.apply(&mut state, &update(json!({"messages": [3]}))).unwrap();
        assert_eq!(state["messages"], json!([2, 3]));
    }

    #[test]
    fn test_custom_uses_identity_on_first_write() {
        let schema = chat_schema();
        let mut state = State::new();
        schema.apply(&mut state, &update(json!({"count": 5}))).unwrap();
        schema.apply(&mut state, &update(json!({"count": 3}))).unwrap();
        assert_eq!(state["count"], json!(8));
    }

    #[test]
    fn test_custom_fn_policy() {
        let mut schema = StateSchema::new();
        schema.add_channel(
            "best",
            ChannelSpec::new(
                ValueKind::Number,
                MergePolicy::custom_fn("max", json!(i64::MIN), |a, b| {
                    let a = a.as_i64().ok_or("not an integer")?;
                    let b = b.as_i64().ok_or("not an integer")?;
                    Ok(json!(a.max(b)))
                }),
            ),
        );
        let mut state = State::new();
        schema.apply(&mut state, &update(json!({"best": 4}))).unwrap();
        schema.apply(&mut state, &update(json!({"best": 2}))).unwrap();
        assert_eq!(state["best"], json!(4));

        let err = schema
            .apply(&mut state, &update(json!({"best": "high"})))
            .unwrap_err();
        assert!(matches!(err, StateError::Reducer { ref reducer, .. } if reducer == "max"));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = chat_schema();
        let mut state = State::new();
        let err = schema
            .apply(&mut state, &update(json!({"status": 42})))
            .unwrap_err();
        assert_eq!(
            err,
            StateError::TypeMismatch {
                channel: "status".into(),
                expected: ValueKind::String,
                found: "number".into(),
            }
        );
    }

    #[test]
    fn test_replace_accepts_null() {
        let schema = chat_schema();
        let mut state = State::new();
        schema.apply(&mut state, &update(json!({"status": "x"}))).unwrap();
        schema.apply(&mut state, &update(json!({"status": null}))).unwrap();
        assert!(state["status"].is_null());
    }

    #[test]
    fn test_undeclared_channel_is_rejected() {
        let schema = chat_schema();
        let mut state = schema.initial_state();
        let err = schema
            .apply(&mut state, &update(json!({"messages": ["a"], "mystery": 1})))
            .unwrap_err();
        assert_eq!(err, StateError::UndeclaredChannel("mystery".into()));
        // Nothing from the failed update was applied
        assert_eq!(state["messages"], json!([]));
    }

    #[test]
    fn test_failed_update_is_all_or_nothing() {
        let schema = chat_schema();
        let mut state = schema.initial_state();
        let result = schema.apply(
            &mut state,
            &update(json!({"messages": ["a"], "status": false})),
        );
        assert!(result.is_err());
        assert_eq!(state["messages"], json!([]));
        assert!(!state.contains_key("status"));
    }

    #[test]
    fn test_initial_state() {
        let mut schema = chat_schema();
        schema.add_channel(
            "done",
            ChannelSpec::replace(ValueKind::Bool).with_default(json!(false)),
        );
        let state = schema.initial_state();
        assert_eq!(state["messages"], json!([]));
        assert_eq!(state["done"], json!(false));
        assert!(!state.contains_key("status"));
        assert!(!state.contains_key("count"));
    }

    #[test]
    fn test_messages_kind() {
        let kind = ValueKind::Messages;
        assert!(kind.accepts(&json!([{"role": "human", "content": "hi"}])));
        assert!(!kind.accepts(&json!(["hi"])));
        assert!(!kind.accepts(&json!({"role": "human"})));
    }

    #[test]
    fn test_spec_check() {
        assert!(ChannelSpec::append(ValueKind::String).check("x").is_err());
        assert!(ChannelSpec::replace(ValueKind::Bool)
            .with_default(json!("yes"))
            .check("x")
            .is_err());
        assert!(ChannelSpec::append(ValueKind::Messages).check("x").is_ok());
    }

    #[test]
    fn test_reducer_names() {
        assert_eq!(ReplaceReducer.name(), "replace");
        assert_eq!(AppendReducer::new().name(), "append");
        assert_eq!(SumReducer.name(), "sum");
        assert_eq!(MergePolicy::append_window(3).name(), "append");
    }
}
