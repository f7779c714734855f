use crate::errors::{EvalError, Result};
use crate::value::Value;
use serde::Deserialize;
use std::collections::BTreeMap;

/// What to do when a key path names something the context does not hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyPolicy {
    /// Fail with `EvalError::MissingKey`.
    #[default]
    Error,
    /// Resolve to nil, which compares unequal to everything but nil.
    Null,
}

/// Evaluation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    pub missing_keys: MissingKeyPolicy,
    /// Deepest nesting of parentheses, NOT chains and sub-expressions the
    /// parser accepts.
    pub max_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            missing_keys: MissingKeyPolicy::Error,
            max_depth: 64,
        }
    }
}

/// The named values a predicate is evaluated against, plus any `$NAME`
/// substitution variables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Context {
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    variables: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON object; anything else is rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Dict(values) => Ok(Self {
                values,
                variables: BTreeMap::new(),
            }),
            other => Err(EvalError::Runtime(format!(
                "context must be a dictionary, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EvalError::Runtime(format!("invalid context JSON: {e}")))?;
        Self::from_json(parsed)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The whole mapping as a dictionary value, which is what `SELF` refers to.
    pub fn to_value(&self) -> Value {
        Value::Dict(self.values.clone())
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            variables: BTreeMap::new(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let values: BTreeMap<String, Value> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from(values)
    }
}
