//! Argument tuples for mocked calls.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Arguments of one call: positional values plus named (keyword) values.
///
/// Two argument tuples are equal when they have the same positional values
/// in the same order and the same set of named values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments, in call order.
    pub positional: Vec<Value>,
    /// Named arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Create an empty argument tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an argument tuple from positional values.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add a named argument.
    pub fn named(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    /// Get a positional argument by index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Get a named argument.
    pub fn get_named(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Check if the call has no arguments.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let mut first = true;
        for value in &self.positional {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        for (key, value) in &self.named {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        f.write_str(")")
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: BTreeMap::new(),
        }
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for CallArgs {
    fn from(values: [V; N]) -> Self {
        Self::positional(values)
    }
}
