//! Dynamic value type for mock arguments and results.
//!
//! Mocked callables are dynamically typed: arguments and return values are
//! carried as [`Value`], a thin wrapper over `serde_json::Value` that keeps
//! equality, ordering-insensitive maps and serialization for diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Dynamic value passed to and returned from mocked callables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub JsonValue);

impl Value {
    /// Create a null value.
    pub fn null() -> Self {
        Self(JsonValue::Null)
    }

    /// Create a boolean value.
    pub fn bool(v: bool) -> Self {
        Self(JsonValue::Bool(v))
    }

    /// Create an integer value.
    pub fn int(v: i64) -> Self {
        Self(JsonValue::Number(v.into()))
    }

    /// Create an unsigned integer value.
    pub fn uint(v: u64) -> Self {
        Self(JsonValue::Number(v.into()))
    }

    /// Create a floating-point value.
    ///
    /// Non-finite floats have no JSON representation and become null.
    pub fn float(v: f64) -> Self {
        Self(serde_json::Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number))
    }

    /// Create a string value.
    pub fn string(v: impl Into<String>) -> Self {
        Self(JsonValue::String(v.into()))
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Get the value as an i64, if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }

    /// Get the value as a u64, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.as_u64()
    }

    /// Get the value as an f64, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }

    /// Get the value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Get the value as a bool, if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    /// Access the inner serde_json::Value.
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert into the inner serde_json::Value.
    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self(v)
    }
}

impl From<Value> for JsonValue {
    fn from(v: Value) -> Self {
        v.0
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::bool(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::null()
    }
}
