//! Call recording for diagnostics.
//!
//! Every invocation that reaches a mock handle during replay is recorded with
//! its arguments, the expectation it consumed and its outcome.

use crate::args::CallArgs;
use crate::error::{CallFailure, CallResult, RaisedError};
use crate::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// How a recorded call ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call returned a value.
    Returned {
        /// The returned value.
        value: Value,
    },

    /// The call raised an error to its caller.
    Raised {
        /// The raised error.
        error: RaisedError,
    },

    /// The engine rejected the call.
    Rejected {
        /// Error code of the rejection.
        code: String,
        /// Rendered error message.
        message: String,
    },
}

impl CallOutcome {
    /// Build the outcome of a finished call.
    pub fn of(result: &CallResult) -> Self {
        match result {
            Ok(value) => Self::Returned {
                value: value.clone(),
            },
            Err(CallFailure::Raised(error)) => Self::Raised {
                error: error.clone(),
            },
            Err(CallFailure::Mock(error)) => Self::Rejected {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        }
    }

    /// Get the outcome type as a string.
    pub fn outcome_type(&self) -> &'static str {
        match self {
            Self::Returned { .. } => "returned",
            Self::Raised { .. } => "raised",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// One observed invocation of a mocked target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedCall {
    /// The called target.
    pub target: String,
    /// Actual arguments.
    pub args: CallArgs,
    /// Index of the consumed expectation, if one matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<usize>,
    /// How the call ended.
    pub outcome: CallOutcome,
}

/// Recorder for calls observed by a mock handle.
///
/// # Example
///
/// ```
/// use rewire_core::{CallArgs, CallOutcome, CallRecorder, RecordedCall, Value};
///
/// let recorder = CallRecorder::new();
/// recorder.record(RecordedCall {
///     target: "clock.now".to_string(),
///     args: CallArgs::new(),
///     expectation: Some(0),
///     outcome: CallOutcome::Returned { value: Value::int(5) },
/// });
///
/// assert_eq!(recorder.len(), 1);
/// assert!(recorder.to_json().unwrap().contains("returned"));
/// ```
pub struct CallRecorder {
    calls: RwLock<Vec<RecordedCall>>,
    enabled: AtomicBool,
}

impl CallRecorder {
    /// Create a new, enabled recorder.
    pub fn new() -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Record a call.
    pub fn record(&self, call: RecordedCall) {
        if self.enabled.load(Ordering::SeqCst) {
            self.calls.write().push(call);
        }
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    /// Get the number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.read().len()
    }

    /// Check if no calls have been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.read().is_empty()
    }

    /// Clear all recorded calls.
    pub fn clear(&self) {
        self.calls.write().clear();
    }

    /// Enable or disable recording.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Check if recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Find calls matching a predicate.
    pub fn find<F>(&self, predicate: F) -> Vec<RecordedCall>
    where
        F: Fn(&RecordedCall) -> bool,
    {
        self.calls
            .read()
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect()
    }

    /// Calls whose outcome has the given type (`returned`, `raised`, `rejected`).
    pub fn calls_with_outcome(&self, outcome_type: &str) -> Vec<RecordedCall> {
        self.find(|c| c.outcome.outcome_type() == outcome_type)
    }

    /// Convert recorded calls to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.calls.read())
    }
}

impl Default for CallRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRecorder")
            .field("calls", &self.len())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MockError;

    fn call(outcome: CallOutcome) -> RecordedCall {
        RecordedCall {
            target: "svc.f".to_string(),
            args: CallArgs::from([1]),
            expectation: None,
            outcome,
        }
    }

    #[test]
    fn record_and_retrieve() {
        let recorder = CallRecorder::new();
        recorder.record(call(CallOutcome::Returned {
            value: Value::int(1),
        }));
        recorder.record(call(CallOutcome::Raised {
            error: RaisedError::new("io", "x"),
        }));

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.calls_with_outcome("raised").len(), 1);
        assert_eq!(recorder.calls_with_outcome("rejected").len(), 0);
    }

    #[test]
    fn disable_recording() {
        let recorder = CallRecorder::new();
        recorder.set_enabled(false);
        recorder.record(call(CallOutcome::Returned {
            value: Value::null(),
        }));
        assert!(recorder.is_empty());

        recorder.set_enabled(true);
        recorder.record(call(CallOutcome::Returned {
            value: Value::null(),
        }));
        assert_eq!(recorder.len(), 1);

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn outcome_of_results() {
        let ok: CallResult = Ok(Value::int(3));
        assert_eq!(
            CallOutcome::of(&ok),
            CallOutcome::Returned {
                value: Value::int(3)
            }
        );

        let rejected: CallResult = Err(MockError::UnexpectedCall {
            target: "svc.f".to_string(),
            args: CallArgs::new(),
        }
        .into());
        assert!(matches!(
            CallOutcome::of(&rejected),
            CallOutcome::Rejected { ref code, .. } if code == "E101"
        ));
    }

    #[test]
    fn json_serialization() {
        let recorder = CallRecorder::new();
        recorder.record(call(CallOutcome::Rejected {
            code: "E101".to_string(),
            message: "unexpected".to_string(),
        }));

        let json = recorder.to_json().unwrap();
        assert!(json.contains("\"type\": \"rejected\""));
        assert!(json.contains("E101"));

        let parsed: Vec<RecordedCall> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, recorder.calls());
    }
}
