//! Error types for rewire.
//!
//! Every error carries the identity of the mocked target it concerns so a
//! failing test points at the offending call site. Messages are prefixed with
//! a stable code:
//!
//! - `E0xx`: usage errors (the API was called in a way that breaks its contract)
//! - `E1xx`: assertion errors (the code under test called a mock wrongly)
//! - `E2xx`: restoration errors (an original binding could not be put back cleanly)

use crate::args::CallArgs;
use crate::expectation::Times;
use crate::session::SessionMode;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for rewire operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockError {
    // =========================================================================
    // Usage Errors (E001-E099)
    // =========================================================================
    /// The (owner, attribute) pair already has an active mock.
    #[error("E001: {target} is already mocked")]
    DoubleMock {
        /// The doubly mocked target.
        target: String,
    },

    /// The owner has no attribute of that name.
    #[error("E002: '{owner}' has no attribute '{attribute}'")]
    NoSuchAttribute {
        /// Name of the owner namespace.
        owner: String,
        /// The missing attribute.
        attribute: String,
    },

    /// An operation was attempted in a session state that does not allow it.
    #[error("E003: cannot {operation} while session is in {mode} mode")]
    InvalidStateTransition {
        /// The attempted operation.
        operation: &'static str,
        /// The session mode at the time of the attempt.
        mode: SessionMode,
    },

    /// An expectation was declared or edited after `replay()`.
    #[error("E004: cannot add or change expectations of {target} after replay")]
    ExpectationAfterReplay {
        /// The target whose expectations were touched.
        target: String,
    },

    /// A call-count range that no sequence of calls can satisfy.
    #[error("E005: invalid call count for {target}: {times}")]
    InvalidMultiplicity {
        /// The target whose expectation was rejected.
        target: String,
        /// The rejected range.
        times: Times,
    },

    /// An unordered expectation repeats the arguments of another expectation.
    #[error("E006: {target}{args} is already expected")]
    DuplicatePattern {
        /// The target whose expectation was rejected.
        target: String,
        /// The repeated arguments.
        args: CallArgs,
    },

    // =========================================================================
    // Assertion Errors (E100-E199)
    // =========================================================================
    /// A mocked target was called with no matching expectation left.
    #[error("E101: unexpected call {target}{args}")]
    UnexpectedCall {
        /// The called target.
        target: String,
        /// The actual call arguments.
        args: CallArgs,
    },

    /// One or more expectations were outside their call-count bounds at verify.
    #[error("E102: {}", format_failures(.failures))]
    UnsatisfiedExpectations {
        /// Every offending expectation.
        failures: Vec<UnsatisfiedExpectation>,
    },

    // =========================================================================
    // Restoration Errors (E200-E299)
    // =========================================================================
    /// Restoring an original binding found the binding in an unexpected state.
    #[error("E201: failed to restore {target}: {cause}")]
    Restoration {
        /// The target being restored.
        target: String,
        /// What went wrong.
        cause: String,
    },
}

fn format_failures(failures: &[UnsatisfiedExpectation]) -> String {
    let mut out = format!("{} expectation(s) not satisfied:", failures.len());
    for failure in failures {
        out.push_str(&format!("\n  - {failure}"));
    }
    out
}

impl MockError {
    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DoubleMock { .. } => "E001",
            Self::NoSuchAttribute { .. } => "E002",
            Self::InvalidStateTransition { .. } => "E003",
            Self::ExpectationAfterReplay { .. } => "E004",
            Self::InvalidMultiplicity { .. } => "E005",
            Self::DuplicatePattern { .. } => "E006",
            Self::UnexpectedCall { .. } => "E101",
            Self::UnsatisfiedExpectations { .. } => "E102",
            Self::Restoration { .. } => "E201",
        }
    }

    /// Check if this error reports a misuse of the mocking API.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DoubleMock { .. }
                | Self::NoSuchAttribute { .. }
                | Self::InvalidStateTransition { .. }
                | Self::ExpectationAfterReplay { .. }
                | Self::InvalidMultiplicity { .. }
                | Self::DuplicatePattern { .. }
        )
    }

    /// Check if this error reports a call pattern that broke the declared expectations.
    #[must_use]
    pub fn is_assertion_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedCall { .. } | Self::UnsatisfiedExpectations { .. }
        )
    }
}

/// One expectation found outside its bounds by `verify()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsatisfiedExpectation {
    /// The mocked target owning the expectation.
    pub target: String,
    /// Position of the expectation in declaration order.
    pub index: usize,
    /// Description of the argument matcher.
    pub matcher: String,
    /// The declared call-count range.
    pub expected: Times,
    /// How many times it was actually consumed.
    pub actual: u32,
}

impl fmt::Display for UnsatisfiedExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expectation #{} {}: expected {}, called {} time(s)",
            self.target, self.index, self.matcher, self.expected, self.actual
        )
    }
}

/// Result type alias using `MockError`.
pub type Result<T> = std::result::Result<T, MockError>;

/// An error raised by a callable, configured by a test or produced by real code.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RaisedError {
    /// Error kind, e.g. `"io"` or `"timeout"`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RaisedError {
    /// Create a new raised error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Why a call through a namespace did not produce a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// The callable raised an error (a real failure or a configured `raises`).
    #[error(transparent)]
    Raised(#[from] RaisedError),
    /// The mock engine rejected the call.
    #[error(transparent)]
    Mock(#[from] MockError),
}

impl CallFailure {
    /// Get the engine error, if this failure came from the mock engine.
    pub fn as_mock(&self) -> Option<&MockError> {
        match self {
            Self::Mock(e) => Some(e),
            Self::Raised(_) => None,
        }
    }

    /// Get the raised error, if the callable raised one.
    pub fn as_raised(&self) -> Option<&RaisedError> {
        match self {
            Self::Raised(e) => Some(e),
            Self::Mock(_) => None,
        }
    }
}

/// Result of invoking a callable.
pub type CallResult = std::result::Result<Value, CallFailure>;
