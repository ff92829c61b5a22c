//! Rewire Core Library
//!
//! A record / replay / verify mock engine. Tests substitute callables bound in
//! a [`Namespace`], declare the calls they expect, let the code under test run
//! against the substitutes, verify that every expectation was met and restore
//! the originals.
//!
//! # Key Components
//!
//! - **Namespace**: a table of replaceable callables that production code calls through
//! - **MockSession**: owns the mocks of one test and drives their lifecycle
//! - **MockHandle**: the substitute for one `owner.attribute` binding, either a mock
//!   (installed at replay) or a stub (installed at once)
//! - **ExpectationSet**: ordered expectations and the matching of calls against them
//!
//! # Example
//!
//! ```
//! use rewire_core::prelude::*;
//! use std::sync::Arc;
//!
//! let mailer = Arc::new(
//!     Namespace::new("mailer").with_member("send", |_: &CallArgs| Ok(Value::bool(true))),
//! );
//!
//! let mut session = MockSession::new();
//! let send = session.mock(&mailer, "send")?;
//! send.expect(["alice@example.com"])?.returns(false);
//!
//! session.replay()?;
//! assert_eq!(mailer.call("send", ["alice@example.com"]).unwrap(), Value::bool(false));
//! session.verify()?;
//! session.tear_down()?;
//!
//! assert_eq!(mailer.call("send", ["bob@example.com"]).unwrap(), Value::bool(true));
//! # Ok::<(), MockError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod builder;
pub mod config;
pub mod error;
pub mod expectation;
pub mod handle;
pub mod namespace;
pub mod observability;
pub mod prelude;
pub mod recording;
pub mod session;
mod slot;
pub mod snapshot;
pub mod value;

// Re-export key types at crate root for convenience
pub use args::CallArgs;
pub use builder::ExpectationBuilder;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{
    CallFailure, CallResult, MockError, RaisedError, Result, UnsatisfiedExpectation,
};
pub use expectation::{
    Action, ArgMatcher, Expectation, ExpectationSet, ExpectationSummary, Times,
};
pub use handle::{HandleKind, MockHandle};
pub use namespace::{Callable, Namespace};
pub use recording::{CallOutcome, CallRecorder, RecordedCall};
pub use session::{MockSession, SessionMode};
pub use snapshot::{MockedObject, mock_all};
pub use value::Value;
