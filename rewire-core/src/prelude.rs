//! Prelude module for convenient imports.
//!
//! ```
//! use rewire_core::prelude::*;
//! ```

pub use crate::args::CallArgs;
pub use crate::builder::ExpectationBuilder;
pub use crate::config::SessionConfig;
pub use crate::error::{CallFailure, CallResult, MockError, RaisedError, Result};
pub use crate::expectation::Times;
pub use crate::handle::{HandleKind, MockHandle};
pub use crate::namespace::{Callable, Namespace};
pub use crate::session::{MockSession, SessionMode};
pub use crate::snapshot::MockedObject;
pub use crate::value::Value;
