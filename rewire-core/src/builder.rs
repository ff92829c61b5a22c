//! Fluent configuration of a freshly recorded expectation.

use crate::args::CallArgs;
use crate::error::{CallResult, RaisedError};
use crate::expectation::{Action, Expectation, Times};
use crate::handle::MockHandle;
use crate::value::Value;
use std::sync::Arc;

/// Builder bound to one expectation of a [`MockHandle`].
///
/// Every method edits that expectation and returns the builder for chaining.
/// Edits that cannot be applied leave the expectation unchanged and are kept
/// as the session's usage error: `replay()` refuses to start while one is
/// pending, and `verify()` always reports it. This covers edits made after
/// replay, call counts that admit no call, and `any_order()` on arguments
/// another expectation already matches exactly.
///
/// # Example
///
/// ```
/// use rewire_core::{CallArgs, MockSession, Namespace, RaisedError, Value};
/// use std::sync::Arc;
///
/// let db = Arc::new(Namespace::new("db").with_member("query", |_: &CallArgs| Ok(Value::null())));
/// let mut session = MockSession::new();
/// let query = session.mock(&db, "query")?;
///
/// query.expect(["select 1"])?.returns(1).at_least(1);
/// query.expect(["drop table"])?.raises(RaisedError::new("denied", "read-only"));
/// # Ok::<(), rewire_core::MockError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ExpectationBuilder {
    handle: MockHandle,
    index: usize,
}

impl ExpectationBuilder {
    pub(crate) fn new(handle: MockHandle, index: usize) -> Self {
        Self { handle, index }
    }

    /// Position of the expectation in its handle's declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The handle owning the expectation.
    pub fn handle(&self) -> &MockHandle {
        &self.handle
    }

    fn edit(self, edit: impl FnOnce(&mut Expectation)) -> Self {
        self.handle.edit_expectation(self.index, edit);
        self
    }

    /// Return `value` from the matched call.
    pub fn returns(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.edit(|e| e.action = Action::Return(value))
    }

    /// Raise `error` to the caller of the matched call.
    pub fn raises(self, error: RaisedError) -> Self {
        self.edit(|e| e.action = Action::Raise(error))
    }

    /// Run `f` with the actual arguments and return its result.
    pub fn does<F>(self, f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.edit(|e| e.action = Action::Invoke(Arc::new(f)))
    }

    /// Expect exactly one call.
    pub fn once(self) -> Self {
        self.times(1)
    }

    /// Expect exactly two calls.
    pub fn twice(self) -> Self {
        self.times(2)
    }

    /// Expect exactly `n` calls.
    pub fn times(self, n: u32) -> Self {
        self.edit(|e| e.times = Times::exactly(n))
    }

    /// Accept any number of calls, including none.
    pub fn any_number_of_times(self) -> Self {
        self.edit(|e| e.times = Times::any())
    }

    /// Expect at least `n` calls.
    pub fn at_least(self, n: u32) -> Self {
        self.edit(|e| e.times = Times::at_least(n))
    }

    /// Accept at most `n` calls.
    pub fn at_most(self, n: u32) -> Self {
        self.edit(|e| e.times = Times::at_most(n))
    }

    /// Match independently of declaration order.
    ///
    /// Also relaxes the multiplicity to any number of times; chain a
    /// multiplicity afterwards to constrain it again.
    pub fn any_order(self) -> Self {
        self.edit(|e| {
            e.any_order = true;
            e.times = Times::any();
        })
    }
}
