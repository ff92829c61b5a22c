//! Mock handles: the substitutes installed in place of original callables.

use crate::args::CallArgs;
use crate::builder::ExpectationBuilder;
use crate::error::{CallResult, MockError, Result, UnsatisfiedExpectation};
use crate::expectation::{Action, ArgMatcher, Expectation, ExpectationSet, ExpectationSummary, Times};
use crate::namespace::Callable;
use crate::recording::{CallOutcome, CallRecorder, RecordedCall};
use crate::session::{SessionMode, SessionShared};
use crate::slot::Slot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// How a handle answers calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Installed at `replay()`; expectations are ordered and exactly-once by
    /// default.
    Mock,
    /// Installed at creation and answering during setup as well as replay;
    /// expectations are any-order and any number of times by default.
    Stub,
}

impl HandleKind {
    /// Get the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Stub => "stub",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live substitute for one `owner.attribute` binding.
///
/// Handles are created by [`MockSession::mock`](crate::MockSession::mock) and
/// [`MockSession::stub`](crate::MockSession::stub) and are cheap to clone;
/// clones refer to the same substitute.
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    identity: String,
    display_name: Option<String>,
    kind: HandleKind,
    session: Arc<SessionShared>,
    state: Mutex<HandleState>,
    recorder: CallRecorder,
    call_count: AtomicUsize,
}

struct HandleState {
    slot: Slot,
    expectations: ExpectationSet,
}

impl MockHandle {
    pub(crate) fn new(
        slot: Slot,
        display_name: Option<String>,
        kind: HandleKind,
        session: Arc<SessionShared>,
    ) -> Self {
        let recorder = CallRecorder::new();
        recorder.set_enabled(session.config().record_calls());

        Self {
            inner: Arc::new(HandleInner {
                identity: slot.target(),
                display_name,
                kind,
                session,
                state: Mutex::new(HandleState {
                    slot,
                    expectations: ExpectationSet::new(),
                }),
                recorder,
                call_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The replaced binding, as `owner.attribute`.
    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Name used in diagnostics; the identity unless a display name was given.
    pub fn display_name(&self) -> &str {
        self.inner
            .display_name
            .as_deref()
            .unwrap_or(&self.inner.identity)
    }

    /// Whether this handle is a mock or a stub.
    pub fn kind(&self) -> HandleKind {
        self.inner.kind
    }

    /// Whether this handle answers calls before `replay()`.
    pub fn is_stub(&self) -> bool {
        self.inner.kind == HandleKind::Stub
    }

    fn default_times(&self) -> Times {
        match self.inner.kind {
            HandleKind::Mock => Times::default(),
            HandleKind::Stub => Times::any(),
        }
    }

    /// Expect a call with exactly these arguments.
    ///
    /// The new expectation returns `null`. On a mock it must be called exactly
    /// once, on a stub any number of times, until the returned builder says
    /// otherwise.
    pub fn expect(&self, args: impl Into<CallArgs>) -> Result<ExpectationBuilder> {
        self.expect_call(ArgMatcher::exact(args), Action::default(), self.default_times())
    }

    /// Expect a call whose arguments satisfy `predicate`.
    pub fn expect_matching<F>(
        &self,
        description: impl Into<String>,
        predicate: F,
    ) -> Result<ExpectationBuilder>
    where
        F: Fn(&CallArgs) -> bool + Send + Sync + 'static,
    {
        self.expect_call(
            ArgMatcher::predicate(description, predicate),
            Action::default(),
            self.default_times(),
        )
    }

    /// Append a fully specified expectation.
    ///
    /// Expectations of a stub are always any-order. Fails with
    /// [`MockError::InvalidMultiplicity`] when `times` admits no call, and
    /// with [`MockError::DuplicatePattern`] when an any-order expectation
    /// would share its exact arguments with another expectation.
    pub fn expect_call(
        &self,
        matcher: ArgMatcher,
        action: Action,
        times: Times,
    ) -> Result<ExpectationBuilder> {
        let expectation = match self.inner.kind {
            HandleKind::Mock => Expectation::new(matcher, action, times),
            HandleKind::Stub => Expectation::unordered(matcher, action, times),
        };

        let mut state = self.inner.state.lock();
        self.check_recording(state.expectations.is_sealed())?;
        self.validate(&state.expectations, &expectation, None)?;

        let index = state.expectations.push(expectation);
        tracing::trace!(
            session = %self.inner.session.name(),
            target = %self.display_name(),
            expectation = index,
            "Expectation added"
        );
        drop(state);

        Ok(ExpectationBuilder::new(self.clone(), index))
    }

    /// Replace every expectation with one any-order expectation that accepts
    /// these arguments any number of times.
    pub fn redefine(&self, args: impl Into<CallArgs>) -> Result<ExpectationBuilder> {
        let mut state = self.inner.state.lock();
        self.check_recording(state.expectations.is_sealed())?;

        let dropped = state.expectations.len();
        state.expectations.clear();
        let index = state.expectations.push(Expectation::unordered(
            ArgMatcher::exact(args),
            Action::default(),
            Times::any(),
        ));
        tracing::trace!(
            session = %self.inner.session.name(),
            target = %self.display_name(),
            dropped,
            "Expectations redefined"
        );
        drop(state);

        Ok(ExpectationBuilder::new(self.clone(), index))
    }

    fn validate(
        &self,
        expectations: &ExpectationSet,
        candidate: &Expectation,
        skip: Option<usize>,
    ) -> Result<()> {
        if !candidate.times().is_valid() {
            return Err(MockError::InvalidMultiplicity {
                target: self.display_name().to_string(),
                times: candidate.times(),
            });
        }
        let conflict = expectations.find_conflict(candidate, skip);
        if let (Some(_), ArgMatcher::Exact(args)) = (conflict, candidate.matcher()) {
            return Err(MockError::DuplicatePattern {
                target: self.display_name().to_string(),
                args: args.clone(),
            });
        }
        Ok(())
    }

    fn check_recording(&self, sealed: bool) -> Result<()> {
        match self.inner.session.mode() {
            SessionMode::Setup if !sealed => Ok(()),
            SessionMode::TornDown => Err(MockError::InvalidStateTransition {
                operation: "expect",
                mode: SessionMode::TornDown,
            }),
            _ => Err(MockError::ExpectationAfterReplay {
                target: self.display_name().to_string(),
            }),
        }
    }

    /// Handle a call to the mocked target.
    ///
    /// This is what the installed substitute runs. Calls outside the replay
    /// window (for a stub, outside setup and replay) are rejected with
    /// [`MockError::InvalidStateTransition`]; calls no expectation accepts are
    /// rejected with [`MockError::UnexpectedCall`], which is also kept by the
    /// session so that `verify()` fails even if the caller swallowed it.
    pub fn invoke(&self, args: &CallArgs) -> CallResult {
        self.inner.call_count.fetch_add(1, Ordering::Relaxed);

        let mode = self.inner.session.mode();
        let answering = match mode {
            SessionMode::Replay => true,
            SessionMode::Setup => self.is_stub(),
            _ => false,
        };
        if !answering {
            let result = Err(MockError::InvalidStateTransition {
                operation: "invoke",
                mode,
            }
            .into());
            self.record(args, None, &result);
            return result;
        }

        // The lock is released before the action runs, so actions may call
        // back into mocked targets.
        let resolved = self.inner.state.lock().expectations.resolve(args);

        let Some((index, action)) = resolved else {
            let error = MockError::UnexpectedCall {
                target: self.display_name().to_string(),
                args: args.clone(),
            };
            tracing::warn!(
                session = %self.inner.session.name(),
                target = %self.display_name(),
                args = %args,
                "Unexpected call"
            );
            self.inner.session.remember_failure(error.clone());
            let result = Err(error.into());
            self.record(args, None, &result);
            return result;
        };

        tracing::trace!(
            session = %self.inner.session.name(),
            target = %self.display_name(),
            expectation = index,
            args = %args,
            "Call matched"
        );

        let result = action.execute(args);
        self.record(args, Some(index), &result);
        result
    }

    fn record(&self, args: &CallArgs, expectation: Option<usize>, result: &CallResult) {
        self.inner.recorder.record(RecordedCall {
            target: self.display_name().to_string(),
            args: args.clone(),
            expectation,
            outcome: CallOutcome::of(result),
        });
    }

    /// Consumed count of every expectation, in declaration order.
    pub fn consumed_counts(&self) -> Vec<u32> {
        self.inner.state.lock().expectations.consumed_counts()
    }

    /// Summaries of every expectation, in declaration order.
    pub fn expectations(&self) -> Vec<ExpectationSummary> {
        self.inner.state.lock().expectations.summaries()
    }

    /// Calls observed so far, oldest first.
    ///
    /// Empty when the session was configured with `record_calls` off.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.recorder.calls()
    }

    /// Number of times the substitute was invoked, including rejected calls.
    pub fn call_count(&self) -> usize {
        self.inner.call_count.load(Ordering::Relaxed)
    }

    /// The call log of this handle.
    pub fn recorder(&self) -> &CallRecorder {
        &self.inner.recorder
    }

    /// Whether the substitute is currently installed.
    pub fn is_installed(&self) -> bool {
        self.inner.state.lock().slot.is_installed()
    }

    fn substitute(&self) -> Callable {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |args: &CallArgs| invoke_weak(&weak, args))
    }

    /// Install the substitute without sealing the expectations.
    pub(crate) fn install(&self) {
        let substitute = self.substitute();
        self.inner.state.lock().slot.install(substitute);
    }

    /// Seal the expectations and install the substitute if it is not already
    /// in place.
    pub(crate) fn arm(&self) {
        let mut state = self.inner.state.lock();
        state.expectations.seal();
        if !state.slot.is_installed() {
            state.slot.install(self.substitute());
        }
    }

    /// Restore the original binding and release the claim on it.
    pub(crate) fn disarm(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        let restored = state.slot.restore();
        state.slot.release();
        restored
    }

    /// Apply a builder edit to the expectation at `index`.
    ///
    /// Edits after replay, and edits that leave the expectation with an empty
    /// call-count range or a duplicate any-order pattern, leave it untouched
    /// and are reported through the session's usage error.
    pub(crate) fn edit_expectation(&self, index: usize, edit: impl FnOnce(&mut Expectation)) {
        let mut state = self.inner.state.lock();
        let checked = self
            .check_recording(state.expectations.is_sealed())
            .and_then(|()| {
                let Some(mut candidate) = state.expectations.get(index).cloned() else {
                    return Ok(None);
                };
                edit(&mut candidate);
                self.validate(&state.expectations, &candidate, Some(index))?;
                Ok(Some(candidate))
            });

        match checked {
            Ok(Some(candidate)) => {
                if let Some(expectation) = state.expectations.get_mut(index) {
                    *expectation = candidate;
                }
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    session = %self.inner.session.name(),
                    target = %self.display_name(),
                    expectation = index,
                    error = %error,
                    "Ignoring expectation change"
                );
                self.inner.session.remember_usage_error(error);
            }
        }
    }

    /// Expectations outside their call-count range.
    pub(crate) fn unsatisfied(&self) -> Vec<UnsatisfiedExpectation> {
        self.inner
            .state
            .lock()
            .expectations
            .unsatisfied()
            .into_iter()
            .map(|summary| UnsatisfiedExpectation {
                target: self.display_name().to_string(),
                index: summary.index,
                matcher: summary.matcher,
                expected: summary.times,
                actual: summary.consumed,
            })
            .collect()
    }
}

fn invoke_weak(handle: &Weak<HandleInner>, args: &CallArgs) -> CallResult {
    match handle.upgrade() {
        Some(inner) => MockHandle { inner }.invoke(args),
        None => Err(MockError::InvalidStateTransition {
            operation: "invoke",
            mode: SessionMode::TornDown,
        }
        .into()),
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHandle")
            .field("identity", &self.inner.identity)
            .field("display_name", &self.inner.display_name)
            .field("kind", &self.inner.kind)
            .field("expectations", &self.consumed_counts())
            .field("calls", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::args::CallArgs;
    use crate::error::{MockError, RaisedError};
    use crate::namespace::Namespace;
    use crate::session::MockSession;
    use crate::value::Value;
    use std::sync::Arc;

    fn service() -> Arc<Namespace> {
        Arc::new(Namespace::new("svc").with_member("f", |_: &CallArgs| Ok(Value::int(0))))
    }

    #[test]
    fn identity_and_display_name() {
        let ns = service();
        let mut session = MockSession::new();
        let handle = session.mock_named(&ns, "f", "Service.f").unwrap();
        assert_eq!(handle.identity(), "svc.f");
        assert_eq!(handle.display_name(), "Service.f");
    }

    #[test]
    fn invoke_before_replay_is_rejected() {
        let ns = service();
        let mut session = MockSession::new();
        let handle = session.mock(&ns, "f").unwrap();
        handle.expect(()).unwrap();

        let err = handle.invoke(&CallArgs::new()).unwrap_err();
        assert!(matches!(
            err.as_mock(),
            Some(MockError::InvalidStateTransition { operation: "invoke", .. })
        ));
        assert_eq!(handle.consumed_counts(), vec![0]);
        // The original is still bound.
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(0));
    }

    #[test]
    fn unexpected_call_is_recorded() {
        let ns = service();
        let mut session = MockSession::new();
        let handle = session.mock(&ns, "f").unwrap();
        handle.expect([1]).unwrap().returns(10);
        session.replay().unwrap();

        let err = ns.call("f", [2]).unwrap_err();
        assert_eq!(err.as_mock().map(MockError::code), Some("E101"));
        assert_eq!(ns.call("f", [1]).unwrap(), Value::int(10));

        let calls = handle.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].expectation, None);
        assert_eq!(calls[0].outcome.outcome_type(), "rejected");
        assert_eq!(calls[1].expectation, Some(0));
        assert_eq!(handle.call_count(), 2);
    }

    #[test]
    fn actions_may_reenter_mocked_targets() {
        let ns = Arc::new(
            Namespace::new("svc")
                .with_member("outer", |_: &CallArgs| Ok(Value::null()))
                .with_member("inner", |_: &CallArgs| Ok(Value::null())),
        );
        let mut session = MockSession::new();
        let outer = session.mock(&ns, "outer").unwrap();
        let inner = session.mock(&ns, "inner").unwrap();

        let weak = Arc::downgrade(&ns);
        outer.expect(()).unwrap().does(move |_| {
            let ns = weak.upgrade().expect("namespace alive");
            let v = ns.call("inner", ())?;
            Ok(Value::int(v.as_i64().unwrap_or_default() + 1))
        });
        inner.expect(()).unwrap().returns(41);
        session.replay().unwrap();

        assert_eq!(ns.call("outer", ()).unwrap(), Value::int(42));
        session.verify().unwrap();
    }

    #[test]
    fn raised_error_reaches_caller() {
        let ns = service();
        let mut session = MockSession::new();
        let handle = session.mock(&ns, "f").unwrap();
        handle
            .expect(())
            .unwrap()
            .raises(RaisedError::new("timeout", "upstream too slow"));
        session.replay().unwrap();

        let err = ns.call("f", ()).unwrap_err();
        assert_eq!(err.as_raised().map(|e| e.kind.as_str()), Some("timeout"));
        assert_eq!(handle.calls()[0].outcome.outcome_type(), "raised");
        session.verify().unwrap();
    }

    #[test]
    fn call_log_can_be_disabled() {
        let ns = service();
        let mut session = MockSession::with_config(
            crate::config::SessionConfig::builder()
                .record_calls(false)
                .build(),
        );
        let handle = session.mock(&ns, "f").unwrap();
        handle.expect(()).unwrap();
        session.replay().unwrap();

        ns.call("f", ()).unwrap();
        assert!(handle.calls().is_empty());
        assert_eq!(handle.call_count(), 1);
    }

    #[test]
    fn substitute_outlives_handle_safely() {
        let ns = service();
        let mut session = MockSession::new();
        session.mock(&ns, "f").unwrap().expect(()).unwrap();
        session.replay().unwrap();

        let stale = ns.get("f").unwrap();
        session.tear_down().unwrap();
        drop(session);

        let err = stale(&CallArgs::new()).unwrap_err();
        assert!(matches!(
            err.as_mock(),
            Some(MockError::InvalidStateTransition { .. })
        ));
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(0));
    }
}
