//! Mock sessions and their state machine.
//!
//! A [`MockSession`] owns every [`MockHandle`] created through it and moves
//! through the following modes:
//!
//! ```text
//! Setup --replay()--> Replay --verify()--> Verified | Failed
//!   \                   \                      /
//!    `----------------- tear_down() ----------'--> TornDown
//! ```
//!
//! Teardown is legal from every mode, restores originals in reverse creation
//! order and is idempotent. Dropping a session tears it down.
//!
//! Stubs are the exception to "nothing happens before replay": their
//! substitute is installed when they are created and answers calls in setup
//! as well as replay.

use crate::args::CallArgs;
use crate::config::SessionConfig;
use crate::error::{MockError, Result};
use crate::handle::{HandleKind, MockHandle};
use crate::namespace::{Callable, Namespace};
use crate::value::Value;
use crate::slot::Slot;
use crate::snapshot::{self, MockedObject};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Attribute of the private namespace behind a free-standing mock.
const FREE_STANDING_MEMBER: &str = "call";

/// Lifecycle mode of a [`MockSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Mocks and expectations are being declared.
    Setup,
    /// Substitutes are installed and calls are matched.
    Replay,
    /// Every expectation was satisfied.
    Verified,
    /// Verification failed.
    Failed,
    /// Originals have been restored.
    TornDown,
}

impl SessionMode {
    /// Get the mode name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Replay => "replay",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::TornDown => "torn-down",
        }
    }

    /// Check whether verification has run.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between a session and the handles it created.
pub(crate) struct SessionShared {
    config: SessionConfig,
    mode: Mutex<SessionMode>,
    /// First assertion failure raised into code under test.
    swallowed: Mutex<Option<MockError>>,
    /// First API misuse that could not be returned to its caller.
    usage_error: Mutex<Option<MockError>>,
}

impl SessionShared {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            mode: Mutex::new(SessionMode::Setup),
            swallowed: Mutex::new(None),
            usage_error: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.config.name()
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn mode(&self) -> SessionMode {
        *self.mode.lock()
    }

    fn set_mode(&self, mode: SessionMode) {
        let previous = std::mem::replace(&mut *self.mode.lock(), mode);
        tracing::debug!(session = %self.name(), from = %previous, to = %mode, "Session mode changed");
    }

    /// Keep `error` unless an earlier failure is already kept.
    pub(crate) fn remember_failure(&self, error: MockError) {
        self.swallowed.lock().get_or_insert(error);
    }

    pub(crate) fn swallowed(&self) -> Option<MockError> {
        self.swallowed.lock().clone()
    }

    /// Keep `error` unless an earlier usage error is already kept.
    pub(crate) fn remember_usage_error(&self, error: MockError) {
        self.usage_error.lock().get_or_insert(error);
    }

    pub(crate) fn usage_error(&self) -> Option<MockError> {
        self.usage_error.lock().clone()
    }
}

/// Owner of a group of mocks and the entry point for their lifecycle.
///
/// # Example
///
/// ```
/// use rewire_core::{CallArgs, MockSession, Namespace, Value};
/// use std::sync::Arc;
///
/// let clock = Arc::new(Namespace::new("clock").with_member("now", |_: &CallArgs| Ok(Value::int(0))));
///
/// let mut session = MockSession::new();
/// let now = session.mock(&clock, "now")?;
/// now.expect(())?.returns(100);
/// now.expect(())?.returns(200).twice();
///
/// session.replay()?;
/// assert_eq!(clock.call("now", ()).unwrap(), Value::int(100));
/// assert_eq!(clock.call("now", ()).unwrap(), Value::int(200));
/// assert_eq!(clock.call("now", ()).unwrap(), Value::int(200));
///
/// session.verify()?;
/// session.tear_down()?;
/// assert_eq!(clock.call("now", ()).unwrap(), Value::int(0));
/// # Ok::<(), rewire_core::MockError>(())
/// ```
pub struct MockSession {
    shared: Arc<SessionShared>,
    handles: Vec<MockHandle>,
}

impl MockSession {
    /// Create a session with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create a session with the given configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        tracing::debug!(session = %config.name(), "Session created");
        Self {
            shared: Arc::new(SessionShared::new(config)),
            handles: Vec::new(),
        }
    }

    /// Get the session name.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Get the current mode.
    pub fn mode(&self) -> SessionMode {
        self.shared.mode()
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        self.shared.config()
    }

    /// Handles created by this session, in creation order.
    pub fn handles(&self) -> &[MockHandle] {
        &self.handles
    }

    /// Mock `owner.attribute`.
    ///
    /// The current binding is recorded as the original; nothing is substituted
    /// until [`replay`](Self::replay).
    pub fn mock(&mut self, owner: &Arc<Namespace>, attribute: &str) -> Result<MockHandle> {
        self.create_handle(owner, attribute, None, HandleKind::Mock)
    }

    /// Mock `owner.attribute`, naming it `display_name` in diagnostics.
    pub fn mock_named(
        &mut self,
        owner: &Arc<Namespace>,
        attribute: &str,
        display_name: impl Into<String>,
    ) -> Result<MockHandle> {
        self.create_handle(owner, attribute, Some(display_name.into()), HandleKind::Mock)
    }

    /// Stub `owner.attribute`.
    ///
    /// Unlike a mock, the substitute is installed immediately and answers
    /// calls during setup as well as replay. Its expectations are any-order
    /// and accept any number of calls unless a multiplicity is chained.
    pub fn stub(&mut self, owner: &Arc<Namespace>, attribute: &str) -> Result<MockHandle> {
        self.create_handle(owner, attribute, None, HandleKind::Stub)
    }

    /// Stub `owner.attribute`, naming it `display_name` in diagnostics.
    pub fn stub_named(
        &mut self,
        owner: &Arc<Namespace>,
        attribute: &str,
        display_name: impl Into<String>,
    ) -> Result<MockHandle> {
        self.create_handle(owner, attribute, Some(display_name.into()), HandleKind::Stub)
    }

    /// Mock every member of `owner`, in sorted member order.
    pub fn mock_all(&mut self, owner: &Arc<Namespace>) -> Result<MockedObject> {
        snapshot::mock_all(self, owner, None)
    }

    /// Create a free-standing mock callable named `display_name`.
    ///
    /// Returns the handle used to declare expectations and the callable to
    /// hand to the code under test. The callable is not bound anywhere else.
    pub fn make_mock(&mut self, display_name: impl Into<String>) -> Result<(MockHandle, Callable)> {
        self.make_free_standing(display_name.into(), HandleKind::Mock)
    }

    /// Create a free-standing stub callable named `display_name`.
    pub fn make_stub(&mut self, display_name: impl Into<String>) -> Result<(MockHandle, Callable)> {
        self.make_free_standing(display_name.into(), HandleKind::Stub)
    }

    fn make_free_standing(
        &mut self,
        display_name: String,
        kind: HandleKind,
    ) -> Result<(MockHandle, Callable)> {
        let owner = Arc::new(
            Namespace::new(display_name.clone()).with_member(FREE_STANDING_MEMBER, |_: &CallArgs| {
                Ok(Value::null())
            }),
        );
        let handle = self.create_handle(&owner, FREE_STANDING_MEMBER, Some(display_name), kind)?;

        let target = handle.clone();
        let callable: Callable = Arc::new(move |args: &CallArgs| target.invoke(args));
        Ok((handle, callable))
    }

    fn create_handle(
        &mut self,
        owner: &Arc<Namespace>,
        attribute: &str,
        display_name: Option<String>,
        kind: HandleKind,
    ) -> Result<MockHandle> {
        self.require_mode(kind.as_str(), SessionMode::Setup)?;

        let slot = Slot::capture(owner, attribute)?;
        let handle = MockHandle::new(slot, display_name, kind, Arc::clone(&self.shared));
        if kind == HandleKind::Stub {
            handle.install();
        }
        tracing::debug!(
            session = %self.name(),
            target = %handle.identity(),
            kind = %kind,
            "Mock created"
        );

        self.handles.push(handle.clone());
        Ok(handle)
    }

    /// Seal every expectation and install every substitute.
    ///
    /// Refuses to start while a builder edit made during setup is pending as
    /// a usage error; the session stays in setup.
    pub fn replay(&mut self) -> Result<()> {
        self.require_mode("replay", SessionMode::Setup)?;

        if let Some(error) = self.shared.usage_error() {
            return Err(error);
        }

        for handle in &self.handles {
            handle.arm();
        }
        self.shared.set_mode(SessionMode::Replay);
        Ok(())
    }

    /// Check that every expectation was satisfied.
    ///
    /// A builder edit rejected during replay is always returned first. If a
    /// substitute rejected a call and [`SessionConfig::rethrow_swallowed`] is
    /// on, that failure is returned next, even if the code under test caught
    /// it. Otherwise all expectations outside their call-count range are
    /// reported together.
    pub fn verify(&mut self) -> Result<()> {
        self.require_mode("verify", SessionMode::Replay)?;

        if let Some(error) = self.shared.usage_error() {
            tracing::warn!(session = %self.name(), error = %error, "Reporting rejected expectation change");
            self.shared.set_mode(SessionMode::Failed);
            return Err(error);
        }

        if self.config().rethrow_swallowed() {
            if let Some(error) = self.shared.swallowed() {
                tracing::warn!(session = %self.name(), error = %error, "Re-raising swallowed failure");
                self.shared.set_mode(SessionMode::Failed);
                return Err(error);
            }
        }

        let failures: Vec<_> = self
            .handles
            .iter()
            .flat_map(MockHandle::unsatisfied)
            .collect();

        if failures.is_empty() {
            self.shared.set_mode(SessionMode::Verified);
            return Ok(());
        }

        for failure in &failures {
            tracing::warn!(
                session = %self.name(),
                target = %failure.target,
                expectation = failure.index,
                "Expectation not satisfied: {failure}"
            );
        }
        self.shared.set_mode(SessionMode::Failed);
        Err(MockError::UnsatisfiedExpectations { failures })
    }

    /// Restore every original binding, newest mock first.
    ///
    /// Every handle is restored even if an earlier one fails; the first
    /// restoration error is returned afterwards. Calling this again is a
    /// no-op.
    pub fn tear_down(&mut self) -> Result<()> {
        if self.mode() == SessionMode::TornDown {
            return Ok(());
        }

        let mut first_error = None;
        for handle in self.handles.iter().rev() {
            if let Err(error) = handle.disarm() {
                tracing::error!(
                    session = %self.name(),
                    target = %handle.identity(),
                    error = %error,
                    "Failed to restore original binding"
                );
                first_error.get_or_insert(error);
            }
        }
        self.shared.set_mode(SessionMode::TornDown);

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_mode(&self, operation: &'static str, expected: SessionMode) -> Result<()> {
        let mode = self.mode();
        if mode == expected {
            Ok(())
        } else {
            Err(MockError::InvalidStateTransition { operation, mode })
        }
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if let Err(error) = self.tear_down() {
            tracing::error!(session = %self.name(), error = %error, "Teardown on drop failed");
        }
    }
}

impl fmt::Debug for MockSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSession")
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("handles", &self.handles)
            .finish()
    }
}
