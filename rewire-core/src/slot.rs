//! Replaceable references to a namespace binding.

use crate::error::{MockError, Result};
use crate::namespace::{Callable, Namespace};
use std::sync::Arc;

/// The `(owner, attribute, original)` record a mock handle uses to swap a
/// binding in and out.
///
/// A slot holds the owner's claim on the attribute from [`Slot::capture`]
/// until [`Slot::release`], which keeps two handles from substituting the
/// same binding at once.
pub(crate) struct Slot {
    owner: Arc<Namespace>,
    attribute: String,
    original: Callable,
    installed: Option<Callable>,
    claimed: bool,
}

impl Slot {
    /// Record the current binding of `owner.attribute` and claim it.
    pub(crate) fn capture(owner: &Arc<Namespace>, attribute: &str) -> Result<Self> {
        let original = owner
            .get(attribute)
            .ok_or_else(|| MockError::NoSuchAttribute {
                owner: owner.name().to_string(),
                attribute: attribute.to_string(),
            })?;

        if !owner.claim(attribute) {
            return Err(MockError::DoubleMock {
                target: format!("{}.{}", owner.name(), attribute),
            });
        }

        Ok(Self {
            owner: Arc::clone(owner),
            attribute: attribute.to_string(),
            original,
            installed: None,
            claimed: true,
        })
    }

    /// `owner.attribute`, as shown in diagnostics.
    pub(crate) fn target(&self) -> String {
        format!("{}.{}", self.owner.name(), self.attribute)
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Bind `substitute` in place of the original.
    pub(crate) fn install(&mut self, substitute: Callable) {
        self.owner.rebind(&self.attribute, Arc::clone(&substitute));
        self.installed = Some(substitute);
    }

    /// Bind the original again.
    ///
    /// The original is always written back. An error is returned when the
    /// binding found in place is not the substitute this slot installed.
    /// Restoring a slot that is not installed is a no-op.
    pub(crate) fn restore(&mut self) -> Result<()> {
        let Some(substitute) = self.installed.take() else {
            return Ok(());
        };

        let found = self
            .owner
            .rebind(&self.attribute, Arc::clone(&self.original));

        match found {
            Some(current) if same_callable(&current, &substitute) => Ok(()),
            Some(_) => Err(MockError::Restoration {
                target: self.target(),
                cause: "binding was replaced during replay".to_string(),
            }),
            None => Err(MockError::Restoration {
                target: self.target(),
                cause: "binding was removed during replay".to_string(),
            }),
        }
    }

    /// Give up the claim on the attribute.
    pub(crate) fn release(&mut self) {
        if self.claimed {
            self.owner.release(&self.attribute);
            self.claimed = false;
        }
    }
}

fn same_callable(a: &Callable, b: &Callable) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::CallArgs;
    use crate::value::Value;

    fn owner() -> Arc<Namespace> {
        Arc::new(Namespace::new("svc").with_member("f", |_: &CallArgs| Ok(Value::int(1))))
    }

    fn substitute() -> Callable {
        Arc::new(|_: &CallArgs| Ok(Value::int(2)))
    }

    #[test]
    fn capture_requires_attribute() {
        let ns = owner();
        let err = Slot::capture(&ns, "missing").err();
        assert!(matches!(err, Some(MockError::NoSuchAttribute { .. })));
        assert!(!ns.is_mocked("missing"));
    }

    #[test]
    fn capture_rejects_claimed_attribute() {
        let ns = owner();
        let _first = Slot::capture(&ns, "f").unwrap();
        let err = Slot::capture(&ns, "f").err();
        assert!(matches!(err, Some(MockError::DoubleMock { target }) if target == "svc.f"));
    }

    #[test]
    fn install_then_restore() {
        let ns = owner();
        let mut slot = Slot::capture(&ns, "f").unwrap();

        slot.install(substitute());
        assert!(slot.is_installed());
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(2));

        slot.restore().unwrap();
        assert!(!slot.is_installed());
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(1));

        // Second restore is a no-op.
        slot.restore().unwrap();
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(1));
    }

    #[test]
    fn restore_reports_foreign_rebinding_but_still_restores() {
        let ns = owner();
        let mut slot = Slot::capture(&ns, "f").unwrap();
        slot.install(substitute());

        ns.define("f", |_: &CallArgs| Ok(Value::int(99)));
        let err = slot.restore().unwrap_err();
        assert!(matches!(err, MockError::Restoration { ref cause, .. } if cause.contains("replaced")));
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(1));
    }

    #[test]
    fn restore_reports_removed_binding() {
        let ns = owner();
        let mut slot = Slot::capture(&ns, "f").unwrap();
        slot.install(substitute());

        ns.remove("f");
        let err = slot.restore().unwrap_err();
        assert!(matches!(err, MockError::Restoration { ref cause, .. } if cause.contains("removed")));
        assert_eq!(ns.call("f", ()).unwrap(), Value::int(1));
    }

    #[test]
    fn release_frees_the_claim_once() {
        let ns = owner();
        let mut slot = Slot::capture(&ns, "f").unwrap();
        slot.release();
        assert!(!ns.is_mocked("f"));

        let _other = Slot::capture(&ns, "f").unwrap();
        slot.release();
        assert!(ns.is_mocked("f"));
    }
}
