//! Namespaces: named tables of replaceable callables.
//!
//! A [`Namespace`] plays the role of a module, object or class whose members
//! can be substituted by mocks. Production code dispatches through
//! [`Namespace::call`]; tests hand the same namespace to a
//! [`MockSession`](crate::MockSession) to swap members out for the duration
//! of a replay window.
//!
//! # Example
//!
//! ```
//! use rewire_core::{CallArgs, Namespace, Value};
//! use std::sync::Arc;
//!
//! let math = Arc::new(Namespace::new("math").with_member("double", |args: &CallArgs| {
//!     let n = args.get(0).and_then(Value::as_i64).unwrap_or_default();
//!     Ok(Value::int(n * 2))
//! }));
//!
//! assert_eq!(math.call("double", [21]).unwrap(), Value::int(42));
//! ```

use crate::args::CallArgs;
use crate::error::{CallResult, MockError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A shared, replaceable callable.
pub type Callable = Arc<dyn Fn(&CallArgs) -> CallResult + Send + Sync>;

static NEXT_NAMESPACE_ID: AtomicU64 = AtomicU64::new(1);

/// A named table of callables whose entries can be substituted by mocks.
pub struct Namespace {
    id: u64,
    name: String,
    members: RwLock<BTreeMap<String, Callable>>,
    /// Attributes currently held by an active mock handle.
    claims: Mutex<BTreeSet<String>>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_NAMESPACE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            members: RwLock::new(BTreeMap::new()),
            claims: Mutex::new(BTreeSet::new()),
        }
    }

    /// Add a member while building the namespace.
    pub fn with_member<F>(self, attribute: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.define(attribute, f);
        self
    }

    /// Unique identity of this namespace within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the namespace, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define or redefine a member.
    pub fn define<F>(&self, attribute: impl Into<String>, f: F)
    where
        F: Fn(&CallArgs) -> CallResult + Send + Sync + 'static,
    {
        self.members.write().insert(attribute.into(), Arc::new(f));
    }

    /// Remove a member, returning its callable.
    pub fn remove(&self, attribute: &str) -> Option<Callable> {
        self.members.write().remove(attribute)
    }

    /// Get the callable currently bound to `attribute`.
    pub fn get(&self, attribute: &str) -> Option<Callable> {
        self.members.read().get(attribute).cloned()
    }

    /// Check if a member exists.
    pub fn contains(&self, attribute: &str) -> bool {
        self.members.read().contains_key(attribute)
    }

    /// Names of all members, sorted.
    pub fn members(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Check if the namespace has no members.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Call a member with the given arguments.
    ///
    /// The binding is looked up and released before the callable runs, so
    /// callables may freely call back into the same namespace.
    pub fn call(&self, attribute: &str, args: impl Into<CallArgs>) -> CallResult {
        let callable = self
            .get(attribute)
            .ok_or_else(|| MockError::NoSuchAttribute {
                owner: self.name.clone(),
                attribute: attribute.to_string(),
            })?;
        callable(&args.into())
    }

    /// Check whether an attribute is currently claimed by a mock.
    pub fn is_mocked(&self, attribute: &str) -> bool {
        self.claims.lock().contains(attribute)
    }

    /// Replace a binding, returning the previous one.
    pub(crate) fn rebind(&self, attribute: &str, callable: Callable) -> Option<Callable> {
        self.members.write().insert(attribute.to_string(), callable)
    }

    /// Claim an attribute for a mock. Returns false if it is already claimed.
    pub(crate) fn claim(&self, attribute: &str) -> bool {
        self.claims.lock().insert(attribute.to_string())
    }

    /// Release a claim taken by [`Namespace::claim`].
    pub(crate) fn release(&self, attribute: &str) {
        self.claims.lock().remove(attribute);
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members())
            .field("claims", &*self.claims.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn constant(v: i64) -> impl Fn(&CallArgs) -> CallResult + Send + Sync + 'static {
        move |_: &CallArgs| Ok(Value::int(v))
    }

    #[test]
    fn define_and_call() {
        let ns = Namespace::new("svc").with_member("a", constant(1));
        assert_eq!(ns.call("a", ()).unwrap(), Value::int(1));

        ns.define("a", constant(2));
        assert_eq!(ns.call("a", ()).unwrap(), Value::int(2));
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn missing_member_is_reported() {
        let ns = Namespace::new("svc");
        let err = ns.call("nope", ()).unwrap_err();
        assert!(matches!(
            err.as_mock(),
            Some(MockError::NoSuchAttribute { owner, attribute }) if owner == "svc" && attribute == "nope"
        ));
    }

    #[test]
    fn members_are_sorted() {
        let ns = Namespace::new("svc")
            .with_member("zeta", constant(0))
            .with_member("alpha", constant(0))
            .with_member("mid", constant(0));
        assert_eq!(ns.members(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn claims_are_exclusive() {
        let ns = Namespace::new("svc").with_member("a", constant(1));
        assert!(ns.claim("a"));
        assert!(ns.is_mocked("a"));
        assert!(!ns.claim("a"));
        ns.release("a");
        assert!(!ns.is_mocked("a"));
        assert!(ns.claim("a"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Namespace::new("a").id(), Namespace::new("a").id());
    }

    #[test]
    fn callables_may_reenter_the_namespace() {
        let ns = Arc::new(Namespace::new("svc").with_member("base", constant(10)));
        let weak = Arc::downgrade(&ns);
        ns.define("derived", move |_| {
            let ns = weak.upgrade().expect("namespace alive");
            let base = ns.call("base", ())?;
            Ok(Value::int(base.as_i64().unwrap_or_default() + 1))
        });
        assert_eq!(ns.call("derived", ()).unwrap(), Value::int(11));
    }
}
