//! Mocking every member of a namespace at once.

use crate::args::CallArgs;
use crate::builder::ExpectationBuilder;
use crate::error::{MockError, Result};
use crate::handle::MockHandle;
use crate::namespace::Namespace;
use crate::session::MockSession;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handles for every member of a mocked namespace, keyed by member name.
#[derive(Debug, Clone)]
pub struct MockedObject {
    owner_name: String,
    handles: BTreeMap<String, MockHandle>,
}

impl MockedObject {
    /// Name of the mocked namespace.
    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// Get the handle of a member.
    pub fn member(&self, name: &str) -> Option<&MockHandle> {
        self.handles.get(name)
    }

    /// Expect a call of `member` with exactly these arguments.
    pub fn expect(&self, member: &str, args: impl Into<CallArgs>) -> Result<ExpectationBuilder> {
        self.member(member)
            .ok_or_else(|| MockError::NoSuchAttribute {
                owner: self.owner_name.clone(),
                attribute: member.to_string(),
            })?
            .expect(args)
    }

    /// Iterate over `(member, handle)` pairs in member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MockHandle)> {
        self.handles.iter().map(|(name, handle)| (name.as_str(), handle))
    }

    /// Number of mocked members.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if no member was mocked.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Mock every member of `owner` through `session`, in sorted member order.
///
/// Handles are displayed as `<prefix>.<member>`, where the prefix defaults
/// to the namespace name. Stops at the first member that cannot be mocked;
/// members mocked before it stay registered with the session.
pub fn mock_all(
    session: &mut MockSession,
    owner: &Arc<Namespace>,
    display_prefix: Option<&str>,
) -> Result<MockedObject> {
    let prefix = display_prefix.unwrap_or(owner.name());
    let mut handles = BTreeMap::new();

    for member in owner.members() {
        let handle = session.mock_named(owner, &member, format!("{prefix}.{member}"))?;
        handles.insert(member, handle);
    }

    tracing::debug!(
        session = %session.name(),
        owner = %owner.name(),
        members = handles.len(),
        "Mocked all members"
    );

    Ok(MockedObject {
        owner_name: owner.name().to_string(),
        handles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn repository() -> Arc<Namespace> {
        Arc::new(
            Namespace::new("repo")
                .with_member("save", |_: &CallArgs| Ok(Value::bool(true)))
                .with_member("load", |_: &CallArgs| Ok(Value::string("real"))),
        )
    }

    #[test]
    fn mocks_every_member_in_order() {
        let ns = repository();
        let mut session = MockSession::new();
        let object = session.mock_all(&ns).unwrap();

        let names: Vec<_> = object.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["load", "save"]);
        assert_eq!(object.owner_name(), "repo");
        assert_eq!(
            session
                .handles()
                .iter()
                .map(MockHandle::display_name)
                .collect::<Vec<_>>(),
            vec!["repo.load", "repo.save"]
        );
    }

    #[test]
    fn custom_prefix() {
        let ns = repository();
        let mut session = MockSession::new();
        let object = mock_all(&mut session, &ns, Some("Repository")).unwrap();
        assert_eq!(
            object.member("save").map(MockHandle::display_name),
            Some("Repository.save")
        );
    }

    #[test]
    fn expect_through_object() {
        let ns = repository();
        let mut session = MockSession::new();
        let object = session.mock_all(&ns).unwrap();

        object.expect("load", ["k"]).unwrap().returns("mocked");
        object.expect("save", ["k", "v"]).unwrap();
        assert!(matches!(
            object.expect("delete", ()),
            Err(MockError::NoSuchAttribute { .. })
        ));

        session.replay().unwrap();
        assert_eq!(ns.call("load", ["k"]).unwrap(), Value::string("mocked"));
        ns.call("save", ["k", "v"]).unwrap();
        session.verify().unwrap();
        session.tear_down().unwrap();
        assert_eq!(ns.call("load", ["k"]).unwrap(), Value::string("real"));
    }

    #[test]
    fn fails_fast_on_double_mock() {
        let ns = repository();
        let mut other = MockSession::new();
        other.mock(&ns, "save").unwrap();

        let mut session = MockSession::new();
        let err = session.mock_all(&ns).unwrap_err();
        assert!(matches!(err, MockError::DoubleMock { target } if target == "repo.save"));
        // "load" was mocked before the failure and stays with the session.
        assert_eq!(session.handles().len(), 1);

        session.tear_down().unwrap();
        assert!(!ns.is_mocked("load"));
        assert!(ns.is_mocked("save"));
    }
}
