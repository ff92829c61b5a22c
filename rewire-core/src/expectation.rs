//! Expectations and the ordered set that resolves calls against them.
//!
//! An [`Expectation`] pairs an argument matcher with an action and a call-count
//! range. An [`ExpectationSet`] keeps them in declaration order and resolves
//! each incoming call to the next eligible one:
//!
//! 1. any-order expectations are tried first, in declaration order;
//! 2. otherwise the ordered expectations are scanned forward from the cursor;
//! 3. the first expectation whose matcher accepts the arguments and whose
//!    consumed count is below its maximum wins.
//!
//! Once a matched ordered expectation has reached its minimum, the cursor moves
//! up to it and earlier expectations are never revisited.

use crate::args::CallArgs;
use crate::error::{CallResult, RaisedError};
use crate::namespace::Callable;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Allowed call-count range of an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    /// Minimum number of calls required by `verify()`.
    pub min: u32,
    /// Maximum number of calls accepted (`None` = unbounded).
    pub max: Option<u32>,
}

impl Times {
    /// Exactly `n` calls.
    pub const fn exactly(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// At least `n` calls.
    pub const fn at_least(n: u32) -> Self {
        Self { min: n, max: None }
    }

    /// At most `n` calls.
    pub const fn at_most(n: u32) -> Self {
        Self {
            min: 0,
            max: Some(n),
        }
    }

    /// Any number of calls, including none.
    pub const fn any() -> Self {
        Self { min: 0, max: None }
    }

    /// Check whether `count` calls satisfy this range.
    pub fn contains(&self, count: u32) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    /// Check whether one more call is accepted after `count` calls.
    pub fn allows_another(&self, count: u32) -> bool {
        self.max.is_none_or(|max| count < max)
    }

    /// Check that the range is non-empty and admits at least one call.
    pub fn is_valid(&self) -> bool {
        self.max.is_none_or(|max| max > 0 && self.min <= max)
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::exactly(1)
    }
}

impl fmt::Display for Times {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "exactly {min} time(s)"),
            (0, None) => f.write_str("any number of times"),
            (min, None) => write!(f, "at least {min} time(s)"),
            (0, Some(max)) => write!(f, "at most {max} time(s)"),
            (min, Some(max)) => write!(f, "between {min} and {max} times"),
        }
    }
}

/// Predicate deciding whether a call's arguments match an expectation.
#[derive(Clone)]
pub enum ArgMatcher {
    /// Arguments must be equal to these.
    Exact(CallArgs),
    /// Arguments must satisfy a custom predicate.
    Predicate {
        /// Shown in diagnostics instead of the arguments.
        description: String,
        /// The predicate.
        predicate: Arc<dyn Fn(&CallArgs) -> bool + Send + Sync>,
    },
}

impl ArgMatcher {
    /// Match arguments by exact equality.
    pub fn exact(args: impl Into<CallArgs>) -> Self {
        Self::Exact(args.into())
    }

    /// Match arguments with a custom predicate.
    pub fn predicate<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CallArgs) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Check the arguments of a call.
    pub fn matches(&self, args: &CallArgs) -> bool {
        match self {
            Self::Exact(expected) => expected == args,
            Self::Predicate { predicate, .. } => predicate(args),
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exact(expected) => expected.to_string(),
            Self::Predicate { description, .. } => format!("<{description}>"),
        }
    }
}

impl fmt::Debug for ArgMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(args) => f.debug_tuple("Exact").field(args).finish(),
            Self::Predicate { description, .. } => {
                f.debug_tuple("Predicate").field(description).finish()
            }
        }
    }
}

/// What a matched call does.
#[derive(Clone)]
pub enum Action {
    /// Return a value.
    Return(Value),
    /// Raise an error to the caller.
    Raise(RaisedError),
    /// Run a function with the actual arguments and return its result.
    Invoke(Callable),
}

impl Action {
    /// Perform the action for a call with `args`.
    pub fn execute(&self, args: &CallArgs) -> CallResult {
        match self {
            Self::Return(value) => Ok(value.clone()),
            Self::Raise(error) => Err(error.clone().into()),
            Self::Invoke(f) => f(args),
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Return(value) => format!("returns {value}"),
            Self::Raise(error) => format!("raises {error}"),
            Self::Invoke(_) => "invokes a function".to_string(),
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Return(Value::null())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Return(value) => f.debug_tuple("Return").field(value).finish(),
            Self::Raise(error) => f.debug_tuple("Raise").field(error).finish(),
            Self::Invoke(_) => f.write_str("Invoke(..)"),
        }
    }
}

/// One anticipated call.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub(crate) matcher: ArgMatcher,
    pub(crate) action: Action,
    pub(crate) times: Times,
    pub(crate) any_order: bool,
    consumed: u32,
}

impl Expectation {
    /// Create an ordered expectation.
    pub fn new(matcher: ArgMatcher, action: Action, times: Times) -> Self {
        Self {
            matcher,
            action,
            times,
            any_order: false,
            consumed: 0,
        }
    }

    /// Create an expectation matched independently of declaration order.
    pub fn unordered(matcher: ArgMatcher, action: Action, times: Times) -> Self {
        Self {
            any_order: true,
            ..Self::new(matcher, action, times)
        }
    }

    /// The argument matcher.
    pub fn matcher(&self) -> &ArgMatcher {
        &self.matcher
    }

    /// The configured action.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The allowed call-count range.
    pub fn times(&self) -> Times {
        self.times
    }

    /// Whether the expectation is matched independently of declaration order.
    pub fn is_any_order(&self) -> bool {
        self.any_order
    }

    /// How many calls this expectation has satisfied.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Whether the consumed count is within the allowed range.
    pub fn is_satisfied(&self) -> bool {
        self.times.contains(self.consumed)
    }

    /// Whether both expectations match the same exact arguments while one of
    /// them ignores declaration order.
    fn conflicts_with(&self, other: &Expectation) -> bool {
        match (&self.matcher, &other.matcher) {
            (ArgMatcher::Exact(a), ArgMatcher::Exact(b)) => {
                (self.any_order || other.any_order) && a == b
            }
            _ => false,
        }
    }

    /// Whether this expectation can take a call with `args`.
    fn accepts(&self, args: &CallArgs) -> bool {
        self.times.allows_another(self.consumed) && self.matcher.matches(args)
    }
}

/// Read-only view of an expectation for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSummary {
    /// Position in declaration order.
    pub index: usize,
    /// Matcher description.
    pub matcher: String,
    /// Action description.
    pub action: String,
    /// Allowed call-count range.
    pub times: Times,
    /// Calls satisfied so far.
    pub consumed: u32,
    /// Whether it is matched independently of declaration order.
    pub any_order: bool,
}

impl ExpectationSummary {
    fn of(index: usize, expectation: &Expectation) -> Self {
        Self {
            index,
            matcher: expectation.matcher.description(),
            action: expectation.action.description(),
            times: expectation.times,
            consumed: expectation.consumed,
            any_order: expectation.any_order,
        }
    }
}

/// Ordered expectations of one mock handle.
#[derive(Debug, Default)]
pub struct ExpectationSet {
    expectations: Vec<Expectation>,
    cursor: usize,
    sealed: bool,
}

impl ExpectationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation, returning its index.
    pub fn push(&mut self, expectation: Expectation) -> usize {
        self.expectations.push(expectation);
        self.expectations.len() - 1
    }

    /// Number of expectations.
    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    /// Get an expectation by index.
    pub fn get(&self, index: usize) -> Option<&Expectation> {
        self.expectations.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Expectation> {
        self.expectations.get_mut(index)
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter()
    }

    /// Index of an expectation that `candidate` would shadow or be shadowed by.
    ///
    /// Two exact matchers with equal arguments conflict when either of them is
    /// any-order. The expectation at `skip` is ignored, so an existing entry
    /// can be checked against the rest of the set.
    pub fn find_conflict(&self, candidate: &Expectation, skip: Option<usize>) -> Option<usize> {
        self.expectations
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .find(|(_, e)| e.conflicts_with(candidate))
            .map(|(i, _)| i)
    }

    /// Drop every expectation and rewind the cursor.
    pub fn clear(&mut self) {
        self.expectations.clear();
        self.cursor = 0;
    }

    /// Index of the ordered expectation the next scan starts from.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Freeze the configuration of every expectation.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the set has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Resolve a call to an expectation, consuming it.
    ///
    /// Returns the index of the consumed expectation and the action to run,
    /// or `None` when no expectation accepts the call.
    pub fn resolve(&mut self, args: &CallArgs) -> Option<(usize, Action)> {
        let index = self
            .expectations
            .iter()
            .position(|e| e.any_order && e.accepts(args))
            .or_else(|| {
                self.expectations
                    .iter()
                    .enumerate()
                    .skip(self.cursor)
                    .find(|(_, e)| !e.any_order && e.accepts(args))
                    .map(|(i, _)| i)
            })?;

        let expectation = &mut self.expectations[index];
        expectation.consumed += 1;
        if !expectation.any_order && expectation.consumed >= expectation.times.min {
            self.cursor = self.cursor.max(index);
        }
        Some((index, expectation.action.clone()))
    }

    /// Consumed count of every expectation, in declaration order.
    pub fn consumed_counts(&self) -> Vec<u32> {
        self.expectations.iter().map(Expectation::consumed).collect()
    }

    /// Summaries of every expectation, in declaration order.
    pub fn summaries(&self) -> Vec<ExpectationSummary> {
        self.expectations
            .iter()
            .enumerate()
            .map(|(i, e)| ExpectationSummary::of(i, e))
            .collect()
    }

    /// Summaries of the expectations outside their call-count range.
    pub fn unsatisfied(&self) -> Vec<ExpectationSummary> {
        self.expectations
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_satisfied())
            .map(|(i, e)| ExpectationSummary::of(i, e))
            .collect()
    }
}
