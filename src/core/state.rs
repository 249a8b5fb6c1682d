//! State token for state machine states.
//!
//! A state is an immutable, string-like value. Two values are reserved:
//! [`State::UNKNOWN`], the zero value a machine starts in before it is
//! initialized, and [`State::ANY`], a wildcard kept for registry tooling.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Token identifying a discrete condition of a machine.
///
/// States compare by exact value. Constants can be declared with
/// [`State::from_static`] or the [`states!`](crate::states) macro.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::core::State;
///
/// const OPEN: State = State::from_static("open");
///
/// let state = State::from("open");
/// assert!(state.matches(&OPEN));
/// assert_eq!(state.to_string(), "open");
/// assert!(State::default().is_unknown());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Cow<'static, str>);

impl State {
    /// The absence of a state. A machine in this state refuses to dispatch.
    pub const UNKNOWN: State = State(Cow::Borrowed(""));

    /// Wildcard state. Reserved; the dispatcher never expands it.
    pub const ANY: State = State(Cow::Borrowed("*"));

    /// Create a state from a static string, usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        State(Cow::Borrowed(name))
    }

    /// Create a state from any string.
    pub fn new(name: impl Into<String>) -> Self {
        State(Cow::Owned(name.into()))
    }

    /// Exact equality check.
    ///
    /// Used by the dispatchers to detect the unknown state and
    /// transitions to self.
    pub fn matches(&self, other: &State) -> bool {
        self == other
    }

    /// Overwrite this state in place.
    pub fn set(&mut self, new_state: State) {
        *self = new_state;
    }

    /// The state's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is [`State::UNKNOWN`].
    pub fn is_unknown(&self) -> bool {
        self.matches(&State::UNKNOWN)
    }

    /// Whether this is the [`State::ANY`] wildcard.
    pub fn is_any(&self) -> bool {
        self.matches(&State::ANY)
    }
}

impl Default for State {
    fn default() -> Self {
        State::UNKNOWN
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl From<&'static str> for State {
    fn from(name: &'static str) -> Self {
        State::from_static(name)
    }
}

impl From<String> for State {
    fn from(name: String) -> Self {
        State::new(name)
    }
}

impl From<&State> for State {
    fn from(state: &State) -> Self {
        state.clone()
    }
}

impl AsRef<str> for State {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: State = State::from_static("open");
    const CLOSE: State = State::from_static("close");

    #[test]
    fn matches_is_exact_equality() {
        assert!(OPEN.matches(&State::from("open")));
        assert!(OPEN.matches(&State::new(String::from("open"))));
        assert!(!OPEN.matches(&CLOSE));
        assert!(!OPEN.matches(&State::from("Open")));
    }

    #[test]
    fn sentinels_are_distinct() {
        assert!(State::UNKNOWN.is_unknown());
        assert!(!State::UNKNOWN.is_any());
        assert!(State::ANY.is_any());
        assert!(!State::ANY.is_unknown());
        assert_eq!(State::default(), State::UNKNOWN);
        assert_eq!(State::UNKNOWN.as_str(), "");
        assert_eq!(State::ANY.as_str(), "*");
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut state = CLOSE;
        state.set(OPEN);
        assert_eq!(state, OPEN);
    }

    #[test]
    fn display_and_debug() {
        assert_eq!(OPEN.to_string(), "open");
        assert_eq!(format!("{:?}", OPEN), "\"open\"");
    }

    #[test]
    fn borrowed_and_owned_compare_equal() {
        let owned = State::new("close");
        assert_eq!(owned, CLOSE);

        let mut set = std::collections::HashSet::new();
        set.insert(owned);
        assert!(set.contains(&CLOSE));
    }

    #[test]
    fn state_serializes_as_plain_string() {
        let json = serde_json::to_string(&OPEN).unwrap();
        assert_eq!(json, "\"open\"");

        let deserialized: State = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, OPEN);
    }
}
