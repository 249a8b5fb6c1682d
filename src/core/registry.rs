//! Transition registry: ordered action chains keyed by (source, destination).

use super::action::{Action, ActionLayer};
use super::state::State;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lookup key of the registry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionKey {
    pub src: State,
    pub dst: State,
}

impl TransitionKey {
    pub fn new(src: impl Into<State>, dst: impl Into<State>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl fmt::Debug for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.src, self.dst)
    }
}

/// Mapping from transition key to the chain of actions run for it.
///
/// The registry is filled before machines are built and then shared as
/// `Arc<Registry>`; from that point it is only ever read, so dispatches
/// may look up chains concurrently without locking.
///
/// Registering the same key again appends to its chain. Actions of a
/// chain run in insertion order.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::core::{BoxError, Payload, Registry, State};
/// use fsm_dispatch::Context;
///
/// const OPEN: State = State::from_static("open");
/// const CLOSE: State = State::from_static("close");
///
/// async fn noop(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
///     Ok(ctx)
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .add_named(CLOSE, OPEN, "unlock", noop)
///     .add_named(CLOSE, OPEN, "swing", noop)
///     .allow(OPEN, CLOSE);
///
/// let names: Vec<_> = registry.get(&CLOSE, &OPEN).iter().map(|l| l.name()).collect();
/// assert_eq!(names, vec![Some("unlock"), Some("swing")]);
/// assert!(registry.lookup(&OPEN, &CLOSE).is_some());
/// assert!(registry.lookup(&OPEN, &OPEN).is_none());
/// ```
#[derive(Default)]
pub struct Registry {
    chains: HashMap<TransitionKey, Vec<ActionLayer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unnamed action to the chain of `src -> dst`.
    pub fn add<A: Action>(
        &mut self,
        src: impl Into<State>,
        dst: impl Into<State>,
        action: A,
    ) -> &mut Self {
        self.push(TransitionKey::new(src, dst), ActionLayer::new(action, None))
    }

    /// Append a named action to the chain of `src -> dst`.
    ///
    /// The name labels the action in errors and observer events.
    pub fn add_named<A: Action>(
        &mut self,
        src: impl Into<State>,
        dst: impl Into<State>,
        name: impl Into<String>,
        action: A,
    ) -> &mut Self {
        self.push(
            TransitionKey::new(src, dst),
            ActionLayer::new(action, Some(name.into())),
        )
    }

    /// Register `src -> dst` without adding an action.
    ///
    /// A transition with an empty chain commits as soon as it is
    /// dispatched. Calling this on a key that already has actions leaves
    /// them untouched.
    pub fn allow(&mut self, src: impl Into<State>, dst: impl Into<State>) -> &mut Self {
        self.chains.entry(TransitionKey::new(src, dst)).or_default();
        self
    }

    fn push(&mut self, key: TransitionKey, layer: ActionLayer) -> &mut Self {
        self.chains.entry(key).or_default().push(layer);
        self
    }

    /// Actions registered for `src -> dst`, in insertion order.
    ///
    /// Returns an empty slice for unregistered transitions; use
    /// [`lookup`](Self::lookup) to tell those apart from empty chains.
    pub fn get(&self, src: &State, dst: &State) -> &[ActionLayer] {
        self.lookup(src, dst).unwrap_or(&[])
    }

    /// Chain for `src -> dst`, or `None` if the key was never registered.
    pub fn lookup(&self, src: &State, dst: &State) -> Option<&[ActionLayer]> {
        // The key owns its states: clones of `const` states are free, states
        // built at runtime are copied for each lookup.
        self.chains
            .get(&TransitionKey::new(src, dst))
            .map(Vec::as_slice)
    }

    /// Whether `src -> dst` was registered, with or without actions.
    pub fn contains(&self, src: &State, dst: &State) -> bool {
        self.lookup(src, dst).is_some()
    }

    /// Number of registered transitions.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no transition has been registered.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Registered transitions, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &TransitionKey> {
        self.chains.keys()
    }

    pub(crate) fn chains(&self) -> impl Iterator<Item = (&TransitionKey, &[ActionLayer])> {
        self.chains.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.chains.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}
