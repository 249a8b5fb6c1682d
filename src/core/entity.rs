//! Storage for a machine's current state.

use super::state::State;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Object that holds the state a machine reads and commits.
///
/// Machines are built over an entity so that a committed transition is
/// written straight into the caller's domain object. Implementations need
/// interior mutability; `set_state` is called from whichever task commits.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::core::{EntityState, State};
/// use std::sync::Mutex;
///
/// struct Door {
///     id: u64,
///     state: Mutex<State>,
/// }
///
/// impl EntityState for Door {
///     fn state(&self) -> State {
///         self.state.lock().unwrap().clone()
///     }
///
///     fn set_state(&self, state: State) {
///         self.state.lock().unwrap().set(state);
///     }
/// }
///
/// let door = Door { id: 7, state: Mutex::new(State::from("close")) };
/// door.set_state(State::from("open"));
/// assert_eq!(door.state(), State::from("open"));
/// # assert_eq!(door.id, 7);
/// ```
pub trait EntityState: Send + Sync + 'static {
    /// Current state of the entity.
    fn state(&self) -> State;

    /// Overwrite the entity's state.
    fn set_state(&self, state: State);
}

/// Shared handle to an entity.
pub type EntityRef = Arc<dyn EntityState>;

/// Entity that is nothing but a state behind a lock.
///
/// Used when a machine is created from an initial state instead of an
/// entity.
#[derive(Default)]
pub struct StateCell {
    state: RwLock<State>,
}

impl StateCell {
    /// Cell starting at `initial`.
    pub fn new(initial: impl Into<State>) -> Self {
        Self {
            state: RwLock::new(initial.into()),
        }
    }
}

impl EntityState for StateCell {
    fn state(&self) -> State {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: State) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(state);
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&self.state()).finish()
    }
}
