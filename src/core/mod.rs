//! Core state machine types.
//!
//! This module contains the configuration side of the engine:
//! - State tokens via [`State`]
//! - The [`EntityState`] a machine reads and commits
//! - Actions and their payload
//! - The [`Registry`] of transition chains
//!
//! Everything here is plain data; the dispatchers in
//! [`dispatch`](crate::dispatch) give it behavior.

mod action;
mod entity;
mod macros;
mod registry;
mod state;

pub use action::{Action, ActionFuture, ActionLayer, BoxError, Payload};
pub use entity::{EntityRef, EntityState, StateCell};
pub use registry::{Registry, TransitionKey};
pub use state::State;
