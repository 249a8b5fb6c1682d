//! fsm-dispatch: a concurrency-safe finite state machine dispatch engine
//!
//! A machine holds one current [`State`]. Dispatching a request for a new
//! state looks up the chain of actions registered for
//! `(current, requested)` in a [`Registry`], runs them in order under a
//! cancellable [`Context`], and commits the requested state only if every
//! action succeeds.
//!
//! # Core Concepts
//!
//! - **State**: string-like token; [`State::UNKNOWN`] means "not initialized"
//! - **Registry**: ordered action chains keyed by (source, destination)
//! - **Context**: values, cancellation and transition metadata for actions
//! - **Strategies**: [`SerialMachine`] runs one transition at a time from a
//!   queue; [`ConcurrentMachine`] runs transitions inline against a workspace
//! - **Feedback**: best-effort side channel from actions to observers
//!
//! # Example
//!
//! ```rust
//! use fsm_dispatch::{states, BoxError, Context, Payload, Registry, SerialMachine};
//!
//! states! {
//!     OPEN = "open";
//!     CLOSE = "close";
//! }
//!
//! async fn only_bob(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
//!     match ctx.value::<String>("identity") {
//!         Some(name) if name == "bob" => Ok(ctx),
//!         _ => Err("access denied".into()),
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut registry = Registry::new();
//! registry.add_named(CLOSE, OPEN, "only_bob", only_bob).allow(OPEN, CLOSE);
//!
//! let door = SerialMachine::new(registry, CLOSE);
//!
//! let alice = Context::background().with_value("identity", "alice".to_string());
//! let err = door.dispatch(&alice, OPEN, Payload::none()).await.unwrap_err();
//! assert_eq!(err.to_string(), "access denied");
//! assert_eq!(door.current_state(), CLOSE);
//!
//! let bob = Context::background().with_value("identity", "bob".to_string());
//! door.dispatch(&bob, OPEN, Payload::none()).await.unwrap();
//! assert_eq!(door.current_state(), OPEN);
//!
//! door.stop().await;
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod feedback;
pub mod observe;
pub mod snapshot;
pub mod validation;

// Re-export commonly used types
pub use crate::core::{Action, BoxError, EntityState, Payload, Registry, State, StateCell};
pub use builder::{BuildError, MachineBuilder, MachineConfig};
pub use context::{CancelHandle, CancelReason, Context, TransitionInfo};
pub use dispatch::{
    ActionFailure, ConcurrentMachine, DispatchError, DispatchHandle, Machine, MachineRef, Outcome,
    SerialMachine,
};
pub use feedback::Feedback;
pub use observe::{Observer, TracingObserver};
pub use snapshot::MachineSnapshot;
