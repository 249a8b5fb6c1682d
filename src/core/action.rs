//! Transition actions and the payload handed to them.

use crate::context::Context;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type returned by actions. Propagated to the caller unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future produced by a single action invocation.
pub type ActionFuture = BoxFuture<'static, Result<Context, BoxError>>;

/// One unit of work in a transition chain.
///
/// An action receives the execution context and the dispatch payload and
/// returns the (possibly extended) context for the next action, or an
/// error that aborts the chain.
///
/// Any `Fn(Context, Payload) -> impl Future<Output = Result<Context, BoxError>>`
/// closure is an action.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::core::{Action, BoxError, Payload};
/// use fsm_dispatch::Context;
///
/// async fn only_bob(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
///     match ctx.value::<String>("identity") {
///         Some(name) if name == "bob" => Ok(ctx),
///         _ => Err("access denied".into()),
///     }
/// }
///
/// fn assert_action<A: Action>(_: A) {}
/// assert_action(only_bob);
/// ```
pub trait Action: Send + Sync + 'static {
    fn call(&self, ctx: Context, payload: Payload) -> ActionFuture;
}

impl<F, Fut> Action for F
where
    F: Fn(Context, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context, BoxError>> + Send + 'static,
{
    fn call(&self, ctx: Context, payload: Payload) -> ActionFuture {
        (self)(ctx, payload).boxed()
    }
}

/// A registered action together with its optional display name.
#[derive(Clone)]
pub struct ActionLayer {
    pub action: Arc<dyn Action>,
    pub name: Option<String>,
}

impl ActionLayer {
    /// Wrap `action`, optionally naming it for failure reports.
    pub fn new<A: Action>(action: A, name: Option<String>) -> Self {
        Self {
            action: Arc::new(action),
            name,
        }
    }

    /// Name given at registration, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for ActionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionLayer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Optional value passed to every action of a chain.
///
/// Cloning is cheap; all actions of a dispatch share the same value.
#[derive(Clone, Default)]
pub struct Payload(Option<Arc<dyn Any + Send + Sync>>);

impl Payload {
    /// Empty payload.
    pub fn none() -> Self {
        Self(None)
    }

    /// Payload carrying `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Borrow the payload as `T`, if present and of that type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    /// Whether the payload carries nothing.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Payload(..)"),
            None => f.write_str("Payload(None)"),
        }
    }
}
