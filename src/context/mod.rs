//! Execution context threaded through an action chain.
//!
//! A [`Context`] carries three things:
//! - immutable key/value pairs that actions may extend for later actions
//! - a cooperative cancellation scope (cancel handle and deadline)
//! - once dispatched, the [`TransitionInfo`] of the running transition,
//!   including a handle back to the machine for nested dispatches
//!
//! Contexts are cheap to clone; deriving a new one never mutates the
//! original.

mod cancel;

pub use cancel::{CancelHandle, CancelReason};
pub(crate) use cancel::CancelToken;

use crate::core::State;
use crate::dispatch::MachineRef;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

type Values = HashMap<&'static str, Arc<dyn Any + Send + Sync>>;

/// Metadata of the transition an action is running in.
#[derive(Clone)]
pub struct TransitionInfo {
    pub source: State,
    pub destination: State,
    /// Correlates log lines and observer events of one dispatch.
    pub dispatch_id: Uuid,
    /// Machine running the transition.
    pub machine: MachineRef,
}

impl fmt::Debug for TransitionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionInfo")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("dispatch_id", &self.dispatch_id)
            .field("machine", &self.machine.name())
            .finish()
    }
}

/// Cancellable, value-carrying context.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::Context;
///
/// let ctx = Context::background().with_value("identity", "bob".to_string());
/// assert_eq!(ctx.value::<String>("identity").map(String::as_str), Some("bob"));
///
/// let (child, cancel) = ctx.with_cancel();
/// cancel.cancel();
/// assert!(child.is_cancelled());
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Clone)]
pub struct Context {
    values: Arc<Values>,
    token: CancelToken,
    transition: Option<Arc<TransitionInfo>>,
}

impl Context {
    /// Empty context that is never cancelled on its own.
    pub fn background() -> Self {
        Self {
            values: Arc::new(HashMap::new()),
            token: CancelToken::root(),
            transition: None,
        }
    }

    /// Copy of this context with `key` bound to `value`.
    ///
    /// Binding an existing key shadows the previous value.
    pub fn with_value<T: Any + Send + Sync>(&self, key: &'static str, value: T) -> Self {
        let mut values = Arc::clone(&self.values);
        Arc::make_mut(&mut values).insert(key, Arc::new(value));
        Self {
            values,
            token: self.token.clone(),
            transition: self.transition.clone(),
        }
    }

    /// Value bound to `key`, if present and of type `T`.
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.values
            .get(key)
            .and_then(|value| value.as_ref().downcast_ref::<T>())
    }

    /// Derive a context that can be cancelled independently of this one.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        self.derive(None)
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.derive(Some(Instant::now() + timeout))
    }

    /// Derive a context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> (Self, CancelHandle) {
        let token = self.token.child(deadline);
        let ctx = Self {
            values: Arc::clone(&self.values),
            token: token.clone(),
            transition: self.transition.clone(),
        };
        (ctx, CancelHandle::new(token))
    }

    /// Derive the per-transition context handed to the first action.
    pub(crate) fn for_transition(&self, info: TransitionInfo) -> (Self, CancelHandle) {
        let (mut ctx, cancel) = self.with_cancel();
        ctx.transition = Some(Arc::new(info));
        (ctx, cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.reason().is_some()
    }

    /// Why the context stopped, or `None` while it is live.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.token.reason()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.token.deadline()
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await
    }

    pub fn transition(&self) -> Option<&TransitionInfo> {
        self.transition.as_deref()
    }

    pub fn source_state(&self) -> Option<&State> {
        self.transition().map(|info| &info.source)
    }

    pub fn destination_state(&self) -> Option<&State> {
        self.transition().map(|info| &info.destination)
    }

    /// Machine running the current transition.
    pub fn machine(&self) -> Option<&MachineRef> {
        self.transition().map(|info| &info.machine)
    }

    pub fn dispatch_id(&self) -> Option<Uuid> {
        self.transition().map(|info| info.dispatch_id)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Context")
            .field("keys", &keys)
            .field("cancelled", &self.cancel_reason())
            .field("transition", &self.transition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_copy_on_write() {
        let base = Context::background().with_value("name", "alice".to_string());
        let derived = base.with_value("name", "bob".to_string());

        assert_eq!(base.value::<String>("name").unwrap(), "alice");
        assert_eq!(derived.value::<String>("name").unwrap(), "bob");
    }

    #[test]
    fn value_requires_matching_type() {
        let ctx = Context::background().with_value("count", 3u64);

        assert_eq!(ctx.value::<u64>("count"), Some(&3));
        assert!(ctx.value::<u32>("count").is_none());
        assert!(ctx.value::<u64>("missing").is_none());
    }

    #[test]
    fn derived_contexts_keep_values() {
        let ctx = Context::background().with_value("name", "bob".to_string());
        let (child, _cancel) = ctx.with_cancel();

        assert_eq!(child.value::<String>("name").unwrap(), "bob");
    }

    #[test]
    fn cancelling_parent_cancels_derived() {
        let (parent, cancel) = Context::background().with_cancel();
        let (child, _) = parent.with_cancel();
        let valued = child.with_value("k", 1u8);

        cancel.cancel();

        assert_eq!(child.cancel_reason(), Some(CancelReason::Cancelled));
        assert!(valued.is_cancelled());
    }

    #[test]
    fn zero_timeout_is_already_expired() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::ZERO);
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn background_has_no_transition() {
        let ctx = Context::background();
        assert!(ctx.transition().is_none());
        assert!(ctx.machine().is_none());
        assert!(ctx.source_state().is_none());
        assert!(ctx.dispatch_id().is_none());
    }

    #[tokio::test]
    async fn timeout_resolves_cancelled() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.cancelled().await, CancelReason::DeadlineExceeded);
    }
}
