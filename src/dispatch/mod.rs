//! Dispatch strategies and the machine handle given to actions.
//!
//! Two strategies implement [`Machine`]:
//!
//! - [`SerialMachine`] funnels every request through a bounded queue into a
//!   single worker task, so transitions of one machine never overlap.
//! - [`ConcurrentMachine`] runs each request inline in the caller's task
//!   against a private workspace copy of the state and commits on success.

mod concurrent;
mod error;
mod executor;
pub(crate) mod panic;
mod serial;

pub use concurrent::ConcurrentMachine;
pub use error::{ActionFailure, DispatchError, FailureCause, Outcome};
pub use serial::SerialMachine;

use crate::context::{CancelHandle, Context};
use crate::core::{Payload, State};
use crate::feedback::Feedback;
use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Handle to a running machine.
///
/// Actions reach the machine that runs them through
/// [`Context::machine`](crate::Context::machine). Under [`ConcurrentMachine`]
/// that handle is the transition's workspace, so state changes made through
/// it decide what the enclosing transition commits.
pub trait Machine: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn current_state(&self) -> State;

    /// Overwrite the state without running any action.
    fn change_state_to(&self, state: State);

    fn feedback(&self) -> Feedback;

    /// Request a transition to `target` and wait for its result.
    fn dispatch(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<(), DispatchError>>;

    /// Request a transition to `target` without waiting for its result.
    fn dispatch_async(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<DispatchHandle, DispatchError>>;
}

pub type MachineRef = Arc<dyn Machine>;

/// Pending result of an asynchronous dispatch.
///
/// Resolves to the dispatch result. A dispatch whose machine went away
/// before answering resolves to [`DispatchError::Stopped`].
pub struct DispatchHandle {
    rx: oneshot::Receiver<Result<(), DispatchError>>,
    dispatch_id: Uuid,
}

impl DispatchHandle {
    pub(crate) fn new(dispatch_id: Uuid) -> (oneshot::Sender<Result<(), DispatchError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, dispatch_id })
    }

    /// Handle that is already resolved with `err`.
    pub(crate) fn failed(err: DispatchError) -> Self {
        let (tx, handle) = Self::new(Uuid::new_v4());
        let _ = tx.send(Err(err));
        handle
    }

    pub fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }

    /// Take the result if the dispatch has finished.
    pub fn try_result(&mut self) -> Option<Result<(), DispatchError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DispatchError::Stopped)),
        }
    }
}

impl Future for DispatchHandle {
    type Output = Result<(), DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Stopped)))
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("dispatch_id", &self.dispatch_id)
            .finish_non_exhaustive()
    }
}

/// Result of [`SerialMachine::dispatch_async`] and
/// [`ConcurrentMachine::dispatch_async`]: the pending result and a handle
/// that cancels the request.
pub type AsyncDispatch = (DispatchHandle, CancelHandle);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_handle_resolves_immediately() {
        let mut handle = DispatchHandle::failed(DispatchError::Stopped);
        assert!(matches!(handle.try_result(), Some(Err(DispatchError::Stopped))));
    }

    #[tokio::test]
    async fn dropped_sender_means_stopped() {
        let (tx, handle) = DispatchHandle::new(Uuid::new_v4());
        drop(tx);
        assert!(matches!(handle.await, Err(DispatchError::Stopped)));
    }

    #[tokio::test]
    async fn pending_handle_has_no_result() {
        let (tx, mut handle) = DispatchHandle::new(Uuid::new_v4());
        assert!(handle.try_result().is_none());

        tx.send(Ok(())).unwrap();
        assert!(handle.await.is_ok());
    }
}
