//! Cooperative cancellation tree backing [`Context`](super::Context).

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// Cancelled through a [`CancelHandle`] or a cancelled parent.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

struct Scope {
    token: CancellationToken,
    /// Set by the first `cancel` on this scope itself.
    reason: OnceLock<CancelReason>,
    deadline: Option<Instant>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }
        if self.token.is_cancelled() {
            // Cancelled from above.
            let inherited = self.parent.as_ref().and_then(|parent| parent.reason());
            return Some(inherited.unwrap_or(CancelReason::Cancelled));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Cancellation scope. Cancelling a token cancels all of its descendants;
/// descendants inherit the earliest deadline on their path.
#[derive(Clone)]
pub(crate) struct CancelToken {
    scope: Arc<Scope>,
}

impl CancelToken {
    pub(crate) fn root() -> Self {
        Self {
            scope: Arc::new(Scope {
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Derive a child token, optionally tightening the deadline.
    pub(crate) fn child(&self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.scope.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            scope: Arc::new(Scope {
                token: self.scope.token.child_token(),
                reason: OnceLock::new(),
                deadline,
                parent: Some(Arc::clone(&self.scope)),
            }),
        }
    }

    pub(crate) fn cancel(&self, reason: CancelReason) {
        if self.scope.token.is_cancelled() {
            return;
        }
        let _ = self.scope.reason.set(reason);
        self.scope.token.cancel();
    }

    pub(crate) fn reason(&self) -> Option<CancelReason> {
        self.scope.reason()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.scope.deadline
    }

    /// Resolve once the token is cancelled or its deadline passes.
    pub(crate) async fn cancelled(&self) -> CancelReason {
        if let Some(reason) = self.reason() {
            return reason;
        }

        match self.scope.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.scope.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.cancel(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => self.scope.token.cancelled().await,
        }

        self.reason().unwrap_or(CancelReason::Cancelled)
    }
}

/// Handle that cancels the context it was created with.
///
/// Dropping the handle does not cancel anything.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancelToken,
}

impl CancelHandle {
    pub(crate) fn new(token: CancelToken) -> Self {
        Self { token }
    }

    /// Cancel the context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel(CancelReason::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.reason().is_some()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
