//! Errors returned by dispatch.

use crate::context::CancelReason;
use crate::core::{BoxError, State};
use std::fmt;
use thiserror::Error;

/// How a transition attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Every action succeeded and the new state was written.
    Committed,
    /// Refused before any action ran.
    Rejected,
    /// An action failed, panicked or was cancelled mid-chain.
    Aborted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Rejected => "rejected",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("initial state is not set")]
    NotInitialState,

    #[error("no registered transition from {from:?} to {to:?}")]
    NoRegisteredTransition { from: State, to: State },

    #[error("transition to the current state {state:?} is not allowed")]
    SelfTransition { state: State },

    #[error("{reason}")]
    Cancelled {
        reason: CancelReason,
        /// Whether any action had started when cancellation was observed.
        mid_chain: bool,
    },

    #[error(transparent)]
    Action(#[from] ActionFailure),

    #[error("nested dispatch from {from:?} to {to:?} is not allowed while a transition is running")]
    Reentrant { from: State, to: State },

    #[error("machine is stopped")]
    Stopped,
}

impl DispatchError {
    pub(crate) fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled {
            reason,
            mid_chain: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Cancelled { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Structured record of the failing action, if an action failed.
    pub fn action_failure(&self) -> Option<&ActionFailure> {
        match self {
            Self::Action(failure) => Some(failure),
            _ => None,
        }
    }

    /// Classify the failed attempt.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Action(_) => Outcome::Aborted,
            Self::Cancelled {
                mid_chain: true, ..
            } => Outcome::Aborted,
            _ => Outcome::Rejected,
        }
    }
}

/// What went wrong inside an action.
#[derive(Debug)]
pub enum FailureCause {
    /// The action returned an error.
    Error(BoxError),
    /// The action panicked; the panic was contained.
    Panic {
        message: String,
        /// Stack captured where the panic was raised, when available.
        backtrace: Option<String>,
    },
}

/// Failure of one action in a chain.
#[derive(Debug)]
pub struct ActionFailure {
    /// Zero-based position of the action in its chain.
    pub index: usize,
    pub name: Option<String>,
    pub from: State,
    pub to: State,
    pub cause: FailureCause,
}

impl ActionFailure {
    pub fn is_panic(&self) -> bool {
        matches!(self.cause, FailureCause::Panic { .. })
    }

    /// Registered name of the action, or its position in the chain.
    pub fn label(&self) -> String {
        action_label(self.name.as_deref(), &self.from, &self.to, self.index)
    }

    pub fn backtrace(&self) -> Option<&str> {
        match &self.cause {
            FailureCause::Panic { backtrace, .. } => backtrace.as_deref(),
            FailureCause::Error(_) => None,
        }
    }

    /// Borrow the action's own error as `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match &self.cause {
            FailureCause::Error(err) => err.downcast_ref::<E>(),
            FailureCause::Panic { .. } => None,
        }
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            // Errors returned by actions reach the caller unchanged.
            FailureCause::Error(err) => fmt::Display::fmt(err, f),
            FailureCause::Panic { message, .. } => write!(
                f,
                "action panicked: {} ({:?} => {:?} #{})",
                message, self.from, self.to, self.index
            ),
        }
    }
}

impl std::error::Error for ActionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            FailureCause::Error(err) => Some(err.as_ref()),
            FailureCause::Panic { .. } => None,
        }
    }
}

/// Label used for an action in errors, logs and observer events.
pub(crate) fn action_label(name: Option<&str>, from: &State, to: &State, index: usize) -> String {
    match name {
        Some(name) => name.to_string(),
        None => format!("{:?} -> {:?} #{}", from, to, index),
    }
}
