//! Registry violations and handling strategies.

use crate::core::State;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems found in a registry
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryViolation {
    #[error("Transition to {to:?} starts from the unknown state and can never run")]
    FromUnknown { to: State },

    #[error("Transition from {from:?} leads to the unknown state")]
    IntoUnknown { from: State },

    #[error("Transition {from:?} -> {to:?} uses the reserved wildcard state")]
    Wildcard { from: State, to: State },

    #[error("Action #{index} of {from:?} -> {to:?} has an empty name")]
    EmptyActionName { from: State, to: State, index: usize },

    #[error("Custom check failed for {from:?} -> {to:?}: {message}")]
    CustomCheckFailed {
        from: State,
        to: State,
        message: String,
    },
}

/// Strategy for handling registry violations when a machine is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStrategy {
    /// Refuse to build the machine
    Reject,

    /// Build the machine and log every violation
    #[default]
    Warn,

    /// Build the machine silently
    Ignore,
}
