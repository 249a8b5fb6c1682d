//! Build errors for machine builders.

use crate::validation::RegistryViolation;
use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Registry not specified. Call .registry(registry) before building")]
    MissingRegistry,

    #[error("Queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("Machine name must not be empty")]
    EmptyName,

    #[error("Registry has {} violation(s): {}", .0.len(), summary(.0))]
    InvalidRegistry(Vec<RegistryViolation>),
}

fn summary(violations: &[RegistryViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
