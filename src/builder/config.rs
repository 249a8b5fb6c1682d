//! Machine configuration.

use crate::builder::error::BuildError;
use serde::{Deserialize, Serialize};

/// Capacity of the serial dispatch queue when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// What a dispatch to the current state does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTransitionPolicy {
    /// Treat `(s, s)` like any other key: run its chain if registered,
    /// otherwise fail with `NoRegisteredTransition`.
    #[default]
    Lookup,
    /// Fail with `SelfTransition`.
    Reject,
    /// Succeed without running anything.
    Allow,
}

/// What a nested dispatch from inside a serial transition does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyPolicy {
    /// Queue the request behind the running transition.
    #[default]
    Enqueue,
    /// Fail with `Reentrant`.
    Reject,
}

/// Settings shared by both dispatch strategies.
///
/// Missing fields take their defaults when deserialized:
///
/// ```rust
/// use fsm_dispatch::builder::{MachineConfig, SelfTransitionPolicy};
///
/// let config: MachineConfig =
///     serde_json::from_str(r#"{ "name": "door", "self_transition": "reject" }"#).unwrap();
/// assert_eq!(config.name, "door");
/// assert_eq!(config.queue_capacity, 64);
/// assert_eq!(config.self_transition, SelfTransitionPolicy::Reject);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Label used in logs and observer events.
    pub name: String,
    /// Serial strategy only.
    pub queue_capacity: usize,
    pub self_transition: SelfTransitionPolicy,
    /// Serial strategy only.
    pub reentrancy: ReentrancyPolicy,
}

impl MachineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_self_transition(mut self, policy: SelfTransitionPolicy) -> Self {
        self.self_transition = policy;
        self
    }

    pub fn with_reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.reentrancy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.queue_capacity == 0 {
            return Err(BuildError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "machine".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            self_transition: SelfTransitionPolicy::default(),
            reentrancy: ReentrancyPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.self_transition, SelfTransitionPolicy::Lookup);
        assert_eq!(config.reentrancy, ReentrancyPolicy::Enqueue);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = MachineConfig::new("door").with_queue_capacity(0);
        assert!(matches!(config.validate(), Err(BuildError::ZeroQueueCapacity)));
    }

    #[test]
    fn validate_rejects_blank_name() {
        let config = MachineConfig::new("  ");
        assert!(matches!(config.validate(), Err(BuildError::EmptyName)));
    }

    #[test]
    fn serde_roundtrip_keeps_policies() {
        let config = MachineConfig::new("door")
            .with_queue_capacity(8)
            .with_self_transition(SelfTransitionPolicy::Allow)
            .with_reentrancy(ReentrancyPolicy::Reject);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""reentrancy":"reject""#));
        let restored: MachineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, config);
    }

    #[test]
    fn empty_document_is_default() {
        let config: MachineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
    }
}
