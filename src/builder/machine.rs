//! Builder for constructing machines.

use crate::builder::config::{MachineConfig, ReentrancyPolicy, SelfTransitionPolicy};
use crate::builder::error::BuildError;
use crate::core::{EntityRef, EntityState, Registry, State, StateCell};
use crate::dispatch::{ConcurrentMachine, SerialMachine};
use crate::observe::{Observer, ObserverRef, TracingObserver};
use crate::validation::{RegistryRules, ViolationStrategy};
use std::sync::Arc;
use stillwater::validation::Validation;
use tracing::warn;

/// Builder for constructing machines with a fluent API.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::builder::MachineBuilder;
/// use fsm_dispatch::core::Registry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut registry = Registry::new();
/// registry.allow("close", "open");
///
/// let machine = MachineBuilder::new()
///     .name("front-door")
///     .registry(registry)
///     .initial("close")
///     .queue_capacity(16)
///     .build_serial()
///     .unwrap();
///
/// assert_eq!(machine.name(), "front-door");
/// # }
/// ```
pub struct MachineBuilder {
    registry: Option<Arc<Registry>>,
    initial: State,
    entity: Option<EntityRef>,
    config: MachineConfig,
    observer: Option<ObserverRef>,
    rules: RegistryRules,
}

impl MachineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            registry: None,
            initial: State::UNKNOWN,
            entity: None,
            config: MachineConfig::default(),
            observer: None,
            rules: RegistryRules::default(),
        }
    }

    /// Set the transition registry (required).
    pub fn registry(mut self, registry: impl Into<Arc<Registry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Set the initial state.
    ///
    /// Without one the machine starts in [`State::UNKNOWN`] and refuses
    /// to dispatch until a state is set with `change_state_to`.
    pub fn initial(mut self, state: impl Into<State>) -> Self {
        self.initial = state.into();
        self
    }

    /// Keep the machine's state in `entity` instead of a private cell.
    ///
    /// Takes precedence over [`initial`](Self::initial); the machine starts
    /// in whatever state the entity holds.
    pub fn entity<E: EntityState>(mut self, entity: Arc<E>) -> Self {
        let entity: EntityRef = entity;
        self.entity = Some(entity);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in logs, observer events and snapshots.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Capacity of the serial request queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// What a dispatch to the current state does.
    pub fn self_transition(mut self, policy: SelfTransitionPolicy) -> Self {
        self.config.self_transition = policy;
        self
    }

    /// What a nested serial dispatch does while its parent runs.
    pub fn reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.config.reentrancy = policy;
        self
    }

    /// Set the observer. Defaults to [`TracingObserver`].
    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Set the rules the registry is checked against at build time.
    pub fn rules(mut self, rules: RegistryRules) -> Self {
        self.rules = rules;
        self
    }

    /// Build a machine that runs transitions one at a time.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build_serial(self) -> Result<SerialMachine, BuildError> {
        let (registry, entity, config, observer) = self.into_parts()?;
        Ok(SerialMachine::from_parts(registry, entity, config, observer))
    }

    /// Build a machine that runs transitions in the callers' tasks.
    pub fn build_concurrent(self) -> Result<ConcurrentMachine, BuildError> {
        let (registry, entity, config, observer) = self.into_parts()?;
        Ok(ConcurrentMachine::from_parts(registry, entity, config, observer))
    }

    fn into_parts(
        self,
    ) -> Result<(Arc<Registry>, EntityRef, MachineConfig, ObserverRef), BuildError> {
        self.config.validate()?;
        let registry = self.registry.ok_or(BuildError::MissingRegistry)?;
        check_registry(&self.rules, &registry, &self.config.name)?;
        let observer = self.observer.unwrap_or_else(|| Arc::new(TracingObserver));
        let initial = self.initial;
        let entity = self
            .entity
            .unwrap_or_else(|| Arc::new(StateCell::new(initial)));

        Ok((registry, entity, self.config, observer))
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_registry(
    rules: &RegistryRules,
    registry: &Registry,
    machine: &str,
) -> Result<(), BuildError> {
    let strategy = rules.violation_strategy();
    if strategy == ViolationStrategy::Ignore {
        return Ok(());
    }

    match rules.check(registry) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => {
            if strategy == ViolationStrategy::Reject {
                return Err(BuildError::InvalidRegistry(errors.iter().cloned().collect()));
            }
            for violation in errors.iter() {
                warn!(machine, %violation, "registry violation");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::Payload;
    use crate::observe::NoopObserver;
    use crate::snapshot::Strategy;

    const OPEN: State = State::from_static("open");
    const CLOSE: State = State::from_static("close");

    fn door() -> Registry {
        let mut registry = Registry::new();
        registry.allow(CLOSE, OPEN).allow(OPEN, CLOSE);
        registry
    }

    #[test]
    fn builder_requires_registry() {
        let result = MachineBuilder::new().initial(CLOSE).build_concurrent();

        assert!(matches!(result, Err(BuildError::MissingRegistry)));
    }

    #[test]
    fn builder_validates_config() {
        let result = MachineBuilder::new()
            .registry(door())
            .queue_capacity(0)
            .build_concurrent();
        assert!(matches!(result, Err(BuildError::ZeroQueueCapacity)));

        let result = MachineBuilder::new()
            .registry(door())
            .name("")
            .build_concurrent();
        assert!(matches!(result, Err(BuildError::EmptyName)));
    }

    #[test]
    fn reject_strategy_refuses_invalid_registry() {
        let mut registry = door();
        registry.allow(State::UNKNOWN, OPEN).allow(OPEN, State::ANY);

        let result = MachineBuilder::new()
            .registry(registry)
            .initial(CLOSE)
            .rules(RegistryRules::new().on_violation(ViolationStrategy::Reject))
            .build_concurrent();

        match result {
            Err(BuildError::InvalidRegistry(violations)) => assert_eq!(violations.len(), 2),
            other => panic!("expected invalid registry, got {other:?}"),
        }
    }

    #[test]
    fn warn_strategy_builds_anyway() {
        let mut registry = door();
        registry.allow(State::UNKNOWN, OPEN);

        let machine = MachineBuilder::new()
            .registry(registry)
            .initial(CLOSE)
            .build_concurrent()
            .unwrap();

        assert_eq!(machine.current_state(), CLOSE);
    }

    #[test]
    fn invalid_registry_message_lists_violations() {
        let err = BuildError::InvalidRegistry(vec![
            crate::validation::RegistryViolation::IntoUnknown { from: OPEN },
        ]);
        assert_eq!(
            err.to_string(),
            r#"Registry has 1 violation(s): Transition from "open" leads to the unknown state"#
        );
    }

    #[tokio::test]
    async fn fluent_api_builds_serial_machine() {
        let machine = MachineBuilder::new()
            .name("front-door")
            .registry(door())
            .initial(CLOSE)
            .queue_capacity(4)
            .self_transition(SelfTransitionPolicy::Allow)
            .reentrancy(ReentrancyPolicy::Reject)
            .observer(NoopObserver)
            .build_serial()
            .unwrap();
        let ctx = Context::background();

        machine.dispatch(&ctx, CLOSE, Payload::none()).await.unwrap();
        machine.dispatch(&ctx, OPEN, Payload::none()).await.unwrap();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.name, "front-door");
        assert_eq!(snapshot.strategy, Strategy::Serial);
        assert_eq!(snapshot.state, OPEN);
        machine.stop().await;
    }

    #[tokio::test]
    async fn machine_without_initial_state_refuses_dispatch() {
        let machine = MachineBuilder::new()
            .registry(door())
            .build_concurrent()
            .unwrap();

        let err = machine
            .dispatch(&Context::background(), OPEN, Payload::none())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "initial state is not set");

        machine.change_state_to(CLOSE);
        machine
            .dispatch(&Context::background(), OPEN, Payload::none())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn entity_takes_precedence_over_initial() {
        let entity = Arc::new(StateCell::new(OPEN));
        let machine = MachineBuilder::new()
            .registry(door())
            .initial(CLOSE)
            .entity(Arc::clone(&entity))
            .build_concurrent()
            .unwrap();

        assert_eq!(machine.current_state(), OPEN);
        machine
            .dispatch(&Context::background(), CLOSE, Payload::none())
            .await
            .unwrap();
        assert_eq!(entity.state(), CLOSE);
    }

    #[test]
    fn config_is_taken_whole() {
        let config =
            MachineConfig::new("gate").with_self_transition(SelfTransitionPolicy::Reject);
        let machine = MachineBuilder::new()
            .registry(door())
            .initial(OPEN)
            .config(config)
            .build_concurrent()
            .unwrap();

        assert_eq!(machine.name(), "gate");
    }
}
