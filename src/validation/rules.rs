//! Registry rules checked with Validation.

use crate::core::{ActionLayer, Registry, TransitionKey};
use crate::validation::violations::{RegistryViolation, ViolationStrategy};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Outcome of checking one transition or a whole registry.
pub type RegistryValidation = Validation<(), NonEmptyVec<RegistryViolation>>;

/// Type alias for custom transition check functions
pub type RegistryCheck =
    Box<dyn Fn(&TransitionKey, &[ActionLayer]) -> RegistryValidation + Send + Sync>;

/// Rules a registry must satisfy.
/// Uses Validation to accumulate ALL violations.
///
/// The built-in checks always run:
/// - no transition leaves the unknown state
/// - no transition enters the unknown state
/// - the wildcard state is not used as a source or destination
/// - named actions do not have blank names
pub struct RegistryRules {
    pub(crate) required_checks: Vec<RegistryCheck>,
    pub(crate) on_violation: ViolationStrategy,
}

impl RegistryRules {
    pub fn new() -> Self {
        Self {
            required_checks: Vec::new(),
            on_violation: ViolationStrategy::default(),
        }
    }

    /// Add a check run for every registered transition.
    pub fn require<F>(mut self, check: F) -> Self
    where
        F: Fn(&TransitionKey, &[ActionLayer]) -> RegistryValidation + Send + Sync + 'static,
    {
        self.required_checks.push(Box::new(check));
        self
    }

    /// Add a predicate check; `message` describes a failing transition.
    pub fn require_pred<F>(self, pred: F, message: impl Into<String>) -> Self
    where
        F: Fn(&TransitionKey, &[ActionLayer]) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        self.require(move |key, chain| {
            if pred(key, chain) {
                Validation::success(())
            } else {
                Validation::fail(RegistryViolation::CustomCheckFailed {
                    from: key.src.clone(),
                    to: key.dst.clone(),
                    message: message.clone(),
                })
            }
        })
    }

    pub fn on_violation(mut self, strategy: ViolationStrategy) -> Self {
        self.on_violation = strategy;
        self
    }

    pub fn violation_strategy(&self) -> ViolationStrategy {
        self.on_violation
    }

    /// Check every transition of `registry`, accumulating ALL violations.
    ///
    /// Violations are reported in (source, destination) order.
    pub fn check(&self, registry: &Registry) -> RegistryValidation {
        let mut chains: Vec<_> = registry.chains().collect();
        chains.sort_by(|(a, _), (b, _)| (&a.src, &a.dst).cmp(&(&b.src, &b.dst)));

        let mut checks: Vec<RegistryValidation> = Vec::new();
        for (key, chain) in chains {
            checks.extend(builtin_checks(key, chain));
            for check_fn in &self.required_checks {
                checks.push(check_fn(key, chain));
            }
        }

        // Accumulate ALL failures using all_vec
        Validation::all_vec(checks).map(|_| ())
    }
}

impl Default for RegistryRules {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_checks(key: &TransitionKey, chain: &[ActionLayer]) -> Vec<RegistryValidation> {
    let mut checks = Vec::new();

    checks.push(if key.src.is_unknown() {
        Validation::fail(RegistryViolation::FromUnknown {
            to: key.dst.clone(),
        })
    } else {
        Validation::success(())
    });

    checks.push(if key.dst.is_unknown() {
        Validation::fail(RegistryViolation::IntoUnknown {
            from: key.src.clone(),
        })
    } else {
        Validation::success(())
    });

    checks.push(if key.src.is_any() || key.dst.is_any() {
        Validation::fail(RegistryViolation::Wildcard {
            from: key.src.clone(),
            to: key.dst.clone(),
        })
    } else {
        Validation::success(())
    });

    for (index, layer) in chain.iter().enumerate() {
        if matches!(layer.name(), Some(name) if name.trim().is_empty()) {
            checks.push(Validation::fail(RegistryViolation::EmptyActionName {
                from: key.src.clone(),
                to: key.dst.clone(),
                index,
            }));
        }
    }

    checks
}

impl Registry {
    /// Check the built-in registry rules, accumulating ALL violations.
    ///
    /// ```rust
    /// use fsm_dispatch::core::{Registry, State};
    ///
    /// let mut registry = Registry::new();
    /// registry
    ///     .allow("close", "open")
    ///     .allow(State::UNKNOWN, "open")
    ///     .allow("open", State::ANY);
    ///
    /// let result = registry.validate();
    /// assert!(result.is_failure());
    /// ```
    pub fn validate(&self) -> RegistryValidation {
        RegistryRules::default().check(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::{BoxError, Payload, State};

    const OPEN: State = State::from_static("open");
    const CLOSE: State = State::from_static("close");

    async fn noop(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
        Ok(ctx)
    }

    #[test]
    fn valid_registry_passes() {
        let mut registry = Registry::new();
        registry
            .add_named(CLOSE, OPEN, "unlock", noop)
            .add(CLOSE, OPEN, noop)
            .allow(OPEN, CLOSE);

        assert!(registry.validate().is_success());
    }

    #[test]
    fn validation_accumulates_all_violations() {
        let mut registry = Registry::new();
        registry
            .allow(State::UNKNOWN, OPEN)
            .allow(OPEN, State::UNKNOWN)
            .allow(State::ANY, CLOSE)
            .add_named(CLOSE, OPEN, " ", noop);

        match registry.validate() {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 4);

                let has_from_unknown = errors
                    .iter()
                    .any(|e| matches!(e, RegistryViolation::FromUnknown { .. }));
                let has_into_unknown = errors
                    .iter()
                    .any(|e| matches!(e, RegistryViolation::IntoUnknown { .. }));
                let has_wildcard = errors
                    .iter()
                    .any(|e| matches!(e, RegistryViolation::Wildcard { .. }));
                let has_empty_name = errors.iter().any(|e| {
                    matches!(e, RegistryViolation::EmptyActionName { index: 0, .. })
                });

                assert!(has_from_unknown);
                assert!(has_into_unknown);
                assert!(has_wildcard);
                assert!(has_empty_name);
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn violations_are_ordered_by_key() {
        let mut registry = Registry::new();
        registry
            .allow(OPEN, State::ANY)
            .allow(CLOSE, State::ANY);

        match registry.validate() {
            Validation::Failure(errors) => {
                let sources: Vec<_> = errors
                    .iter()
                    .map(|e| match e {
                        RegistryViolation::Wildcard { from, .. } => from.clone(),
                        other => panic!("unexpected violation {other}"),
                    })
                    .collect();
                assert_eq!(sources, vec![CLOSE, OPEN]);
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn custom_predicate_check() {
        let rules = RegistryRules::new().require_pred(
            |_key, chain| !chain.is_empty(),
            "transition has no actions",
        );
        let mut registry = Registry::new();
        registry.add(CLOSE, OPEN, noop).allow(OPEN, CLOSE);

        match rules.check(&registry) {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 1);
                let first = errors.iter().next().unwrap();
                assert_eq!(
                    first.to_string(),
                    r#"Custom check failed for "open" -> "close": transition has no actions"#
                );
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn custom_validation_check_works() {
        let rules = RegistryRules::new().require(|key, _chain| {
            if key.src != key.dst {
                Validation::success(())
            } else {
                Validation::fail(RegistryViolation::CustomCheckFailed {
                    from: key.src.clone(),
                    to: key.dst.clone(),
                    message: "self transitions are not allowed".to_string(),
                })
            }
        });
        let mut registry = Registry::new();
        registry.allow(OPEN, OPEN);

        assert!(rules.check(&registry).is_failure());
    }

    #[test]
    fn empty_registry_is_valid() {
        assert!(Registry::new().validate().is_success());
    }

    #[test]
    fn default_strategy_is_warn() {
        assert_eq!(
            RegistryRules::default().violation_strategy(),
            ViolationStrategy::Warn
        );
        let rules = RegistryRules::new().on_violation(ViolationStrategy::Reject);
        assert_eq!(rules.violation_strategy(), ViolationStrategy::Reject);
    }
}
