//! Validation of transition registries.
//!
//! Checks use Stillwater's `Validation` type so that every problem of a
//! registry is reported at once instead of stopping at the first one.
//!
//! # Example
//!
//! ```rust
//! use fsm_dispatch::core::{Registry, State};
//! use fsm_dispatch::validation::{RegistryRules, ViolationStrategy};
//!
//! let rules = RegistryRules::new()
//!     .require_pred(|key, _chain| !key.dst.as_str().is_empty(), "destination is empty")
//!     .on_violation(ViolationStrategy::Reject);
//!
//! let mut registry = Registry::new();
//! registry.allow("close", "open");
//! assert!(rules.check(&registry).is_success());
//! ```

pub mod rules;
pub mod violations;

pub use rules::{RegistryCheck, RegistryRules, RegistryValidation};
pub use violations::{RegistryViolation, ViolationStrategy};
