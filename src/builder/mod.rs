//! Builder API for machine construction.
//!
//! [`MachineBuilder`] collects the registry, initial state, configuration
//! and observer, validates them, and builds either dispatch strategy.

pub mod config;
pub mod error;
pub mod machine;

pub use config::{MachineConfig, ReentrancyPolicy, SelfTransitionPolicy, DEFAULT_QUEUE_CAPACITY};
pub use error::BuildError;
pub use machine::MachineBuilder;
