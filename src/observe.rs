//! Observability hooks.
//!
//! Machines report one [`ActionEvent`] per executed action and one
//! [`DispatchEvent`] per dispatch to an [`Observer`]. Exporting them as
//! histograms and counters is left to the host application; the default
//! [`TracingObserver`] turns them into `tracing` events.

use crate::core::State;
use crate::dispatch::Outcome;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One executed action.
#[derive(Clone, Debug)]
pub struct ActionEvent<'a> {
    pub machine: &'a str,
    /// Registered action name, or its position in the chain.
    pub action: &'a str,
    pub dispatch_id: Uuid,
    pub elapsed: Duration,
    pub success: bool,
}

/// One finished dispatch.
#[derive(Clone, Debug)]
pub struct DispatchEvent<'a> {
    pub machine: &'a str,
    pub from: &'a State,
    pub to: &'a State,
    pub dispatch_id: Uuid,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

/// Collector of dispatch metrics.
///
/// Both methods default to doing nothing. Implementations are called on
/// the dispatching task and should not block.
pub trait Observer: Send + Sync + 'static {
    fn on_action(&self, _event: &ActionEvent<'_>) {}

    fn on_dispatch(&self, _event: &DispatchEvent<'_>) {}
}

pub type ObserverRef = Arc<dyn Observer>;

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Emits every event as a `tracing` event at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_action(&self, event: &ActionEvent<'_>) {
        tracing::debug!(
            machine = event.machine,
            action = event.action,
            dispatch_id = %event.dispatch_id,
            elapsed_ms = event.elapsed.as_millis() as u64,
            success = event.success,
            "action finished"
        );
    }

    fn on_dispatch(&self, event: &DispatchEvent<'_>) {
        tracing::debug!(
            machine = event.machine,
            from = %event.from,
            to = %event.to,
            dispatch_id = %event.dispatch_id,
            elapsed_ms = event.elapsed.as_millis() as u64,
            outcome = event.outcome.as_str(),
            "dispatch finished"
        );
    }
}
