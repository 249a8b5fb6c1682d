//! Sequential action-chain executor shared by both dispatch strategies.

use super::error::{action_label, ActionFailure, DispatchError, FailureCause};
use super::panic::{self, CatchPanic, Caught};
use crate::context::{CancelReason, Context};
use crate::core::{ActionLayer, Payload, State};
use crate::observe::{ActionEvent, Observer};
use std::time::Instant;
use tokio::task::JoinError;
use tracing::warn;
use uuid::Uuid;

/// Identity of one chain run, used for labels and observer events.
pub(crate) struct ChainRun<'a> {
    pub machine: &'a str,
    pub from: &'a State,
    pub to: &'a State,
    pub dispatch_id: Uuid,
    pub observer: &'a dyn Observer,
}

impl ChainRun<'_> {
    fn failure(&self, index: usize, layer: &ActionLayer, cause: FailureCause) -> DispatchError {
        let failure = ActionFailure {
            index,
            name: layer.name.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            cause,
        };
        match &failure.cause {
            FailureCause::Panic { backtrace, .. } => warn!(
                machine = self.machine,
                dispatch_id = %self.dispatch_id,
                action = %failure.label(),
                backtrace = backtrace.as_deref().unwrap_or("<unavailable>"),
                "{}",
                failure
            ),
            FailureCause::Error(_) => warn!(
                machine = self.machine,
                dispatch_id = %self.dispatch_id,
                action = %failure.label(),
                "action failed: {}",
                failure
            ),
        }
        DispatchError::Action(failure)
    }

    fn observe(&self, index: usize, layer: &ActionLayer, started: Instant, success: bool) {
        let label = action_label(layer.name(), self.from, self.to, index);
        self.observer.on_action(&ActionEvent {
            machine: self.machine,
            action: &label,
            dispatch_id: self.dispatch_id,
            elapsed: started.elapsed(),
            success,
        });
    }
}

fn panic_cause(caught: Caught) -> FailureCause {
    FailureCause::Panic {
        message: caught.message,
        backtrace: caught.backtrace,
    }
}

/// Classify an action task that ended without a result.
///
/// A cancelled task was dropped by the runtime while shutting down; only a
/// panic that escaped the boundary is an action failure.
fn join_cause(join_err: JoinError) -> Result<FailureCause, CancelReason> {
    if join_err.is_cancelled() {
        return Err(CancelReason::Cancelled);
    }
    Ok(FailureCause::Panic {
        message: join_err.to_string(),
        backtrace: None,
    })
}

/// Run `chain` in order, threading the context from one action to the next.
///
/// Stops at the first failing action. Each action runs as its own task
/// behind a panic boundary; if `ctx` is cancelled while an action runs, the
/// chain returns [`DispatchError::Cancelled`] at once and the action task
/// is left to finish on its own.
pub(crate) async fn run_chain(
    chain: &[ActionLayer],
    mut ctx: Context,
    payload: &Payload,
    run: &ChainRun<'_>,
) -> Result<Context, DispatchError> {
    for (index, layer) in chain.iter().enumerate() {
        if let Some(reason) = ctx.cancel_reason() {
            return Err(DispatchError::Cancelled {
                reason,
                mid_chain: index > 0,
            });
        }

        let started = Instant::now();

        // The synchronous part of a closure action runs here, not in the task.
        let future = match panic::catch(|| layer.action.call(ctx.clone(), payload.clone())) {
            Ok(future) => future,
            Err(caught) => {
                run.observe(index, layer, started, false);
                return Err(run.failure(index, layer, panic_cause(caught)));
            }
        };
        let mut task = tokio::spawn(CatchPanic::new(future));

        let joined = tokio::select! {
            biased;
            reason = ctx.cancelled() => {
                run.observe(index, layer, started, false);
                return Err(DispatchError::Cancelled { reason, mid_chain: true });
            }
            joined = &mut task => joined,
        };

        let cause = match joined {
            Ok(Ok(Ok(next))) => {
                run.observe(index, layer, started, true);
                ctx = next;
                continue;
            }
            Ok(Ok(Err(err))) => FailureCause::Error(err),
            Ok(Err(caught)) => panic_cause(caught),
            Err(join_err) => match join_cause(join_err) {
                Ok(cause) => cause,
                Err(reason) => {
                    run.observe(index, layer, started, false);
                    return Err(DispatchError::Cancelled { reason, mid_chain: true });
                }
            },
        };
        run.observe(index, layer, started, false);
        return Err(run.failure(index, layer, cause));
    }

    Ok(ctx)
}
