//! Concurrent dispatch: each request runs in its caller's task against a
//! private workspace and commits on success.

use super::error::{DispatchError, Outcome};
use super::executor::{run_chain, ChainRun};
use super::{AsyncDispatch, DispatchHandle, Machine};
use crate::builder::{MachineConfig, SelfTransitionPolicy};
use crate::context::{Context, TransitionInfo};
use crate::core::{EntityRef, EntityState, Payload, Registry, State, StateCell};
use crate::feedback::Feedback;
use crate::observe::{DispatchEvent, ObserverRef, TracingObserver};
use crate::snapshot::{MachineSnapshot, Strategy};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

struct Shared {
    config: MachineConfig,
    registry: Arc<Registry>,
    observer: ObserverRef,
    entity: EntityRef,
    /// Set by every `change_state_to`; read when a workspace is committed.
    overridden: AtomicBool,
    feedback: Mutex<Feedback>,
    /// Workspace of a running transition rather than a top-level machine.
    workspace: bool,
}

/// Machine whose transitions run inline in the dispatching task.
///
/// Dispatches on one machine may overlap. Each runs its chain against a
/// workspace: a private copy of the state that actions can change through
/// [`Context::machine`](crate::Context::machine), either directly or by
/// dispatching on it. When the chain succeeds, the workspace state (if an
/// action changed it) or the requested destination replaces the machine's
/// state; concurrent commits are last-write-wins.
///
/// The feedback channel returned by [`feedback`](Self::feedback) belongs to
/// the next dispatch. It is closed when that dispatch ends and replaced with
/// a fresh one.
///
/// Cloning yields another handle to the same machine.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::{states, ConcurrentMachine, Context, Payload, Registry};
///
/// states! {
///     OPEN = "open";
///     CLOSE = "close";
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut registry = Registry::new();
/// registry.add(CLOSE, OPEN, |ctx: Context, _payload: Payload| async move {
///     // Redirect the transition.
///     if let Some(machine) = ctx.machine() {
///         machine.change_state_to(CLOSE);
///     }
///     Ok(ctx)
/// });
///
/// let machine = ConcurrentMachine::new(registry, CLOSE);
/// machine.dispatch(&Context::background(), OPEN, Payload::none()).await.unwrap();
/// assert_eq!(machine.current_state(), CLOSE);
/// # }
/// ```
#[derive(Clone)]
pub struct ConcurrentMachine {
    shared: Arc<Shared>,
}

impl ConcurrentMachine {
    /// Machine with the default configuration and the tracing observer.
    pub fn new(registry: impl Into<Arc<Registry>>, initial: impl Into<State>) -> Self {
        Self::with_entity(registry, Arc::new(StateCell::new(initial)))
    }

    /// Machine that reads and commits the state of `entity`.
    ///
    /// Workspaces copy the entity's state; only commits write to it.
    pub fn with_entity<E: EntityState>(registry: impl Into<Arc<Registry>>, entity: Arc<E>) -> Self {
        Self::from_parts(
            registry.into(),
            entity,
            MachineConfig::default(),
            Arc::new(TracingObserver),
        )
    }

    pub(crate) fn from_parts(
        registry: Arc<Registry>,
        entity: EntityRef,
        config: MachineConfig,
        observer: ObserverRef,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                observer,
                entity,
                overridden: AtomicBool::new(false),
                feedback: Mutex::new(Feedback::new()),
                workspace: false,
            }),
        }
    }

    /// Workspace for one transition starting at `state`.
    fn workspace(&self, state: State) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: self.shared.config.clone(),
                registry: Arc::clone(&self.shared.registry),
                observer: Arc::clone(&self.shared.observer),
                entity: Arc::new(StateCell::new(state)),
                overridden: AtomicBool::new(false),
                feedback: Mutex::new(self.feedback()),
                workspace: true,
            }),
        }
    }

    /// Name from the machine's configuration.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// State last committed or set.
    pub fn current_state(&self) -> State {
        self.shared.entity.state()
    }

    /// Overwrite the state without running any action.
    ///
    /// Called on a transition's workspace, this decides what the
    /// transition commits.
    pub fn change_state_to(&self, state: impl Into<State>) {
        self.shared.entity.set_state(state.into());
        self.shared.overridden.store(true, Ordering::SeqCst);
    }

    /// Feedback channel of the next dispatch.
    pub fn feedback(&self) -> Feedback {
        self.shared
            .feedback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close the current feedback channel and install a fresh one.
    fn rotate_feedback(&self) {
        let previous = std::mem::take(
            &mut *self
                .shared
                .feedback
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        previous.close();
    }

    /// Point-in-time view of the machine.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot::new(self.name(), Strategy::Concurrent, self.current_state(), None)
    }

    /// Run a transition to `target` and return its result.
    ///
    /// Cancelling `ctx` makes this return at once; the action that is
    /// running at that moment is left to finish in the background and
    /// nothing is committed.
    pub async fn dispatch(
        &self,
        ctx: &Context,
        target: impl Into<State>,
        payload: Payload,
    ) -> Result<(), DispatchError> {
        self.dispatch_with_id(ctx, target.into(), payload, Uuid::new_v4())
            .await
    }

    /// Start a transition to `target` on a new task.
    pub fn dispatch_async(
        &self,
        ctx: &Context,
        target: impl Into<State>,
        payload: Payload,
    ) -> AsyncDispatch {
        let (ctx, cancel) = ctx.with_cancel();
        let dispatch_id = Uuid::new_v4();
        let (done, handle) = DispatchHandle::new(dispatch_id);
        let machine = self.clone();
        let target = target.into();

        tokio::spawn(async move {
            let result = machine
                .dispatch_with_id(&ctx, target, payload, dispatch_id)
                .await;
            let _ = done.send(result);
        });

        (handle, cancel)
    }

    async fn dispatch_with_id(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
        dispatch_id: Uuid,
    ) -> Result<(), DispatchError> {
        let started = Instant::now();
        let from = self.current_state();

        let result = self
            .transition(&from, &target, ctx, payload, dispatch_id)
            .await;

        if !self.shared.workspace {
            self.rotate_feedback();
        }

        let outcome = match &result {
            Ok(()) => Outcome::Committed,
            Err(err) => err.outcome(),
        };
        self.shared.observer.on_dispatch(&DispatchEvent {
            machine: self.name(),
            from: &from,
            to: &target,
            dispatch_id,
            elapsed: started.elapsed(),
            outcome,
        });
        if let Err(err) = &result {
            debug!(
                machine = self.name(),
                from = %from,
                to = %target,
                dispatch_id = %dispatch_id,
                outcome = %outcome,
                error = %err,
                "transition not committed"
            );
        }

        result
    }

    async fn transition(
        &self,
        from: &State,
        target: &State,
        ctx: &Context,
        payload: Payload,
        dispatch_id: Uuid,
    ) -> Result<(), DispatchError> {
        if from.is_unknown() {
            return Err(DispatchError::NotInitialState);
        }

        if from.matches(target) {
            match self.shared.config.self_transition {
                SelfTransitionPolicy::Lookup => {}
                SelfTransitionPolicy::Reject => {
                    return Err(DispatchError::SelfTransition {
                        state: from.clone(),
                    })
                }
                SelfTransitionPolicy::Allow => return Ok(()),
            }
        }

        let chain = self.shared.registry.lookup(from, target).ok_or_else(|| {
            DispatchError::NoRegisteredTransition {
                from: from.clone(),
                to: target.clone(),
            }
        })?;

        if let Some(reason) = ctx.cancel_reason() {
            return Err(DispatchError::cancelled(reason));
        }

        let workspace = self.workspace(from.clone());
        let (chain_ctx, _scope_cancel) = ctx.for_transition(TransitionInfo {
            source: from.clone(),
            destination: target.clone(),
            dispatch_id,
            machine: Arc::new(workspace.clone()),
        });
        let run = ChainRun {
            machine: self.name(),
            from,
            to: target,
            dispatch_id,
            observer: self.shared.observer.as_ref(),
        };

        run_chain(chain, chain_ctx, &payload, &run).await?;

        let next = if workspace.shared.overridden.load(Ordering::SeqCst) {
            workspace.current_state()
        } else {
            target.clone()
        };
        debug!(
            machine = self.name(),
            from = %from,
            to = %next,
            dispatch_id = %dispatch_id,
            "transition committed"
        );
        self.change_state_to(next);
        Ok(())
    }
}

impl fmt::Debug for ConcurrentMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMachine")
            .field("name", &self.name())
            .field("state", &self.current_state())
            .field("workspace", &self.shared.workspace)
            .finish()
    }
}

impl Machine for ConcurrentMachine {
    fn name(&self) -> &str {
        ConcurrentMachine::name(self)
    }

    fn current_state(&self) -> State {
        ConcurrentMachine::current_state(self)
    }

    fn change_state_to(&self, state: State) {
        ConcurrentMachine::change_state_to(self, state);
    }

    fn feedback(&self) -> Feedback {
        ConcurrentMachine::feedback(self)
    }

    fn dispatch(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<(), DispatchError>> {
        let machine = self.clone();
        let ctx = ctx.clone();
        async move { machine.dispatch(&ctx, target, payload).await }.boxed()
    }

    fn dispatch_async(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<DispatchHandle, DispatchError>> {
        let (handle, _cancel) = ConcurrentMachine::dispatch_async(self, ctx, target, payload);
        futures_util::future::ready(Ok(handle)).boxed()
    }
}
