//! Serialized dispatch: one worker task drains a bounded queue of requests.

use super::error::{DispatchError, Outcome};
use super::executor::{run_chain, ChainRun};
use super::{AsyncDispatch, DispatchHandle, Machine};
use crate::builder::{MachineConfig, ReentrancyPolicy, SelfTransitionPolicy};
use crate::context::{Context, TransitionInfo};
use crate::core::{EntityRef, EntityState, Payload, Registry, State, StateCell};
use crate::feedback::Feedback;
use crate::observe::{DispatchEvent, ObserverRef, TracingObserver};
use crate::snapshot::{MachineSnapshot, Strategy};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

struct DispatchMessage {
    ctx: Context,
    target: State,
    payload: Payload,
    dispatch_id: Uuid,
    done: oneshot::Sender<Result<(), DispatchError>>,
}

struct Core {
    config: MachineConfig,
    registry: Arc<Registry>,
    observer: ObserverRef,
    feedback: Feedback,
    entity: EntityRef,
    queue: RwLock<Option<mpsc::Sender<DispatchMessage>>>,
    added: AtomicU64,
    processed: AtomicU64,
}

impl Core {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn current_state(&self) -> State {
        self.entity.state()
    }

    fn set_state(&self, state: State) {
        self.entity.set_state(state);
    }

    fn sender(&self) -> Option<mpsc::Sender<DispatchMessage>> {
        self.queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the machine's sender. Returns `false` if it was already gone.
    fn close_queue(&self) -> bool {
        self.queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    fn queue_depth(&self) -> u64 {
        let processed = self.processed.load(Ordering::SeqCst);
        let added = self.added.load(Ordering::SeqCst);
        added.saturating_sub(processed)
    }
}

/// Put a request on the queue, waiting for a free slot.
///
/// Failures to enqueue are reported through the returned handle.
async fn enqueue(core: &Core, ctx: &Context, target: State, payload: Payload) -> AsyncDispatch {
    let (ctx, cancel) = ctx.with_cancel();
    let dispatch_id = Uuid::new_v4();
    let (done, handle) = DispatchHandle::new(dispatch_id);

    let Some(queue) = core.sender() else {
        let _ = done.send(Err(DispatchError::Stopped));
        return (handle, cancel);
    };

    let permit = tokio::select! {
        biased;
        permit = queue.reserve() => permit,
        reason = ctx.cancelled() => {
            let _ = done.send(Err(DispatchError::cancelled(reason)));
            return (handle, cancel);
        }
    };

    match permit {
        Ok(permit) => {
            core.added.fetch_add(1, Ordering::SeqCst);
            permit.send(DispatchMessage {
                ctx,
                target,
                payload,
                dispatch_id,
                done,
            });
        }
        Err(_) => {
            let _ = done.send(Err(DispatchError::Stopped));
        }
    }
    (handle, cancel)
}

async fn run_worker(core: Arc<Core>, mut queue: mpsc::Receiver<DispatchMessage>) {
    debug!(machine = core.name(), "dispatch worker started");

    while let Some(msg) = queue.recv().await {
        core.processed.fetch_add(1, Ordering::SeqCst);
        let DispatchMessage {
            ctx,
            target,
            payload,
            dispatch_id,
            done,
        } = msg;

        let result = process(&core, ctx, target, payload, dispatch_id).await;
        // The requester may have stopped waiting.
        let _ = done.send(result);
    }

    debug!(machine = core.name(), "dispatch worker stopped");
}

async fn process(
    core: &Arc<Core>,
    ctx: Context,
    target: State,
    payload: Payload,
    dispatch_id: Uuid,
) -> Result<(), DispatchError> {
    let started = Instant::now();
    let from = core.current_state();

    let result = transition(core, &from, &target, ctx, payload, dispatch_id).await;

    let outcome = match &result {
        Ok(()) => Outcome::Committed,
        Err(err) => err.outcome(),
    };
    core.observer.on_dispatch(&DispatchEvent {
        machine: core.name(),
        from: &from,
        to: &target,
        dispatch_id,
        elapsed: started.elapsed(),
        outcome,
    });
    match &result {
        Ok(()) => debug!(
            machine = core.name(),
            from = %from,
            to = %target,
            dispatch_id = %dispatch_id,
            "transition committed"
        ),
        Err(err) => debug!(
            machine = core.name(),
            from = %from,
            to = %target,
            dispatch_id = %dispatch_id,
            outcome = %outcome,
            error = %err,
            "transition not committed"
        ),
    }

    result
}

async fn transition(
    core: &Arc<Core>,
    from: &State,
    target: &State,
    ctx: Context,
    payload: Payload,
    dispatch_id: Uuid,
) -> Result<(), DispatchError> {
    if from.is_unknown() {
        return Err(DispatchError::NotInitialState);
    }

    if from.matches(target) {
        match core.config.self_transition {
            SelfTransitionPolicy::Lookup => {}
            SelfTransitionPolicy::Reject => {
                return Err(DispatchError::SelfTransition {
                    state: from.clone(),
                })
            }
            SelfTransitionPolicy::Allow => return Ok(()),
        }
    }

    let chain = core.registry.lookup(from, target).ok_or_else(|| {
        DispatchError::NoRegisteredTransition {
            from: from.clone(),
            to: target.clone(),
        }
    })?;

    if let Some(reason) = ctx.cancel_reason() {
        return Err(DispatchError::cancelled(reason));
    }

    let scope = Arc::new(Scope {
        core: Arc::clone(core),
        state: Mutex::new(ScopeState::default()),
    });
    let (ctx, _scope_cancel) = ctx.for_transition(TransitionInfo {
        source: from.clone(),
        destination: target.clone(),
        dispatch_id,
        machine: scope.clone(),
    });
    let run = ChainRun {
        machine: core.name(),
        from,
        to: target,
        dispatch_id,
        observer: core.observer.as_ref(),
    };

    let result = run_chain(chain, ctx, &payload, &run).await;
    let overridden = scope.finish(result.is_ok());
    result?;

    core.set_state(overridden.unwrap_or_else(|| target.clone()));
    Ok(())
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Running,
    Committed,
    Aborted,
}

#[derive(Default)]
struct ScopeState {
    phase: Phase,
    overridden: Option<State>,
}

/// Machine handle given to the actions of one serial transition.
///
/// While the chain runs, `change_state_to` redirects what the transition
/// commits and nested dispatches follow the [`ReentrancyPolicy`]. Once the
/// transition has committed the handle acts on the machine directly. After
/// an aborted transition, actions still running in the background can no
/// longer change the state through it.
struct Scope {
    core: Arc<Core>,
    state: Mutex<ScopeState>,
}

impl Scope {
    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// End the transition, returning the override to commit.
    fn finish(&self, committed: bool) -> Option<State> {
        let mut state = self.lock();
        state.phase = if committed {
            Phase::Committed
        } else {
            Phase::Aborted
        };
        state.overridden.take()
    }

    fn reentrant(&self, target: &State) -> Option<DispatchError> {
        if self.core.config.reentrancy != ReentrancyPolicy::Reject
            || self.lock().phase != Phase::Running
        {
            return None;
        }
        Some(DispatchError::Reentrant {
            from: self.current_state(),
            to: target.clone(),
        })
    }
}

impl Machine for Scope {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn current_state(&self) -> State {
        let state = self.lock();
        match &state.overridden {
            Some(overridden) if state.phase == Phase::Running => overridden.clone(),
            _ => self.core.current_state(),
        }
    }

    fn change_state_to(&self, target: State) {
        let mut state = self.lock();
        match state.phase {
            Phase::Running => state.overridden = Some(target),
            Phase::Committed => self.core.set_state(target),
            Phase::Aborted => debug!(
                machine = self.core.name(),
                to = %target,
                "state change from aborted transition ignored"
            ),
        }
    }

    fn feedback(&self) -> Feedback {
        self.core.feedback.clone()
    }

    fn dispatch(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<(), DispatchError>> {
        let rejected = self.reentrant(&target);
        let core = Arc::clone(&self.core);
        let ctx = ctx.clone();
        async move {
            if let Some(err) = rejected {
                return Err(err);
            }
            let (handle, _cancel) = enqueue(&core, &ctx, target, payload).await;
            // Awaiting a queued request from inside a chain would wait on
            // the worker that runs this chain; the context bounds the wait.
            tokio::select! {
                biased;
                result = handle => result,
                reason = ctx.cancelled() => Err(DispatchError::cancelled(reason)),
            }
        }
        .boxed()
    }

    fn dispatch_async(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<DispatchHandle, DispatchError>> {
        let rejected = self.reentrant(&target);
        let core = Arc::clone(&self.core);
        let ctx = ctx.clone();
        async move {
            if let Some(err) = rejected {
                return Err(err);
            }
            let (handle, _cancel) = enqueue(&core, &ctx, target, payload).await;
            Ok(handle)
        }
        .boxed()
    }
}

/// Machine whose transitions run one at a time on a dedicated worker task.
///
/// Requests are queued in arrival order on a bounded channel; callers wait
/// for a free slot when it is full. The worker commits each transition
/// before it picks up the next request, so every chain observes the state
/// left by the previous one.
///
/// Must be created inside a tokio runtime.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::{states, Context, Payload, Registry, SerialMachine};
///
/// states! {
///     OPEN = "open";
///     CLOSE = "close";
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut registry = Registry::new();
/// registry.allow(CLOSE, OPEN).allow(OPEN, CLOSE);
///
/// let machine = SerialMachine::new(registry, CLOSE);
/// machine.dispatch(&Context::background(), OPEN, Payload::none()).await.unwrap();
/// assert_eq!(machine.current_state(), OPEN);
/// machine.stop().await;
/// # }
/// ```
pub struct SerialMachine {
    core: Arc<Core>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialMachine {
    /// Machine with the default configuration and the tracing observer.
    pub fn new(registry: impl Into<Arc<Registry>>, initial: impl Into<State>) -> Self {
        Self::with_entity(registry, Arc::new(StateCell::new(initial)))
    }

    /// Machine that reads and commits the state of `entity`.
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
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let core = Arc::new(Core {
            config,
            registry,
            observer,
            feedback: Feedback::new(),
            entity,
            queue: RwLock::new(Some(queue)),
            added: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&core), rx));

        Self {
            core,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Name from the machine's configuration.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// State last committed or set.
    pub fn current_state(&self) -> State {
        self.core.current_state()
    }

    /// Overwrite the state without running any action.
    ///
    /// Not ordered with queued requests: a transition already running will
    /// still commit its own destination.
    pub fn change_state_to(&self, state: impl Into<State>) {
        self.core.set_state(state.into());
    }

    /// Requests accepted but not yet picked up by the worker.
    pub fn queue_depth(&self) -> u64 {
        self.core.queue_depth()
    }

    /// Feedback channel shared by every transition of this machine.
    pub fn feedback(&self) -> Feedback {
        self.core.feedback.clone()
    }

    /// Point-in-time view of the machine, including its queue depth.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot::new(
            self.name(),
            Strategy::Serial,
            self.current_state(),
            Some(self.queue_depth()),
        )
    }

    /// Request a transition to `target` and wait for its result.
    pub async fn dispatch(
        &self,
        ctx: &Context,
        target: impl Into<State>,
        payload: Payload,
    ) -> Result<(), DispatchError> {
        let (handle, _cancel) = enqueue(&self.core, ctx, target.into(), payload).await;
        handle.await
    }

    /// Queue a transition to `target` without waiting for its result.
    ///
    /// Resolves once the request is queued. The returned [`CancelHandle`]
    /// cancels the request's context, whether it is still queued or
    /// already running.
    ///
    /// [`CancelHandle`]: crate::CancelHandle
    pub async fn dispatch_async(
        &self,
        ctx: &Context,
        target: impl Into<State>,
        payload: Payload,
    ) -> AsyncDispatch {
        enqueue(&self.core, ctx, target.into(), payload).await
    }

    /// Close the queue and wait for the worker to drain it.
    ///
    /// Requests queued before the call still run. Later requests fail with
    /// [`DispatchError::Stopped`].
    pub async fn stop(&self) {
        self.core.close_queue();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(machine = self.name(), error = %err, "dispatch worker ended abnormally");
            }
        }
    }

    /// Whether the queue is closed to new requests.
    pub fn is_stopped(&self) -> bool {
        self.core.sender().is_none()
    }
}

impl Drop for SerialMachine {
    fn drop(&mut self) {
        if self.core.close_queue() {
            debug!(machine = self.name(), "machine dropped without stop");
        }
    }
}

impl fmt::Debug for SerialMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialMachine")
            .field("name", &self.name())
            .field("state", &self.current_state())
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

impl Machine for SerialMachine {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn current_state(&self) -> State {
        self.core.current_state()
    }

    fn change_state_to(&self, state: State) {
        self.core.set_state(state);
    }

    fn feedback(&self) -> Feedback {
        self.core.feedback.clone()
    }

    fn dispatch(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<(), DispatchError>> {
        let core = Arc::clone(&self.core);
        let ctx = ctx.clone();
        async move {
            let (handle, _cancel) = enqueue(&core, &ctx, target, payload).await;
            handle.await
        }
        .boxed()
    }

    fn dispatch_async(
        &self,
        ctx: &Context,
        target: State,
        payload: Payload,
    ) -> BoxFuture<'static, Result<DispatchHandle, DispatchError>> {
        let core = Arc::clone(&self.core);
        let ctx = ctx.clone();
        async move { Ok(enqueue(&core, &ctx, target, payload).await.0) }.boxed()
    }
}
