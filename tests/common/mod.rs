//! Door fixtures shared by the integration tests.

#![allow(dead_code)]

use fsm_dispatch::{states, BoxError, Context, EntityState, Payload, State};
use std::sync::{Arc, Mutex};
use std::time::Duration;

states! {
    pub OPEN = "open";
    pub CLOSE = "close";
    pub TOKTOK = "toktok";
    pub NOT_EXISTS = "not_exists";
}

pub const IDENTITY: &str = "identity";

/// Domain object whose state the machine commits into.
pub struct Door {
    pub id: i64,
    state: Mutex<State>,
}

impl Door {
    pub fn new(id: i64, state: State) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(state),
        })
    }
}

impl EntityState for Door {
    fn state(&self) -> State {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, state: State) {
        self.state.lock().unwrap().set(state);
    }
}

pub fn as_user(name: &str) -> Context {
    Context::background().with_value(IDENTITY, name.to_string())
}

pub async fn if_anonymous_then_bob(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    if ctx.value::<String>(IDENTITY).is_some() {
        return Ok(ctx);
    }
    Ok(ctx.with_value(IDENTITY, "bob".to_string()))
}

pub async fn only_bob(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    match ctx.value::<String>(IDENTITY) {
        Some(name) if name == "bob" => Ok(ctx),
        _ => Err("access denied".into()),
    }
}

pub async fn abort_open(_ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    Err("abort open door".into())
}

pub async fn failed_procedure(_ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    Err("failed procedure".into())
}

pub async fn explode(_ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    panic!("door.Panic")
}

pub async fn empty(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    Ok(ctx)
}

pub async fn sleep_ten_minutes(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    tokio::time::sleep(Duration::from_secs(600)).await;
    Ok(ctx)
}

pub async fn send_foo(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    if let Some(machine) = ctx.machine() {
        machine.feedback().send("foo");
    }
    Ok(ctx)
}

pub async fn force_close(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    if let Some(machine) = ctx.machine() {
        machine.change_state_to(CLOSE);
    }
    Ok(ctx)
}

/// Knocks, then opens the door through a nested dispatch.
pub async fn tok_tok(ctx: Context, payload: Payload) -> Result<Context, BoxError> {
    if let Some(machine) = ctx.machine() {
        machine.dispatch(&ctx, OPEN, payload).await?;
    }
    Ok(ctx)
}

/// Sleeps past a short deadline, then tries to redirect the door.
pub async fn late_knock(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Some(machine) = ctx.machine() {
        machine.change_state_to(TOKTOK);
    }
    Ok(ctx)
}
