//! Door State Machine
//!
//! This example demonstrates guarded transitions on both dispatch strategies.
//!
//! Key concepts:
//! - Action chains registered per (source, destination)
//! - Context values read by actions
//! - Feedback sent from an action to a listener
//! - Nested dispatch from inside a running transition
//!
//! Run with: RUST_LOG=debug cargo run --example door

use fsm_dispatch::builder::{MachineBuilder, SelfTransitionPolicy};
use fsm_dispatch::{states, BoxError, Context, Payload, Registry};
use std::time::Duration;

states! {
    OPEN = "open";
    CLOSE = "close";
    KNOCK = "knock";
}

async fn only_bob(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    match ctx.value::<String>("identity") {
        Some(name) if name == "bob" => Ok(ctx),
        _ => Err("access denied".into()),
    }
}

async fn greet(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    if let Some(machine) = ctx.machine() {
        machine.feedback().send("welcome home".to_string());
    }
    Ok(ctx)
}

async fn knock(ctx: Context, payload: Payload) -> Result<Context, BoxError> {
    if let Some(machine) = ctx.machine() {
        machine.dispatch(&ctx, OPEN, payload).await?;
    }
    Ok(ctx)
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .add_named(CLOSE, OPEN, "only_bob", only_bob)
        .add_named(CLOSE, OPEN, "greet", greet)
        .add_named(CLOSE, KNOCK, "knock", knock)
        .allow(OPEN, CLOSE);
    registry
}

fn user(name: &str) -> Context {
    Context::background().with_value("identity", name.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    println!("=== Door State Machine ===\n");

    let door = MachineBuilder::new()
        .name("front-door")
        .registry(registry())
        .initial(CLOSE)
        .build_serial()?;

    println!("Serial door starts {}", door.current_state());

    match door.dispatch(&user("alice"), OPEN, Payload::none()).await {
        Ok(()) => println!("  alice opened the door"),
        Err(err) => println!("  alice: {err}"),
    }

    let feedback = door.feedback();
    let listener = tokio::spawn(async move {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(1));
        feedback.wait_string(&ctx).await
    });
    tokio::task::yield_now().await;

    door.dispatch(&user("bob"), OPEN, Payload::none()).await?;
    println!("  bob opened the door");
    if let Ok(Some(message)) = listener.await {
        println!("  the door says: {message}");
    }

    println!("\nSnapshot:\n{}", door.snapshot().to_json()?);
    door.stop().await;

    println!("\nConcurrent door with nested dispatch:");
    let door = MachineBuilder::new()
        .name("back-door")
        .registry(registry())
        .initial(CLOSE)
        .self_transition(SelfTransitionPolicy::Allow)
        .build_concurrent()?;

    door.dispatch(&user("bob"), KNOCK, Payload::none()).await?;
    println!("  bob knocked; door is now {}", door.current_state());

    door.dispatch(&user("bob"), OPEN, Payload::none()).await?;
    println!("  reopening an open door is allowed: {}", door.current_state());

    println!("\n=== Example Complete ===");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
