//! Property-based tests for core machine types.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use fsm_dispatch::core::{BoxError, Payload, Registry, State};
use fsm_dispatch::{ConcurrentMachine, Context, SerialMachine};
use proptest::prelude::*;

const NAMES: [&str; 4] = ["close", "open", "locked", "broken"];

async fn noop(ctx: Context, _payload: Payload) -> Result<Context, BoxError> {
    Ok(ctx)
}

/// Registry where every ordered pair of distinct states is allowed.
fn complete_registry() -> Registry {
    let mut registry = Registry::new();
    for from in NAMES {
        for to in NAMES {
            if from != to {
                registry.allow(from, to);
            }
        }
    }
    registry
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn complete_registry_is_valid() {
    assert!(complete_registry().validate().is_success());
}

prop_compose! {
    fn arbitrary_state()(index in 0..NAMES.len()) -> State {
        State::from_static(NAMES[index])
    }
}

proptest! {
    #[test]
    fn state_equality_matches_string_equality(a in "[a-z]{0,3}", b in "[a-z]{0,3}") {
        let left = State::new(a.clone());
        let right = State::new(b.clone());
        prop_assert_eq!(left.matches(&right), a == b);
        prop_assert_eq!(left == right, a == b);
        prop_assert_eq!(left.is_unknown(), a.is_empty());
    }

    #[test]
    fn static_and_owned_states_are_equal(state in arbitrary_state()) {
        let owned = State::new(state.as_str().to_string());
        prop_assert_eq!(&owned, &state);
        prop_assert_eq!(owned.to_string(), state.to_string());
    }

    #[test]
    fn state_roundtrip_serialization(state in arbitrary_state()) {
        let json = serde_json::to_string(&state).unwrap();
        prop_assert_eq!(&json, &format!("\"{}\"", state));
        let deserialized: State = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(state, deserialized);
    }

    #[test]
    fn registry_preserves_insertion_order(
        names in prop::collection::vec("[a-z]{1,8}", 1..12)
    ) {
        let mut registry = Registry::new();
        for name in &names {
            registry.add_named("close", "open", name.clone(), noop);
        }

        let chain = registry.get(&State::from("close"), &State::from("open"));
        let registered: Vec<_> = chain.iter().map(|layer| layer.name().unwrap()).collect();
        prop_assert_eq!(registered, names.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_agrees_with_lookup(from in arbitrary_state(), to in arbitrary_state()) {
        let registry = complete_registry();

        let looked_up = registry.lookup(&from, &to);
        prop_assert_eq!(looked_up.is_some(), from != to);
        prop_assert_eq!(looked_up.is_some(), registry.contains(&from, &to));
        prop_assert!(registry.get(&from, &to).is_empty());
    }

    #[test]
    fn serial_machine_ends_in_last_committed_state(
        targets in prop::collection::vec(arbitrary_state(), 1..16)
    ) {
        let (final_state, depth, expected) = runtime().block_on(async {
            let machine = SerialMachine::new(complete_registry(), "close");
            let ctx = Context::background();
            let mut expected = State::from("close");

            for target in &targets {
                let result = machine.dispatch(&ctx, target.clone(), Payload::none()).await;
                // Self transitions are unregistered; every other pair commits.
                prop_assert_eq!(result.is_ok(), *target != expected);
                if result.is_ok() {
                    expected = target.clone();
                }
            }

            let state = machine.current_state();
            let depth = machine.queue_depth();
            machine.stop().await;
            Ok((state, depth, expected))
        })?;

        prop_assert_eq!(final_state, expected);
        prop_assert_eq!(depth, 0);
    }

    #[test]
    fn concurrent_machine_ends_in_last_committed_state(
        targets in prop::collection::vec(arbitrary_state(), 1..16)
    ) {
        let (final_state, expected) = runtime().block_on(async {
            let machine = ConcurrentMachine::new(complete_registry(), "close");
            let ctx = Context::background();
            let mut expected = State::from("close");

            for target in &targets {
                if machine.dispatch(&ctx, target.clone(), Payload::none()).await.is_ok() {
                    expected = target.clone();
                }
            }

            (machine.current_state(), expected)
        });

        prop_assert_eq!(final_state, expected);
    }
}
