//! Sub-state mechanics: handler inheritance across the scope chain, name
//! resolution failures, `is_in_state` / `on_state` parent matching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use moore_fsm::{Emitter, EventEmitter, Fsm, FsmBuilder, FsmError, StateHandle, STATE_CHANGED};
use tokio::time::sleep;

fn noop(_fsm: &Fsm, _handle: &StateHandle) {}

#[tokio::test]
async fn parent_handlers_survive_substate_hops() {
    let trigger: EventEmitter<()> = EventEmitter::new();

    let emitter = trigger.clone();
    let fsm = FsmBuilder::new()
        .state("initial", move |_fsm: &Fsm, handle: &StateHandle| {
            handle.on(&emitter, "foo", |_: &()| {});
            handle.on(&emitter, "bar", |_: &()| {});
        })
        .substate("initial", "sub1", noop)
        .substate("initial", "sub2", noop)
        .state("next", noop)
        .start("initial")
        .unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    fsm.events().on(STATE_CHANGED, move |state: &String| {
        log.lock().unwrap().push(state.clone());
    });

    let hops = [
        "initial.sub1",
        "initial.sub2",
        "initial.sub1",
        "initial.sub2",
        "initial.sub1",
    ];
    for hop in hops {
        fsm.goto_state(hop).unwrap();
        // Sibling and parent/child moves keep the parent's scope alive.
        assert_eq!(trigger.listener_count("foo"), 1);
        assert_eq!(trigger.listener_count("bar"), 1);
        assert!(fsm.is_in_state("initial"));
        assert!(fsm.is_in_state(hop));
    }

    // Leaving the root finally unwinds the whole chain.
    fsm.goto_state("next").unwrap();
    assert_eq!(trigger.listener_count("foo"), 0);
    assert_eq!(trigger.listener_count("bar"), 0);
    assert!(!fsm.is_in_state("initial"));

    sleep(Duration::from_millis(5)).await;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "initial",
            "initial.sub1",
            "initial.sub2",
            "initial.sub1",
            "initial.sub2",
            "initial.sub1",
            "next",
        ]
    );
}

#[tokio::test]
async fn substate_match_requires_a_dot_boundary() {
    let fsm = FsmBuilder::new()
        .state("init", noop)
        .state("initial", noop)
        .start("initial")
        .unwrap();

    assert!(fsm.is_in_state("initial"));
    // "init" is a prefix of "initial" but not its parent.
    assert!(!fsm.is_in_state("init"));
}

#[tokio::test]
async fn malformed_and_unknown_names_leave_the_machine_in_place() {
    let fsm = FsmBuilder::new()
        .state("initial", noop)
        .substate("initial", "sub1", noop)
        .start("initial")
        .unwrap();

    let err = fsm.goto_state("initial.foo.bar").unwrap_err();
    assert!(
        matches!(err, FsmError::UnknownSubState { ref state } if state == "initial.foo.bar"),
        "unexpected error: {err}"
    );
    assert_eq!(fsm.state().as_deref(), Some("initial"));

    let err = fsm.goto_state("initial.nope").unwrap_err();
    assert!(matches!(err, FsmError::UnknownSubState { ref state } if state == "initial.nope"));

    let err = fsm.goto_state("nope").unwrap_err();
    assert!(matches!(err, FsmError::UnknownState { ref state } if state == "nope"));

    assert_eq!(fsm.state().as_deref(), Some("initial"));
    assert_eq!(fsm.history(), ["initial"]);
}

#[tokio::test]
async fn on_state_fires_for_the_state_or_any_substate() {
    let fsm = FsmBuilder::new()
        .state("initial", noop)
        .state("work", noop)
        .substate("work", "busy", noop)
        .start("initial")
        .unwrap();

    // Already satisfied: runs synchronously.
    let immediate = Arc::new(AtomicBool::new(false));
    let flag = immediate.clone();
    fsm.on_state("initial", move || flag.store(true, Ordering::SeqCst));
    assert!(immediate.load(Ordering::SeqCst));

    // Armed: fires on the first matching change, here via a sub-state.
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    fsm.on_state("work", move || flag.store(true, Ordering::SeqCst));

    fsm.goto_state("work.busy").unwrap();
    assert!(!fired.load(Ordering::SeqCst));
    sleep(Duration::from_millis(5)).await;
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn on_state_rearms_past_non_matching_changes() {
    let fsm = FsmBuilder::new()
        .state("a", noop)
        .state("b", noop)
        .state("c", noop)
        .start("a")
        .unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    fsm.on_state("c", move || flag.store(true, Ordering::SeqCst));

    fsm.goto_state("b").unwrap();
    sleep(Duration::from_millis(5)).await;
    assert!(!fired.load(Ordering::SeqCst));

    fsm.goto_state("c").unwrap();
    sleep(Duration::from_millis(5)).await;
    assert!(fired.load(Ordering::SeqCst));
}
