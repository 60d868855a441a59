//! Transition guardrails: `valid_transitions` allow-lists, all-state-event
//! enforcement, and the one-pending-transition assertion.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use moore_fsm::{Emitter, Fsm, FsmBuilder, FsmError, StateHandle, STATE_CHANGED};
use tokio::time::sleep;

fn noop(_fsm: &Fsm, _handle: &StateHandle) {}

#[tokio::test]
async fn valid_transitions_reject_off_list_targets() {
    let grabbed: Arc<Mutex<Option<StateHandle>>> = Arc::new(Mutex::new(None));

    let slot = grabbed.clone();
    let fsm = FsmBuilder::new()
        .state("initial", move |_fsm: &Fsm, handle: &StateHandle| {
            handle.valid_transitions(["next"]);
            *slot.lock().unwrap() = Some(handle.clone());
        })
        .state("next", noop)
        .state("next2", noop)
        .start("initial")
        .unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    fsm.events().on(STATE_CHANGED, move |state: &String| {
        log.lock().unwrap().push(state.clone());
    });

    let handle = grabbed.lock().unwrap().take().unwrap();
    let err = handle.goto_state("next2").unwrap_err();
    match err {
        FsmError::InvalidTransition { ref from, ref to } => {
            assert_eq!(from, "initial");
            assert_eq!(to, "next2");
            assert_eq!(err.to_string(), "Invalid FSM transition: initial => next2");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    // Rejected before anything was committed: state, history, and the
    // emission stream are untouched, and the handle is still usable.
    assert_eq!(fsm.state().as_deref(), Some("initial"));
    assert_eq!(fsm.history(), ["initial"]);
    sleep(Duration::from_millis(5)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["initial"]);

    handle.goto_state("next").unwrap();
    assert_eq!(fsm.state().as_deref(), Some("next"));
}

#[tokio::test]
async fn every_state_must_register_required_events() {
    let fsm = FsmBuilder::new()
        .all_state_event("report")
        .state("good", |fsm: &Fsm, handle: &StateHandle| {
            handle.on(&fsm.events(), "report", |_: &String| {});
        })
        .state("bad", noop)
        .start("good")
        .unwrap();

    let err = fsm.goto_state("bad").unwrap_err();
    match err {
        FsmError::AllStateEventMissing { ref state, ref event } => {
            assert_eq!(state, "bad");
            assert_eq!(event, "report");
        }
        other => panic!("expected AllStateEventMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_required_event_fails_construction_too() {
    let err = FsmBuilder::new()
        .all_state_event("report")
        .state("initial", noop)
        .start("initial")
        .unwrap_err();

    assert!(matches!(
        err,
        FsmError::AllStateEventMissing { ref state, ref event }
            if state == "initial" && event == "report"
    ));
}

#[tokio::test]
#[should_panic(expected = "already pending")]
async fn a_state_may_queue_only_one_onward_transition() {
    // The escape hatch bypasses handle invalidation, so a second inline
    // request trips the pending-transition assertion instead.
    let _ = FsmBuilder::new()
        .state("initial", |fsm: &Fsm, _handle: &StateHandle| {
            fsm.goto_state("a").expect("first queued transition");
            let _ = fsm.goto_state("b");
        })
        .state("a", noop)
        .state("b", noop)
        .start("initial");
}
