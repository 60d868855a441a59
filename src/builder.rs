//! Fluent builder composing the state table.
//!
//! The machine's behavior is a two-level naming tree: root state name to
//! entry function, plus an optional inner level of sub-state leaf names.
//! The builder collects that tree, the required all-state events, and then
//! [`start`](FsmBuilder::start) validates everything and performs the
//! initial transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{FsmError, FsmResult};
use crate::events::EventEmitter;
use crate::handle::StateHandle;
use crate::handlers::EntryFn;
use crate::machine::{Core, Fsm, FsmShared, StateSlot};

/// Builder for [`Fsm`] instances.
pub struct FsmBuilder {
    states: Vec<(String, EntryFn)>,
    substates: Vec<(String, String, EntryFn)>,
    all_state_events: Vec<String>,
}

impl Default for FsmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FsmBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            substates: Vec::new(),
            all_state_events: Vec::new(),
        }
    }

    /// Declare a root state and its entry function.
    pub fn state<F>(mut self, name: impl Into<String>, enter: F) -> Self
    where
        F: Fn(&Fsm, &StateHandle) + Send + Sync + 'static,
    {
        self.states.push((name.into(), Arc::new(enter)));
        self
    }

    /// Declare a sub-state of `parent`, addressed as `"parent.leaf"`.
    ///
    /// Order relative to [`state`](FsmBuilder::state) does not matter; the
    /// parent only has to exist by the time [`start`](FsmBuilder::start)
    /// runs.
    pub fn substate<F>(
        mut self,
        parent: impl Into<String>,
        leaf: impl Into<String>,
        enter: F,
    ) -> Self
    where
        F: Fn(&Fsm, &StateHandle) + Send + Sync + 'static,
    {
        self.substates
            .push((parent.into(), leaf.into(), Arc::new(enter)));
        self
    }

    /// Require every state to register a listener for `event` on the
    /// machine; enforced immediately after each entry function runs.
    pub fn all_state_event(mut self, event: impl Into<String>) -> Self {
        self.all_state_events.push(event.into());
        self
    }

    /// Validate the table, build the machine, and enter `initial`.
    ///
    /// Fails on malformed or duplicate names, on a sub-state whose parent
    /// was never declared, and on anything the initial transition itself
    /// rejects (unknown initial state, a missing all-state-event listener,
    /// ...). Must be called from within a tokio runtime.
    pub fn start(self, initial: &str) -> FsmResult<Fsm> {
        let mut states: HashMap<String, StateSlot> = HashMap::new();
        for (name, enter) in self.states {
            if name.is_empty() || name.contains('.') {
                return Err(FsmError::InvalidStateName { name });
            }
            if states.contains_key(&name) {
                return Err(FsmError::DuplicateState { name });
            }
            states.insert(
                name,
                StateSlot {
                    enter,
                    substates: HashMap::new(),
                },
            );
        }
        for (parent, leaf, enter) in self.substates {
            let full = format!("{parent}.{leaf}");
            if leaf.is_empty() || leaf.contains('.') {
                return Err(FsmError::InvalidStateName { name: full });
            }
            let slot = states.get_mut(&parent).ok_or_else(|| FsmError::InvalidStateName {
                name: full.clone(),
            })?;
            if slot.substates.contains_key(&leaf) {
                return Err(FsmError::DuplicateState { name: full });
            }
            slot.substates.insert(leaf, enter);
        }

        let shared = Arc::new(FsmShared {
            states,
            events: EventEmitter::new(),
            core: Mutex::new(Core::empty(self.all_state_events)),
        });
        let fsm = Fsm::from_shared(shared);
        fsm.transition(initial)?;
        Ok(fsm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_fsm: &Fsm, _handle: &StateHandle) {}

    #[test]
    fn rejects_dotted_root_name() {
        let err = FsmBuilder::new().state("a.b", noop).start("a.b");
        assert!(matches!(err, Err(FsmError::InvalidStateName { name }) if name == "a.b"));
    }

    #[test]
    fn rejects_empty_root_name() {
        let err = FsmBuilder::new().state("", noop).start("");
        assert!(matches!(err, Err(FsmError::InvalidStateName { name }) if name.is_empty()));
    }

    #[test]
    fn rejects_substate_without_parent() {
        let err = FsmBuilder::new()
            .state("idle", noop)
            .substate("missing", "leaf", noop)
            .start("idle");
        assert!(matches!(err, Err(FsmError::InvalidStateName { name }) if name == "missing.leaf"));
    }

    #[test]
    fn rejects_duplicate_states() {
        let err = FsmBuilder::new()
            .state("idle", noop)
            .state("idle", noop)
            .start("idle");
        assert!(matches!(err, Err(FsmError::DuplicateState { name }) if name == "idle"));

        let err = FsmBuilder::new()
            .state("idle", noop)
            .substate("idle", "a", noop)
            .substate("idle", "a", noop)
            .start("idle");
        assert!(matches!(err, Err(FsmError::DuplicateState { name }) if name == "idle.a"));
    }

    #[test]
    fn rejects_unknown_initial_state() {
        let err = FsmBuilder::new().state("idle", noop).start("nope");
        assert!(matches!(err, Err(FsmError::UnknownState { state }) if state == "nope"));
    }

    #[tokio::test]
    async fn starts_in_the_initial_state() {
        let fsm = FsmBuilder::new()
            .state("idle", noop)
            .start("idle")
            .unwrap();
        assert_eq!(fsm.state().as_deref(), Some("idle"));
        assert_eq!(fsm.history(), vec!["idle"]);
    }
}
