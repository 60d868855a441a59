//! The Moore machine core.
//!
//! Holds the current state, the bounded history ring, the re-entrancy
//! guard, sub-state boundary logic, all-state-event enforcement, and the
//! deferred `stateChanged` emission. Entry functions run exactly once, on
//! entry; everything else in the machine exists to decide when the next
//! entry function runs and to clean up after the previous one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{FsmError, FsmResult};
use crate::events::{Emitter, EventEmitter, ListenerId};
use crate::handle::StateHandle;
use crate::handlers::EntryFn;

/// Event emitted after every committed transition, including initial entry.
/// Delivery is asynchronous, on a later scheduler turn, batched in
/// transition order; observers never see an intermediate state of a
/// synchronous transition chain. The payload is the full state name.
pub const STATE_CHANGED: &str = "stateChanged";

/// Most recent entries retained by [`Fsm::history`].
const HISTORY_CAPACITY: usize = 7;

pub(crate) struct StateSlot {
    pub(crate) enter: EntryFn,
    pub(crate) substates: HashMap<String, EntryFn>,
}

pub(crate) struct FsmShared {
    pub(crate) states: HashMap<String, StateSlot>,
    pub(crate) events: EventEmitter<String>,
    pub(crate) core: Mutex<Core>,
}

pub(crate) struct Core {
    pub(crate) state: Option<String>,
    pub(crate) handle: Option<StateHandle>,
    pub(crate) history: VecDeque<String>,
    pub(crate) in_transition: bool,
    pub(crate) next_state: Option<String>,
    pub(crate) to_emit: Vec<String>,
    pub(crate) all_state_events: Vec<String>,
}

impl Core {
    pub(crate) fn empty(all_state_events: Vec<String>) -> Self {
        Self {
            state: None,
            handle: None,
            history: VecDeque::new(),
            in_transition: false,
            next_state: None,
            to_emit: Vec::new(),
            all_state_events,
        }
    }
}

/// A Moore finite state machine.
///
/// Built with [`FsmBuilder`](crate::FsmBuilder), which also performs the
/// initial transition. `Fsm` is a cheap handle; clones drive the same
/// machine. The machine is itself an [`Emitter<String>`], which is how
/// machines observe each other's `stateChanged` and how states satisfy
/// all-state-event requirements.
#[derive(Clone)]
pub struct Fsm {
    shared: Arc<FsmShared>,
}

impl std::fmt::Debug for Fsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm").finish_non_exhaustive()
    }
}

/// Clears the re-entrancy flag even if the entry function unwinds, so a
/// panicking state cannot wedge the guard.
struct EntryGuard<'a> {
    shared: &'a FsmShared,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut core) = self.shared.core.lock() {
            core.in_transition = false;
        }
    }
}

impl Fsm {
    pub(crate) fn from_shared(shared: Arc<FsmShared>) -> Self {
        Self { shared }
    }

    /// Full current state name, or `None` before initial entry completes.
    pub fn state(&self) -> Option<String> {
        self.lock_core().state.clone()
    }

    /// True iff the machine is in `state` or in any sub-state of it.
    pub fn is_in_state(&self, state: &str) -> bool {
        match &self.lock_core().state {
            Some(current) => state_matches(current, state),
            None => false,
        }
    }

    /// The last entered full state names, oldest first, at most seven.
    pub fn history(&self) -> Vec<String> {
        self.lock_core().history.iter().cloned().collect()
    }

    /// The machine's own event emitter.
    pub fn events(&self) -> EventEmitter<String> {
        self.shared.events.clone()
    }

    /// Require every state entered from now on to register a listener for
    /// `event`; enforced immediately after each entry function runs.
    pub fn all_state_event(&self, event: &str) {
        self.lock_core().all_state_events.push(event.to_string());
    }

    /// Invoke `cb` once the machine is in `state` (or a sub-state of it):
    /// synchronously if it already is, otherwise on the first matching
    /// `stateChanged`. Non-matching changes re-arm the subscription.
    pub fn on_state<F>(&self, state: &str, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_in_state(state) {
            cb();
            return;
        }
        let wanted = state.to_string();
        let machine = Arc::downgrade(&self.shared);
        let pending = Arc::new(Mutex::new(Some(cb)));
        let registration: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let registration_inner = Arc::clone(&registration);
        let id = self.shared.events.on(STATE_CHANGED, move |entered: &String| {
            if !state_matches(entered, &wanted) {
                return;
            }
            if let Some(cb) = pending.lock().expect("fsm onState lock poisoned").take() {
                cb();
            }
            let id = registration_inner
                .lock()
                .expect("fsm onState lock poisoned")
                .take();
            if let (Some(id), Some(shared)) = (id, machine.upgrade()) {
                shared.events.remove_listener(STATE_CHANGED, id);
            }
        });
        *registration.lock().expect("fsm onState lock poisoned") = Some(id);
    }

    /// Transition escape hatch.
    ///
    /// The sanctioned path is [`StateHandle::goto_state`], which also
    /// invalidates the handle; this bypasses handle bookkeeping entirely
    /// and is meant for driving a machine from outside its own states.
    pub fn goto_state(&self, target: &str) -> FsmResult<()> {
        self.transition(target)
    }

    pub(crate) fn transition(&self, target: &str) -> FsmResult<()> {
        let previous: Option<String>;
        let keep_scope: bool;
        let teardown: Option<StateHandle>;
        {
            let mut core = self.lock_core();
            if core.in_transition {
                // An entry function may request at most one onward
                // transition; the outermost call drains it afterwards.
                assert!(
                    core.next_state.is_none(),
                    "FSM transition to {} requested while a transition to {} is already pending",
                    target,
                    core.next_state.as_deref().unwrap_or(""),
                );
                core.next_state = Some(target.to_string());
                return Ok(());
            }
            previous = core.state.clone();
            keep_scope = match &core.state {
                Some(current) => root_segment(current) == root_segment(target),
                None => false,
            };
            teardown = if keep_scope { None } else { core.handle.take() };
        }
        // Root boundary crossed: the outgoing scope chain goes first, so
        // nothing registered by the old state can observe the new one.
        if let Some(handle) = teardown {
            handle.disconnect();
        }

        let entry = self.resolve(target)?;

        let handle;
        {
            let mut core = self.lock_core();
            core.state = Some(target.to_string());
            core.history.push_back(target.to_string());
            if core.history.len() > HISTORY_CAPACITY {
                core.history.pop_front();
            }
            // Inside the same root, the outgoing handle stays alive and is
            // linked behind the new one; the next root-boundary teardown
            // cascades through the chain.
            let link = if keep_scope { core.handle.take() } else { None };
            handle = StateHandle::new(&self.shared, target, link);
            core.handle = Some(handle.clone());
            core.in_transition = true;
        }
        match &previous {
            Some(previous) => debug!("FSM transitioned from {} to {}", previous, target),
            None => debug!("FSM entered initial state {}", target),
        }

        {
            let guard = EntryGuard {
                shared: &self.shared,
            };
            (entry)(self, &handle);
            drop(guard);
        }

        let required = self.lock_core().all_state_events.clone();
        for event in &required {
            if self.shared.events.listener_count(event) == 0 {
                return Err(FsmError::AllStateEventMissing {
                    state: target.to_string(),
                    event: event.clone(),
                });
            }
        }

        {
            let mut core = self.lock_core();
            core.to_emit.push(target.to_string());
            if core.to_emit.len() == 1 {
                let fsm = self.clone();
                tokio::spawn(async move {
                    fsm.flush_state_changes();
                });
            }
        }

        let queued = self.lock_core().next_state.take();
        if let Some(next) = queued {
            return self.transition(&next);
        }
        Ok(())
    }

    fn resolve(&self, target: &str) -> FsmResult<EntryFn> {
        let mut segments = target.splitn(3, '.');
        let root = segments.next().unwrap_or("");
        let sub = segments.next();
        if segments.next().is_some() {
            // More than one dot never resolves.
            return Err(FsmError::UnknownSubState {
                state: target.to_string(),
            });
        }
        let slot = self
            .shared
            .states
            .get(root)
            .ok_or_else(|| FsmError::UnknownState {
                state: target.to_string(),
            })?;
        match sub {
            None => Ok(Arc::clone(&slot.enter)),
            Some(leaf) => {
                slot.substates
                    .get(leaf)
                    .cloned()
                    .ok_or_else(|| FsmError::UnknownSubState {
                        state: target.to_string(),
                    })
            }
        }
    }

    fn flush_state_changes(&self) {
        let pending = std::mem::take(&mut self.lock_core().to_emit);
        for state in pending {
            self.shared.events.emit(STATE_CHANGED, &state);
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().expect("fsm core lock poisoned")
    }
}

impl Emitter<String> for Fsm {
    fn on<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.shared.events.on(event, cb)
    }

    fn once<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.shared.events.once(event, cb)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        self.shared.events.remove_listener(event, id);
    }

    fn emit(&self, event: &str, payload: &String) {
        self.shared.events.emit(event, payload);
    }

    fn listener_count(&self, event: &str) -> usize {
        self.shared.events.listener_count(event)
    }
}

fn state_matches(current: &str, wanted: &str) -> bool {
    current
        .strip_prefix(wanted)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn root_segment(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
