//! Per-state scope handles.
//!
//! A [`StateHandle`] is allocated for each state entry and owns everything
//! the state registers: listeners, one-shot and periodic timers, next-tick
//! callbacks. Leaving the state tears the whole scope down, which is what
//! removes the stale-callback bug class from event-driven code. The handle
//! is also the only sanctioned channel for requesting a transition, and it
//! can be used for that exactly once.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{FsmError, FsmResult};
use crate::events::Emitter;
use crate::machine::{Fsm, FsmShared};
use crate::timers::{self, TimerToken};

/// Scope handle for a single state occupancy.
///
/// Cheap to clone; clones share the same scope, so a callback can capture a
/// clone and call [`goto_state`](StateHandle::goto_state) when it fires.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    machine: Weak<FsmShared>,
    state: String,
    control: Mutex<Control>,
    scope: Mutex<Scope>,
}

struct Control {
    valid: bool,
    next_state: Option<String>,
    valid_transitions: Option<Vec<String>>,
}

#[derive(Default)]
struct Scope {
    torn_down: bool,
    listeners: Vec<Box<dyn FnOnce() + Send>>,
    timeouts: Vec<TimerToken>,
    intervals: Vec<TimerToken>,
    immediates: Vec<TimerToken>,
    link: Option<StateHandle>,
}

impl StateHandle {
    pub(crate) fn new(machine: &Arc<FsmShared>, state: &str, link: Option<StateHandle>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                machine: Arc::downgrade(machine),
                state: state.to_string(),
                control: Mutex::new(Control {
                    valid: true,
                    next_state: None,
                    valid_transitions: None,
                }),
                scope: Mutex::new(Scope {
                    link,
                    ..Scope::default()
                }),
            }),
        }
    }

    /// Full name of the state this handle belongs to.
    pub fn state(&self) -> &str {
        &self.inner.state
    }

    /// True until the handle has been used to cause a transition.
    pub fn is_valid(&self) -> bool {
        self.lock_control().valid
    }

    /// Subscribe `cb` to `event` on `emitter`, scoped to this state.
    ///
    /// The subscription is removed automatically when the scope is torn
    /// down. No-op if the scope is already gone.
    pub fn on<T, E, F>(&self, emitter: &E, event: &str, cb: F)
    where
        E: Emitter<T> + Clone + Send + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut scope = self.lock_scope();
        if scope.torn_down {
            return;
        }
        let id = emitter.on(event, cb);
        let emitter = emitter.clone();
        let event = event.to_string();
        scope
            .listeners
            .push(Box::new(move || emitter.remove_listener(&event, id)));
    }

    /// Subscribe `cb` to the next `event` on `emitter`, scoped to this
    /// state. Torn down with the scope if it has not fired by then.
    pub fn once<T, E, F>(&self, emitter: &E, event: &str, cb: F)
    where
        E: Emitter<T> + Clone + Send + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut scope = self.lock_scope();
        if scope.torn_down {
            return;
        }
        let id = emitter.once(event, cb);
        let emitter = emitter.clone();
        let event = event.to_string();
        scope
            .listeners
            .push(Box::new(move || emitter.remove_listener(&event, id)));
    }

    /// Schedule `cb` once after `delay`, cancelled if the state is left
    /// first.
    pub fn timeout<F>(&self, delay: Duration, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut scope = self.lock_scope();
        if scope.torn_down {
            return;
        }
        scope.timeouts.push(timers::set_timeout(delay, cb));
    }

    /// Schedule `cb` every `period`, cancelled when the state is left.
    pub fn interval<F>(&self, period: Duration, cb: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut scope = self.lock_scope();
        if scope.torn_down {
            return;
        }
        scope.intervals.push(timers::set_interval(period, cb));
    }

    /// Schedule `cb` on a later scheduler turn, cancelled if the state is
    /// left first.
    pub fn immediate<F>(&self, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut scope = self.lock_scope();
        if scope.torn_down {
            return;
        }
        scope.immediates.push(timers::set_immediate(cb));
    }

    /// Wrap `f` so it only runs while this handle is live.
    ///
    /// While the handle is valid and its scope intact, the returned closure
    /// forwards its argument and returns `Some` of `f`'s result; afterwards
    /// it does nothing and returns `None`. The guard is lexical, so nothing
    /// needs tearing down.
    pub fn callback<A, R, F>(&self, f: F) -> impl Fn(A) -> Option<R> + Send + Sync + 'static
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let handle = self.clone();
        move |arg| {
            if handle.is_live() {
                Some(f(arg))
            } else {
                None
            }
        }
    }

    /// Restrict the states this one may transition to.
    pub fn valid_transitions<I, S>(&self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_control().valid_transitions =
            Some(targets.into_iter().map(Into::into).collect());
    }

    /// Transition the machine to `target`.
    ///
    /// Each handle may do this exactly once; a handle that already caused a
    /// transition rejects further attempts, which is what turns a doubly
    /// fired trigger into an error instead of a double transition. If a
    /// [`valid_transitions`](StateHandle::valid_transitions) list is active
    /// and `target` is not on it, the call fails without transitioning.
    pub fn goto_state(&self, target: &str) -> FsmResult<()> {
        {
            let mut control = self.lock_control();
            if !control.valid {
                let used = control.next_state.clone().unwrap_or_default();
                warn!(
                    "stale handle for state {} used to reach {} (already went to {})",
                    self.inner.state, target, used
                );
                return Err(FsmError::HandleAlreadyUsed {
                    current: self.inner.state.clone(),
                    target: target.to_string(),
                    used,
                });
            }
            if let Some(allowed) = &control.valid_transitions {
                if !allowed.iter().any(|t| t == target) {
                    return Err(FsmError::InvalidTransition {
                        from: self.inner.state.clone(),
                        to: target.to_string(),
                    });
                }
            }
            control.valid = false;
            control.next_state = Some(target.to_string());
        }
        match self.inner.machine.upgrade() {
            Some(shared) => Fsm::from_shared(shared).transition(target),
            // The machine is gone; there is nothing left to drive.
            None => Ok(()),
        }
    }

    /// Remove every listener and cancel every timer registered through this
    /// handle, then cascade through the linked chain. Idempotent.
    pub fn disconnect(&self) {
        let (teardowns, tokens, link) = {
            let mut scope = self.lock_scope();
            scope.torn_down = true;
            let teardowns: Vec<_> = scope.listeners.drain(..).collect();
            let mut tokens: Vec<TimerToken> = scope.timeouts.drain(..).collect();
            tokens.extend(scope.intervals.drain(..));
            tokens.extend(scope.immediates.drain(..));
            (teardowns, tokens, scope.link.take())
        };
        if !teardowns.is_empty() || !tokens.is_empty() {
            debug!(
                "FSM tearing down scope for state {} ({} listeners, {} timers)",
                self.inner.state,
                teardowns.len(),
                tokens.len()
            );
        }
        for remove in teardowns {
            remove();
        }
        for token in tokens {
            token.cancel();
        }
        if let Some(link) = link {
            link.disconnect();
        }
    }

    fn is_live(&self) -> bool {
        self.lock_control().valid && !self.lock_scope().torn_down
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.inner.control.lock().expect("state handle lock poisoned")
    }

    fn lock_scope(&self) -> MutexGuard<'_, Scope> {
        self.inner.scope.lock().expect("state handle lock poisoned")
    }
}
