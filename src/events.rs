//! Event emitter abstraction and the in-process reference implementation.
//!
//! Anything implementing [`Emitter`] can act as a transition trigger through
//! [`StateHandle::on`](crate::StateHandle::on): the machine's own emitter,
//! another machine's, an [`AsyncCall`](crate::AsyncCall) adapter, or a
//! host-provided source wrapped in an [`EventEmitter`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Token identifying a registered listener; removal is by token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared listener callback invoked with a borrowed event payload.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Contract for event sources.
///
/// Semantics follow the usual emitter conventions: listeners for an event are
/// invoked in registration order, `once` listeners are removed before their
/// single invocation, and `emit` snapshots the listener set up front so
/// registrations made by a listener do not observe the event that is
/// currently being dispatched.
pub trait Emitter<T> {
    /// Subscribe `cb` to `event`. Returns a token accepted by
    /// [`remove_listener`](Emitter::remove_listener).
    fn on<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static;

    /// Subscribe `cb` to the next `event` only.
    fn once<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static;

    /// Remove the listener registered under `id`, if it is still present.
    fn remove_listener(&self, event: &str, id: ListenerId);

    /// Dispatch `payload` to every listener currently subscribed to `event`.
    fn emit(&self, event: &str, payload: &T);

    /// Number of listeners currently subscribed to `event`.
    fn listener_count(&self, event: &str) -> usize;
}

struct Entry<T> {
    id: ListenerId,
    once: bool,
    cb: Listener<T>,
}

struct Registry<T> {
    next_id: u64,
    events: HashMap<String, Vec<Entry<T>>>,
}

/// In-process event emitter.
///
/// Cheap to clone; clones share the same listener registry. The payload type
/// is fixed per emitter, which is what lets listeners receive `&T` without
/// downcasting.
pub struct EventEmitter<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventEmitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                events: HashMap::new(),
            })),
        }
    }

    /// Drop every listener subscribed to `event`.
    pub fn remove_all_listeners(&self, event: &str) {
        self.lock().events.remove(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<T>> {
        self.inner.lock().expect("event emitter lock poisoned")
    }

    fn subscribe(&self, event: &str, once: bool, cb: Listener<T>) -> ListenerId {
        let mut reg = self.lock();
        let id = ListenerId(reg.next_id);
        reg.next_id += 1;
        reg.events
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, once, cb });
        id
    }
}

impl<T> Emitter<T> for EventEmitter<T> {
    fn on<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(event, false, Arc::new(cb))
    }

    fn once<F>(&self, event: &str, cb: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(event, true, Arc::new(cb))
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        let mut reg = self.lock();
        if let Some(entries) = reg.events.get_mut(event) {
            entries.retain(|e| e.id != id);
        }
    }

    fn emit(&self, event: &str, payload: &T) {
        // Snapshot under the lock, invoke outside it. Listeners may
        // re-enter the emitter (teardown, re-arming) without deadlocking.
        let snapshot: Vec<Listener<T>> = {
            let mut reg = self.lock();
            match reg.events.get_mut(event) {
                Some(entries) => {
                    let cbs = entries.iter().map(|e| Arc::clone(&e.cb)).collect();
                    entries.retain(|e| !e.once);
                    cbs
                }
                None => return,
            }
        };
        for cb in snapshot {
            cb(payload);
        }
    }

    fn listener_count(&self, event: &str) -> usize {
        self.lock().events.get(event).map_or(0, Vec::len)
    }
}
