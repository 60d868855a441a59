//! Adapter turning a fallible async operation into transition triggers.
//!
//! An [`AsyncCall`] owns one asynchronous operation and an event emitter.
//! Calling [`run`](AsyncCall::run) executes the operation once; completion
//! emits exactly one of [`CALL_RETURN`] or [`CALL_ERROR`]. The emitter is
//! an ordinary [`EventEmitter`], so the adapter plugs into
//! [`StateHandle::on`](crate::StateHandle::on) like any other event source:
//! a state kicks the call off on entry and transitions on whichever event
//! arrives, and leaving the state early unhooks both listeners at once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::events::{Emitter, EventEmitter};

/// Event emitted when the wrapped operation completes successfully.
pub const CALL_RETURN: &str = "return";

/// Event emitted when the wrapped operation fails.
pub const CALL_ERROR: &str = "error";

/// Payload delivered on [`CALL_RETURN`] and [`CALL_ERROR`].
#[derive(Debug)]
pub enum CallOutcome<T, E> {
    /// Successful completion value, delivered on [`CALL_RETURN`].
    Return(T),
    /// Failure, delivered on [`CALL_ERROR`].
    Error(E),
}

impl<T, E> CallOutcome<T, E> {
    /// The completion value, if this is a [`CallOutcome::Return`].
    pub fn value(&self) -> Option<&T> {
        match self {
            CallOutcome::Return(value) => Some(value),
            CallOutcome::Error(_) => None,
        }
    }

    /// The failure, if this is a [`CallOutcome::Error`].
    pub fn error(&self) -> Option<&E> {
        match self {
            CallOutcome::Return(_) => None,
            CallOutcome::Error(err) => Some(err),
        }
    }
}

type CallThunk<T, E> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send>> + Send>;

/// One fallible async operation exposed as an event source.
///
/// No retries and no multiple-completion bookkeeping: the operation runs at
/// most once and at most one event is emitted.
pub struct AsyncCall<T, E> {
    events: EventEmitter<CallOutcome<T, E>>,
    operation: Mutex<Option<CallThunk<T, E>>>,
}

impl<T, E> AsyncCall<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wrap `operation`; it is not invoked until [`run`](AsyncCall::run).
    ///
    /// Arguments to the underlying call are whatever the closure captures.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            events: EventEmitter::new(),
            operation: Mutex::new(Some(Box::new(move || Box::pin(operation())))),
        }
    }

    /// Wrap an already-constructed future.
    pub fn from_future<Fut>(operation: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(move || operation)
    }

    /// The adapter's emitter, for subscribing to [`CALL_RETURN`] and
    /// [`CALL_ERROR`].
    pub fn events(&self) -> EventEmitter<CallOutcome<T, E>> {
        self.events.clone()
    }

    /// Invoke the wrapped operation on the runtime. Only the first call
    /// does anything.
    pub fn run(&self) {
        let thunk = self
            .operation
            .lock()
            .expect("async call lock poisoned")
            .take();
        let Some(thunk) = thunk else { return };
        let events = self.events.clone();
        tokio::spawn(async move {
            match thunk().await {
                Ok(value) => events.emit(CALL_RETURN, &CallOutcome::Return(value)),
                Err(err) => events.emit(CALL_ERROR, &CallOutcome::Error(err)),
            }
        });
    }
}
