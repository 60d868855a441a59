//! Moore state machine runtime with state-scoped listeners and timers.
//!
//! `moore-fsm` expresses asynchronous programs as **Moore machines**: each
//! machine has a single current state, and the code associated with a state
//! runs exactly once, on entry. Events, timers, and observations of other
//! machines' states are used only to trigger transitions.
//!
//! The piece that makes this shape pay off is the [`StateHandle`]. Every
//! listener and timer a state registers goes through the handle the entry
//! function received, and when the machine leaves that state the whole
//! scope is torn down automatically. A timer armed by a state you already
//! left cannot fire into the new state; a listener subscribed three states
//! ago cannot come back to life. That removes the stale-callback bug class
//! that ad-hoc event-driven code accumulates.
//!
//! ## Quick start
//!
//! ```rust
//! use moore_fsm::{Fsm, FsmBuilder, StateHandle};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), moore_fsm::FsmError> {
//!     let machine = FsmBuilder::new()
//!         .state("idle", |_fsm: &Fsm, handle: &StateHandle| {
//!             // Scoped timer: cancelled automatically if we leave "idle"
//!             // some other way first.
//!             let h = handle.clone();
//!             handle.timeout(Duration::from_millis(10), move || {
//!                 h.goto_state("running").expect("transition failed");
//!             });
//!         })
//!         .state("running", |_fsm: &Fsm, _handle: &StateHandle| {})
//!         .start("idle")?;
//!
//!     assert_eq!(machine.state().as_deref(), Some("idle"));
//!     tokio::time::sleep(Duration::from_millis(30)).await;
//!     assert_eq!(machine.state().as_deref(), Some("running"));
//!     Ok(())
//! }
//! ```
//!
//! ## Transitions
//!
//! A handle may be used to cause a transition exactly once. A trigger that
//! fires twice produces one transition and one
//! [`FsmError::HandleAlreadyUsed`], instead of silently transitioning
//! twice. States can also restrict where they may go with
//! [`StateHandle::valid_transitions`].
//!
//! An entry function may call `goto_state` inline; the machine queues the
//! request and drains it after the entry function returns, so a state that
//! immediately dispatches onwards works without re-entrant teardown.
//!
//! ## Sub-states
//!
//! A state may have sub-states, written `"parent.leaf"` and declared with
//! [`FsmBuilder::substate`]. Moving between a parent and its sub-states
//! (or between sibling sub-states) keeps the parent's listeners and timers
//! alive; the new scope is linked behind the old one, and the whole chain
//! is torn down when the machine finally leaves the parent's root. That is
//! how sub-states inherit their parent's handlers.
//!
//! ## Observing machines
//!
//! Every committed transition emits [`STATE_CHANGED`] (with the full state
//! name) on the machine's own emitter, asynchronously on a later scheduler
//! turn and batched in transition order, so observers never see the
//! intermediate states of a synchronous transition chain. Machines
//! coordinate by listening to each other's events; [`Fsm::on_state`] waits
//! for a particular state, and [`AsyncCall`] adapts a fallible async
//! operation into `"return"` / `"error"` trigger events.
//!
//! Machines must be built and driven from within a tokio runtime; timers
//! and deferred emission run as spawned tasks.

pub mod adapter;
pub mod builder;
pub mod error;
pub mod events;
pub mod handle;
pub mod handlers;
pub mod machine;
pub mod timers;

pub use adapter::{AsyncCall, CallOutcome, CALL_ERROR, CALL_RETURN};
pub use builder::FsmBuilder;
pub use error::{FsmError, FsmResult};
pub use events::{Emitter, EventEmitter, Listener, ListenerId};
pub use handle::StateHandle;
pub use handlers::EntryFn;
pub use machine::{Fsm, STATE_CHANGED};
pub use timers::TimerToken;
