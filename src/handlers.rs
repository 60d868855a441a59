//! Shared handler type aliases.

use std::sync::Arc;

use crate::handle::StateHandle;
use crate::machine::Fsm;

/// Entry function for a state.
///
/// Runs exactly once, synchronously, when its state is entered. It receives
/// the machine and the fresh scope handle allocated for the state; every
/// listener or timer it wants torn down on exit goes through that handle,
/// and it may call [`StateHandle::goto_state`] at most once.
pub type EntryFn = Arc<dyn Fn(&Fsm, &StateHandle) + Send + Sync>;
