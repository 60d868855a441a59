//! Error types for FSM operations

use thiserror::Error;

/// Result type for FSM operations
pub type FsmResult<T> = Result<T, FsmError>;

/// Errors raised synchronously at the point of misuse. Nothing is recovered
/// internally: a transition is either rejected here or fully committed.
#[derive(Error, Debug)]
pub enum FsmError {
    /// The target state's root segment has no entry function
    #[error("Unknown FSM state: {state}")]
    UnknownState {
        /// Full target state name
        state: String,
    },

    /// The root segment exists but the sub-segment does not (also raised for
    /// names with more than one dot)
    #[error("Unknown FSM sub-state: {state}")]
    UnknownSubState {
        /// Full target state name
        state: String,
    },

    /// `goto_state` was called on a handle that already caused a transition
    #[error("FSM attempted to leave state {current} towards {target} via a handle that was already used to enter state {used}")]
    HandleAlreadyUsed {
        /// State the handle belongs to
        current: String,
        /// State the caller attempted to reach
        target: String,
        /// State the handle was previously used to enter
        used: String,
    },

    /// The target is absent from the active `valid_transitions` list
    #[error("Invalid FSM transition: {from} => {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Rejected target state
        to: String,
    },

    /// A required all-state event had no listener after state entry
    #[error("FSM consistency error: state {state} has no listener for all-state event '{event}'")]
    AllStateEventMissing {
        /// State that was just entered
        state: String,
        /// Required event name with no listener
        event: String,
    },

    /// A state name handed to the builder was empty, dotted where it may not
    /// be, or declared a sub-state under an unknown parent
    #[error("Invalid FSM state name: '{name}'")]
    InvalidStateName {
        /// The offending name
        name: String,
    },

    /// The same state name was declared twice with the builder
    #[error("Duplicate FSM state: {name}")]
    DuplicateState {
        /// The name declared twice
        name: String,
    },
}
