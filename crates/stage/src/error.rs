use crate::node::StateType;

/// Errors raised by the stage machine.
///
/// None of these are retryable: the host treats them as a terminal
/// level-load failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("Invalid {state_type} node at index {index}: {reason}")]
    InvalidNode {
        index: usize,
        state_type: StateType,
        reason: String,
    },

    #[error("No active stage node")]
    NoActiveNode,

    #[error("Stage machine already started")]
    AlreadyStarted,
}
