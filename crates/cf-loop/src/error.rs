//! Error types for loop orchestration.

use cf_pid::PidError;
use thiserror::Error;

/// Result type for loop orchestration operations.
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors that can occur when configuring a control loop.
///
/// All of these are rejections: the operation leaves the loop state
/// unchanged. Callers that want the traditional silent-no-op behavior of
/// embedded controllers can simply discard the error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoopError {
    /// Invalid argument provided to a loop function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A forwarded controller setting was rejected.
    #[error("Controller rejected configuration: {0}")]
    Controller(#[from] PidError),
}
