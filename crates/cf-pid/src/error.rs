//! Error types for controller operations.

use thiserror::Error;

/// Result type for controller operations.
pub type PidResult<T> = Result<T, PidError>;

/// Errors that can occur when configuring a controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PidError {
    /// Invalid argument provided to a controller function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}
