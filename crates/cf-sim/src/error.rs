//! Error types for simulation fixtures.

use cf_core::CfError;
use thiserror::Error;

/// Errors encountered constructing or stepping a process model.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error(transparent)]
    Core(#[from] CfError),
}

pub type SimResult<T> = Result<T, SimError>;
