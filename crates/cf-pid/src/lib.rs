//! cf-pid: sampled feedback controller for cascadeflow.
//!
//! Provides the discrete positional PID used by the loop orchestrator:
//! - Sampled/digital operation: `compute` is a no-op until the controller's
//!   own sample period has elapsed
//! - Manual/automatic run modes with bumpless transfer
//! - Output and integral clamping (anti-windup)
//! - Direct/reverse actuation sense
//!
//! The controller owns its input/output/setpoint slots; callers move values
//! in and out through accessors. This is the ownership-safe replacement for
//! the shared-variable wiring traditional embedded PID libraries use.

pub mod error;
pub mod pid;

pub use error::{PidError, PidResult};
pub use pid::{Direction, Pid, RunMode};
