//! cf-loop: cascade-capable control-loop orchestration for cascadeflow.
//!
//! The crate centers on [`ControlLoop`], which coordinates two sampled PID
//! controllers and an on/off hysteresis mode over three runtime-selectable
//! operating strategies:
//!
//! - **OnOff**: relay-style two-point control, optionally with a hysteresis
//!   band that holds the previous command inside it
//! - **SingleLoop**: one continuous controller driving the actuator
//! - **Cascade**: a slow outer loop whose output becomes the fast inner
//!   loop's setpoint
//!
//! In the continuous modes an enabled bang-bang band acts as an override:
//! whenever the measured value leaves the band the command is forced to an
//! extreme before the controllers get a say, bounding worst-case response to
//! excursions independently of the PID sample period.
//!
//! The loop is cooperative and single-threaded: the owner calls
//! [`ControlLoop::compute`] at least as fast as the base sample period, and
//! the controllers' own sample gates decide when they actually run.

pub mod config;
pub mod control_loop;
pub mod error;
pub mod io;
pub mod mode;

pub use config::{BangBangConfig, LoopConfig, PidConfig, Tunings};
pub use control_loop::{ControlLoop, DEFAULT_OUTER_SAMPLE_FACTOR, DEFAULT_SAMPLE_TIME_MS};
pub use error::{LoopError, LoopResult};
pub use io::{ActuatorSink, DataSource};
pub use mode::{ControlMode, LoopSide};
