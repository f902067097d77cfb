//! Operating strategy and loop selection types.

use serde::{Deserialize, Serialize};

/// Operating strategy of the control loop.
///
/// Exactly one mode is active at a time. Power is a separate boolean
/// orthogonal to the mode: switching modes while off only re-wires the
/// controllers, it does not start them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Relay-style two-point control, optionally with a hysteresis band.
    OnOff,
    /// One continuous controller driving the actuator directly.
    SingleLoop,
    /// Two-level cascade: the slow outer loop's output becomes the fast
    /// inner loop's setpoint.
    Cascade,
}

/// Selects which of the two controllers a forwarded setting targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopSide {
    /// The fast, directly-actuated loop.
    Inner,
    /// The slow loop whose output feeds the inner setpoint.
    Outer,
}
