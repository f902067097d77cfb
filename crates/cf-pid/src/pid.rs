//! Discrete positional PID controller.
//!
//! The algorithm follows the classic embedded-controller formulation:
//! integral and derivative gains are pre-scaled by the sample period so the
//! per-sample arithmetic stays cheap, the derivative acts on the measurement
//! rather than the error (no derivative kick on setpoint steps), and the
//! integral term is clamped to the output limits as anti-windup.

use serde::{Deserialize, Serialize};

use crate::error::{PidError, PidResult};

/// Actuation sense of the controller.
///
/// `Direct` means a positive error (setpoint above measurement) drives the
/// output up, e.g. a heater. `Reverse` flips the sign, e.g. a chiller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Direct,
    Reverse,
}

/// Run mode of the controller.
///
/// In `Automatic` the controller computes a new output each eligible sample;
/// in `Manual` it never runs and the output slot is caller-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Manual,
    Automatic,
}

/// Default sample period for a freshly constructed controller.
pub const DEFAULT_SAMPLE_TIME_MS: u64 = 100;

/// Sampled PID controller with owned signal slots.
///
/// Callers write the measured value and setpoint into the controller before
/// calling [`Pid::compute`], and read the command back out of the output
/// slot afterwards. While the controller is in manual mode the output slot
/// may be written directly; the manual-to-automatic transition absorbs it
/// into the integral term so the handover is bumpless.
#[derive(Debug, Clone)]
pub struct Pid {
    // Display gains, exactly as the caller supplied them.
    disp_kp: f64,
    disp_ki: f64,
    disp_kd: f64,

    // Working gains: pre-scaled by the sample period, signed by direction.
    kp: f64,
    ki: f64,
    kd: f64,

    direction: Direction,
    mode: RunMode,

    sample_time_ms: u64,
    last_time_ms: Option<u64>,

    out_min: f64,
    out_max: f64,

    i_term: f64,
    last_input: f64,

    // Signal slots.
    input: f64,
    output: f64,
    setpoint: f64,
}

impl Pid {
    /// Create a new controller in manual mode.
    ///
    /// Defaults: 100 ms sample period, output limits `[0, 1]`, all signal
    /// slots zero.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidArg`] if any gain is negative or non-finite.
    pub fn new(kp: f64, ki: f64, kd: f64, direction: Direction) -> PidResult<Self> {
        validate_gains(kp, ki, kd)?;
        let mut pid = Self {
            disp_kp: kp,
            disp_ki: ki,
            disp_kd: kd,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            direction,
            mode: RunMode::Manual,
            sample_time_ms: DEFAULT_SAMPLE_TIME_MS,
            last_time_ms: None,
            out_min: 0.0,
            out_max: 1.0,
            i_term: 0.0,
            last_input: 0.0,
            input: 0.0,
            output: 0.0,
            setpoint: 0.0,
        };
        pid.rescale();
        Ok(pid)
    }

    /// Run one controller cycle.
    ///
    /// Returns `true` iff a new output was produced: the controller must be
    /// in automatic mode and its sample period must have elapsed since the
    /// last run (the first call after construction is always eligible).
    pub fn compute(&mut self, now_ms: u64) -> bool {
        if self.mode == RunMode::Manual {
            return false;
        }
        let due = match self.last_time_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.sample_time_ms,
        };
        if !due {
            return false;
        }

        let input = self.input;
        let error = self.setpoint - input;

        self.i_term = (self.i_term + self.ki * error).clamp(self.out_min, self.out_max);

        // Derivative on measurement: immune to setpoint steps.
        let d_input = input - self.last_input;

        let output = (self.kp * error + self.i_term - self.kd * d_input)
            .clamp(self.out_min, self.out_max);

        self.output = output;
        self.last_input = input;
        self.last_time_ms = Some(now_ms);
        true
    }

    /// Switch between manual and automatic operation.
    ///
    /// The manual-to-automatic transition re-initializes internal state from
    /// the current slots so the first automatic output continues smoothly
    /// from whatever the output slot held.
    pub fn set_mode(&mut self, mode: RunMode) {
        if mode == RunMode::Automatic && self.mode == RunMode::Manual {
            self.reinitialize();
        }
        self.mode = mode;
    }

    /// Replace the controller gains.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidArg`] if any gain is negative or non-finite;
    /// the previous gains stay in effect.
    pub fn set_tunings(&mut self, kp: f64, ki: f64, kd: f64) -> PidResult<()> {
        validate_gains(kp, ki, kd)?;
        self.disp_kp = kp;
        self.disp_ki = ki;
        self.disp_kd = kd;
        self.rescale();
        Ok(())
    }

    /// Change the sample period, preserving the effective tuning.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidArg`] for a zero period.
    pub fn set_sample_time(&mut self, ms: u64) -> PidResult<()> {
        if ms == 0 {
            return Err(PidError::InvalidArg {
                what: "sample time must be positive",
            });
        }
        self.sample_time_ms = ms;
        self.rescale();
        Ok(())
    }

    /// Set the output clamp range.
    ///
    /// In automatic mode the current output and integral term are re-clamped
    /// into the new range immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidArg`] if `min >= max` or either bound is
    /// non-finite.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> PidResult<()> {
        if !min.is_finite() || !max.is_finite() {
            return Err(PidError::InvalidArg {
                what: "output limits must be finite",
            });
        }
        if min >= max {
            return Err(PidError::InvalidArg {
                what: "output minimum must be below maximum",
            });
        }
        self.out_min = min;
        self.out_max = max;
        if self.mode == RunMode::Automatic {
            self.output = self.output.clamp(min, max);
            self.i_term = self.i_term.clamp(min, max);
        }
        Ok(())
    }

    /// Change the actuation sense. Working gains are re-derived so the new
    /// sense applies from the next compute regardless of run mode.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        self.rescale();
    }

    // Slot accessors.

    /// Write the measured process value.
    pub fn set_input(&mut self, value: f64) {
        self.input = value;
    }

    /// Write the target value.
    pub fn set_setpoint(&mut self, value: f64) {
        self.setpoint = value;
    }

    /// Write the output slot directly.
    ///
    /// Intended for manual-mode priming and for wiring one controller's
    /// output into another's setpoint; an automatic controller overwrites
    /// the slot on its next eligible compute.
    pub fn set_output(&mut self, value: f64) {
        self.output = value;
    }

    pub fn input(&self) -> f64 {
        self.input
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    // Configuration accessors. Gains read back exactly as supplied.

    pub fn kp(&self) -> f64 {
        self.disp_kp
    }

    pub fn ki(&self) -> f64 {
        self.disp_ki
    }

    pub fn kd(&self) -> f64 {
        self.disp_kd
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn sample_time_ms(&self) -> u64 {
        self.sample_time_ms
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.out_min, self.out_max)
    }

    /// Re-derive working gains from display gains, sample period and sense.
    fn rescale(&mut self) {
        let dt_s = self.sample_time_ms as f64 / 1000.0;
        let sign = match self.direction {
            Direction::Direct => 1.0,
            Direction::Reverse => -1.0,
        };
        self.kp = sign * self.disp_kp;
        self.ki = sign * self.disp_ki * dt_s;
        self.kd = sign * self.disp_kd / dt_s;
    }

    /// Bumpless transfer: absorb the current output into the integral term
    /// and reset the derivative history.
    fn reinitialize(&mut self) {
        self.i_term = self.output.clamp(self.out_min, self.out_max);
        self.last_input = self.input;
    }
}

fn validate_gains(kp: f64, ki: f64, kd: f64) -> PidResult<()> {
    for g in [kp, ki, kd] {
        if !g.is_finite() || g < 0.0 {
            return Err(PidError::InvalidArg {
                what: "gains must be finite and non-negative",
            });
        }
    }
    Ok(())
}
