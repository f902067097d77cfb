//! Leaking-tank level processes.

use crate::error::{SimError, SimResult};
use crate::valve::SlowValve;

use cf_core::numeric::{ensure_finite, ensure_positive};

/// A vessel filled through a proportional valve and drained by a constant
/// leak.
///
/// Flow rates are given in litres per minute; stepping is in seconds. The
/// level never goes negative.
#[derive(Clone, Debug)]
pub struct TankModel {
    max_inflow_per_s: f64,
    leak_per_s: f64,
    level: f64,
    valve_open: f64,
}

impl TankModel {
    /// Create an empty tank.
    ///
    /// # Errors
    ///
    /// Returns an error unless the full-open inflow is positive and the
    /// leak rate non-negative.
    pub fn new(max_inflow_lpm: f64, leak_lpm: f64) -> SimResult<Self> {
        ensure_positive(max_inflow_lpm, "tank inflow must be positive")?;
        ensure_finite(leak_lpm, "tank leak rate")?;
        if leak_lpm < 0.0 {
            return Err(SimError::InvalidArg {
                what: "tank leak rate must be non-negative",
            });
        }
        Ok(Self {
            max_inflow_per_s: max_inflow_lpm / 60.0,
            leak_per_s: leak_lpm / 60.0,
            level: 0.0,
            valve_open: 0.0,
        })
    }

    /// Advance the process by `dt_s` seconds of simulated time.
    pub fn advance(&mut self, dt_s: f64) {
        if dt_s <= 0.0 {
            return;
        }
        let inflow = self.valve_open * self.max_inflow_per_s * dt_s;
        let outflow = self.leak_per_s * dt_s;
        self.level = (self.level + inflow - outflow).max(0.0);
    }

    /// Command a new valve opening. Out-of-range requests are clamped into
    /// `[0, 1]`; non-finite requests leave the opening unchanged.
    pub fn set_valve_opening(&mut self, opening: f64) {
        if opening.is_finite() {
            self.valve_open = opening.clamp(0.0, 1.0);
        }
    }

    /// Current fill level in litres.
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn valve_opening(&self) -> f64 {
        self.valve_open
    }
}

/// A [`TankModel`] filled through a [`SlowValve`]: the commanded opening
/// takes effect only as fast as the stem can travel.
#[derive(Clone, Debug)]
pub struct SlowValveTank {
    tank: TankModel,
    valve: SlowValve,
}

impl SlowValveTank {
    pub fn new(
        max_inflow_lpm: f64,
        leak_lpm: f64,
        valve_tau_s: f64,
        valve_rate_limit: f64,
    ) -> SimResult<Self> {
        Ok(Self {
            tank: TankModel::new(max_inflow_lpm, leak_lpm)?,
            valve: SlowValve::new(valve_tau_s, valve_rate_limit)?,
        })
    }

    /// Command a new valve opening (clamped like [`TankModel`]).
    pub fn command_valve(&mut self, opening: f64) {
        self.valve.command(opening);
    }

    /// Advance valve and tank by `dt_s` seconds. The inflow uses the
    /// midpoint of the stem travel across the step.
    pub fn advance(&mut self, dt_s: f64) {
        let before = self.valve.position();
        self.valve.advance(dt_s);
        let effective = 0.5 * (before + self.valve.position());
        self.tank.set_valve_opening(effective);
        self.tank.advance(dt_s);
    }

    pub fn level(&self) -> f64 {
        self.tank.level()
    }

    pub fn valve_position(&self) -> f64 {
        self.valve.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_when_inflow_exceeds_leak() {
        let mut tank = TankModel::new(60.0, 6.0).unwrap();
        tank.set_valve_opening(1.0);
        tank.advance(10.0);
        // 1 L/s in, 0.1 L/s out, for 10 s.
        assert!((tank.level() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn drains_to_zero_floor() {
        let mut tank = TankModel::new(60.0, 30.0).unwrap();
        tank.set_valve_opening(1.0);
        tank.advance(2.0);
        tank.set_valve_opening(0.0);
        tank.advance(3600.0);
        assert_eq!(tank.level(), 0.0);
    }

    #[test]
    fn valve_commands_clamped() {
        let mut tank = TankModel::new(10.0, 0.0).unwrap();
        tank.set_valve_opening(2.0);
        assert_eq!(tank.valve_opening(), 1.0);
        tank.set_valve_opening(-1.0);
        assert_eq!(tank.valve_opening(), 0.0);
        tank.set_valve_opening(f64::NAN);
        assert_eq!(tank.valve_opening(), 0.0);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(TankModel::new(0.0, 1.0).is_err());
        assert!(TankModel::new(-5.0, 1.0).is_err());
        assert!(TankModel::new(10.0, -1.0).is_err());
    }

    #[test]
    fn slow_valve_delays_the_fill() {
        let mut fast = TankModel::new(60.0, 0.0).unwrap();
        fast.set_valve_opening(1.0);
        fast.advance(5.0);

        let mut slow = SlowValveTank::new(60.0, 0.0, 2.0, 10.0).unwrap();
        slow.command_valve(1.0);
        for _ in 0..50 {
            slow.advance(0.1);
        }

        // Same 5 s of filling, but the slow stem admits less water.
        assert!(slow.level() < fast.level());
        assert!(slow.level() > 0.0);
        assert!(slow.valve_position() > 0.8);
    }
}
