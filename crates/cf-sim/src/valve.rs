//! Slew-limited valve with first-order stem dynamics.

use crate::error::{SimError, SimResult};

use cf_core::numeric::ensure_positive;

/// A valve whose stem takes real time to move.
///
/// Commands set a target opening; each step the stem approaches the target
/// with first-order dynamics (`dpos/dt = (target - pos) / tau`), clamped to
/// a maximum slew rate. Position and commands live in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct SlowValve {
    /// Stem time constant (seconds).
    tau_s: f64,
    /// Maximum stem speed (fraction of full travel per second).
    rate_limit: f64,
    position: f64,
    target: f64,
}

impl SlowValve {
    /// Create a closed valve.
    ///
    /// # Errors
    ///
    /// Returns an error unless `tau_s` and `rate_limit` are positive.
    pub fn new(tau_s: f64, rate_limit: f64) -> SimResult<Self> {
        ensure_positive(tau_s, "valve time constant must be positive")?;
        ensure_positive(rate_limit, "valve rate limit must be positive")?;
        Ok(Self {
            tau_s,
            rate_limit,
            position: 0.0,
            target: 0.0,
        })
    }

    /// Command a new target opening. Out-of-range requests are clamped into
    /// `[0, 1]`; non-finite requests leave the target unchanged.
    pub fn command(&mut self, opening: f64) {
        if opening.is_finite() {
            self.target = opening.clamp(0.0, 1.0);
        }
    }

    /// Move the stem for `dt_s` seconds of simulated time.
    pub fn advance(&mut self, dt_s: f64) {
        if dt_s <= 0.0 {
            return;
        }
        let raw = (self.target - self.position) / self.tau_s;
        let dpdt = raw.clamp(-self.rate_limit, self.rate_limit);
        self.position = (self.position + dpdt * dt_s).clamp(0.0, 1.0);
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approaches_target() {
        let mut valve = SlowValve::new(0.5, 10.0).unwrap();
        valve.command(1.0);
        for _ in 0..100 {
            valve.advance(0.05);
        }
        assert!(valve.position() > 0.95);
    }

    #[test]
    fn slew_rate_limits_stem_speed() {
        // tau would demand 10/s but the stem can only do 0.2/s.
        let mut valve = SlowValve::new(0.1, 0.2).unwrap();
        valve.command(1.0);
        valve.advance(1.0);
        assert!((valve.position() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn commands_are_clamped() {
        let mut valve = SlowValve::new(1.0, 1.0).unwrap();
        valve.command(1.7);
        assert_eq!(valve.target(), 1.0);
        valve.command(-0.4);
        assert_eq!(valve.target(), 0.0);
        valve.command(f64::NAN);
        assert_eq!(valve.target(), 0.0);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(SlowValve::new(0.0, 1.0).is_err());
        assert!(SlowValve::new(1.0, -1.0).is_err());
    }
}
