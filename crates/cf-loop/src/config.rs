//! One-shot configuration surface for a control loop.
//!
//! Embedding applications often receive a whole operating point at once (a
//! recipe step, a UI form). [`LoopConfig`] carries every recognized option;
//! [`ControlLoop::apply_config`] pushes them through the ordinary setters.
//! Nothing here is persisted by this crate.

use serde::{Deserialize, Serialize};

use cf_pid::Direction;

use crate::control_loop::ControlLoop;
use crate::error::LoopResult;
use crate::mode::{ControlMode, LoopSide};

/// Gains for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunings {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Options for one controller. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub tunings: Option<Tunings>,
    pub direction: Option<Direction>,
    /// Clamp range as `(min, max)`.
    pub output_limits: Option<(f64, f64)>,
}

/// Hysteresis band options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BangBangConfig {
    /// Margin below the setpoint. Must be positive to take effect.
    pub lower: f64,
    /// Margin above the setpoint. Must be positive to take effect.
    pub upper: f64,
    pub enabled: bool,
}

/// A complete operating point. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub mode: Option<ControlMode>,
    pub setpoint: Option<f64>,
    pub bang_bang: Option<BangBangConfig>,
    #[serde(default)]
    pub inner: PidConfig,
    #[serde(default)]
    pub outer: PidConfig,
    pub sample_time_ms: Option<u64>,
    pub outer_sample_factor: Option<u32>,
    pub power: Option<bool>,
}

impl ControlLoop {
    /// Apply a configuration through the ordinary setters.
    ///
    /// Timing and per-loop settings are applied first, then mode, setpoint
    /// and band, then power, so a single config can take a loop from cold
    /// to running. Each setter is individually atomic; on the first
    /// rejection the remaining options are not applied.
    pub fn apply_config(&mut self, config: &LoopConfig) -> LoopResult<()> {
        if let Some(ms) = config.sample_time_ms {
            self.set_sample_time(ms)?;
        }
        if let Some(factor) = config.outer_sample_factor {
            self.set_outer_sample_factor(factor)?;
        }

        for (side, pid) in [
            (LoopSide::Inner, &config.inner),
            (LoopSide::Outer, &config.outer),
        ] {
            if let Some((min, max)) = pid.output_limits {
                self.set_output_limits(side, min, max)?;
            }
            if let Some(t) = pid.tunings {
                self.set_tunings(side, t.kp, t.ki, t.kd)?;
            }
            if let Some(direction) = pid.direction {
                self.set_direction(side, direction);
            }
        }

        if let Some(mode) = config.mode {
            self.set_control_type(mode);
        }
        if let Some(setpoint) = config.setpoint {
            self.set_point(setpoint);
        }
        if let Some(band) = config.bang_bang {
            self.set_bang_bang_range(band.lower, band.upper)?;
            if band.enabled {
                self.enable_bang_bang();
            } else {
                self.disable_bang_bang();
            }
        }

        if let Some(on) = config.power {
            if on {
                self.set_on();
            } else {
                self.set_off();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use cf_core::clock::{ManualClock, MonotonicClock};

    use crate::io::{ActuatorSink, DataSource};

    struct CellSource(Rc<Cell<f64>>);

    impl DataSource for CellSource {
        fn get(&mut self) -> f64 {
            self.0.get()
        }
    }

    struct NullSink;

    impl ActuatorSink for NullSink {
        fn on(&mut self) {}
        fn off(&mut self) {}
        fn update(&mut self, _value: f64) {}
    }

    fn bare_loop() -> ControlLoop {
        let clock: Rc<dyn MonotonicClock> = Rc::new(ManualClock::new(0));
        ControlLoop::single_source(
            Box::new(CellSource(Rc::new(Cell::new(0.0)))),
            Box::new(NullSink),
            clock,
            0.0,
        )
    }

    #[test]
    fn full_config_brings_loop_to_operating_point() {
        let mut control = bare_loop();
        let config = LoopConfig {
            mode: Some(ControlMode::Cascade),
            setpoint: Some(65.0),
            bang_bang: Some(BangBangConfig {
                lower: 4.0,
                upper: 6.0,
                enabled: true,
            }),
            inner: PidConfig {
                tunings: Some(Tunings {
                    kp: 2.0,
                    ki: 0.1,
                    kd: 0.0,
                }),
                direction: Some(Direction::Direct),
                output_limits: Some((0.0, 1.0)),
            },
            outer: PidConfig {
                tunings: Some(Tunings {
                    kp: 1.5,
                    ki: 0.0,
                    kd: 0.0,
                }),
                direction: None,
                output_limits: Some((0.0, 80.0)),
            },
            sample_time_ms: Some(500),
            outer_sample_factor: Some(3),
            power: Some(true),
        };

        control.apply_config(&config).unwrap();

        assert!(control.is_control_cascade());
        assert!(control.is_on());
        assert_eq!(control.setpoint(), 65.0);
        assert_eq!(control.band(), (61.0, 71.0));
        assert!(control.bang_bang_enabled());
        assert_eq!(control.kp(LoopSide::Inner), 2.0);
        assert_eq!(control.kp(LoopSide::Outer), 1.5);
        assert_eq!(control.sample_time_ms(LoopSide::Inner), 500);
        assert_eq!(control.sample_time_ms(LoopSide::Outer), 1_500);
    }

    #[test]
    fn empty_config_changes_nothing() {
        let mut control = bare_loop();
        control.apply_config(&LoopConfig::default()).unwrap();
        assert!(control.is_control_single_loop());
        assert!(!control.is_on());
        assert_eq!(control.setpoint(), 0.0);
    }

    #[test]
    fn rejection_stops_later_options() {
        let mut control = bare_loop();
        let config = LoopConfig {
            setpoint: Some(40.0),
            bang_bang: Some(BangBangConfig {
                lower: 0.0, // rejected
                upper: 5.0,
                enabled: true,
            }),
            power: Some(true),
            ..LoopConfig::default()
        };

        assert!(control.apply_config(&config).is_err());
        // Options before the bad one took effect; power never applied.
        assert_eq!(control.setpoint(), 40.0);
        assert!(!control.is_on());
    }
}
