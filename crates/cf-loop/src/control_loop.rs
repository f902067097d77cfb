//! The cascade-capable control loop orchestrator.
//!
//! [`ControlLoop`] owns two sampled PID controllers and coordinates them
//! according to the active [`ControlMode`], layering a bang-bang override
//! band on top of continuous control. Each call to [`ControlLoop::compute`]
//! is one cooperative cycle: read sensors, decide, optionally run the
//! controllers, forward the resulting command to the actuator.
//!
//! The loop never drives itself; an external loop calls `compute` at least
//! as fast as the base sample period and the controllers' own sample gates
//! decide when they actually recompute.

use std::rc::Rc;

use tracing::trace;

use cf_core::clock::MonotonicClock;
use cf_pid::{Direction, Pid, RunMode};

use crate::error::{LoopError, LoopResult};
use crate::io::{ActuatorSink, DataSource};
use crate::mode::{ControlMode, LoopSide};

/// Default inner-loop sample period.
pub const DEFAULT_SAMPLE_TIME_MS: u64 = 2_500;

/// Default outer-to-inner period multiplier. Recommended range is 3-5: the
/// outer loop must be slow enough for the inner loop to track its setpoint.
pub const DEFAULT_OUTER_SAMPLE_FACTOR: u32 = 4;

const INNER_OUT_MIN: f64 = 0.0;
const INNER_OUT_MAX: f64 = 1.0;
const OUTER_OUT_MIN: f64 = 0.0;
const OUTER_OUT_MAX: f64 = 90.0;

/// Cascade-capable control loop orchestrator.
///
/// Construction wires the collaborators; the operating strategy, setpoint,
/// band, limits, tunings and timing are all mutated through setters while
/// the loop runs. Power starts off: nothing computes and nothing is
/// actuated until [`ControlLoop::set_on`].
pub struct ControlLoop {
    inner: Pid,
    outer: Pid,

    inner_source: Option<Box<dyn DataSource>>,
    outer_source: Box<dyn DataSource>,
    sink: Box<dyn ActuatorSink>,
    clock: Rc<dyn MonotonicClock>,

    mode: ControlMode,
    is_on: bool,

    setpoint: f64,
    band_low: f64,
    band_high: f64,

    bang_bang: bool,
    bang_lower: f64,
    bang_upper: f64,

    // Inner-loop clamp range, reused as the override/on-off extremes.
    out_min: f64,
    out_max: f64,

    sample_time_ms: u64,
    outer_factor: u32,

    inner_measured: f64,
    outer_measured: f64,
}

impl ControlLoop {
    /// Create a loop with independent inner and outer sensors (cascade
    /// operation reads both; the other modes read only the outer one).
    pub fn new(
        inner_source: Box<dyn DataSource>,
        outer_source: Box<dyn DataSource>,
        sink: Box<dyn ActuatorSink>,
        clock: Rc<dyn MonotonicClock>,
        setpoint: f64,
    ) -> Self {
        Self::build(Some(inner_source), outer_source, sink, clock, setpoint)
    }

    /// Create a loop with a single physical sensor serving both roles.
    pub fn single_source(
        source: Box<dyn DataSource>,
        sink: Box<dyn ActuatorSink>,
        clock: Rc<dyn MonotonicClock>,
        setpoint: f64,
    ) -> Self {
        Self::build(None, source, sink, clock, setpoint)
    }

    fn build(
        inner_source: Option<Box<dyn DataSource>>,
        outer_source: Box<dyn DataSource>,
        sink: Box<dyn ActuatorSink>,
        clock: Rc<dyn MonotonicClock>,
        setpoint: f64,
    ) -> Self {
        let inner = default_pid(INNER_OUT_MIN, INNER_OUT_MAX, DEFAULT_SAMPLE_TIME_MS);
        let outer = default_pid(
            OUTER_OUT_MIN,
            OUTER_OUT_MAX,
            DEFAULT_SAMPLE_TIME_MS * u64::from(DEFAULT_OUTER_SAMPLE_FACTOR),
        );

        let mut control = Self {
            inner,
            outer,
            inner_source,
            outer_source,
            sink,
            clock,
            mode: ControlMode::SingleLoop,
            is_on: false,
            setpoint,
            band_low: setpoint,
            band_high: setpoint,
            bang_bang: false,
            bang_lower: 0.0,
            bang_upper: 0.0,
            out_min: INNER_OUT_MIN,
            out_max: INNER_OUT_MAX,
            sample_time_ms: DEFAULT_SAMPLE_TIME_MS,
            outer_factor: DEFAULT_OUTER_SAMPLE_FACTOR,
            inner_measured: 0.0,
            outer_measured: 0.0,
        };
        control.set_control_type(ControlMode::SingleLoop);
        control.update_inputs();
        control
    }

    /// Run one control cycle.
    ///
    /// Returns `true` iff the actuator command changed this cycle; the new
    /// command has then already been forwarded to the sink.
    pub fn compute(&mut self) -> bool {
        self.update_inputs();
        let now_ms = self.clock.now_ms();

        if !self.is_on {
            trace!(mode = ?self.mode, "power off, cycle skipped");
            return false;
        }

        let updated = match self.mode {
            ControlMode::OnOff => self.compute_on_off(),
            ControlMode::SingleLoop => self.compute_single_loop(now_ms),
            ControlMode::Cascade => self.compute_cascade(now_ms),
        };

        if updated {
            self.sink.update(self.inner.output());
        }
        trace!(
            mode = ?self.mode,
            measured = self.inner_measured,
            command = self.inner.output(),
            updated,
            "cycle"
        );
        updated
    }

    /// Refresh the measured values from the sensors and mirror them into
    /// the controllers' input slots.
    fn update_inputs(&mut self) {
        match self.mode {
            ControlMode::Cascade => {
                self.outer_measured = self.outer_source.get();
                self.inner_measured = match self.inner_source.as_mut() {
                    Some(source) => source.get(),
                    // Single physical sensor: inner aliases the outer feed.
                    None => self.outer_measured,
                };
            }
            ControlMode::SingleLoop | ControlMode::OnOff => {
                // One physical sensor in these modes; both loops see it.
                self.outer_measured = self.outer_source.get();
                self.inner_measured = self.outer_measured;
            }
        }
        self.inner.set_input(self.inner_measured);
        self.outer.set_input(self.outer_measured);
    }

    /// Two-point control. The command only ever takes the extreme values;
    /// between the thresholds it holds, so a rising process keeps rising
    /// and a falling one keeps falling until it crosses out.
    fn compute_on_off(&mut self) -> bool {
        if self.bang_bang {
            if self.inner_measured < self.band_low {
                self.inner.set_output(self.out_max);
            } else if self.inner_measured > self.band_high {
                self.inner.set_output(self.out_min);
            }
            // Inside the band: hold the previous command.
        } else {
            if self.inner_measured < self.setpoint {
                self.inner.set_output(self.out_max);
            } else if self.inner_measured > self.setpoint {
                self.inner.set_output(self.out_min);
            }
            // Exactly at the setpoint: hold.
        }
        true
    }

    fn compute_single_loop(&mut self, now_ms: u64) -> bool {
        if self.apply_band_override() {
            return true;
        }
        self.inner.compute(now_ms)
    }

    fn compute_cascade(&mut self, now_ms: u64) -> bool {
        if self.apply_band_override() {
            return true;
        }
        let outer_ran = self.outer.compute(now_ms);
        // The outer output feeds the inner setpoint every cycle, whether or
        // not the outer loop recomputed: between samples it holds its last
        // value, and before its first sample it holds the pinned setpoint.
        self.inner.set_setpoint(self.outer.output());
        let inner_ran = self.inner.compute(now_ms);
        inner_ran || outer_ran
    }

    /// Bang-bang override: force the command to an extreme when the inner
    /// measurement leaves the band. Checked before continuous control so an
    /// excursion wins regardless of the controllers' sample gates. Only the
    /// inner measurement is consulted, in cascade mode too: the inner
    /// variable is the directly-actuated, safety-relevant one.
    fn apply_band_override(&mut self) -> bool {
        if !self.bang_bang {
            return false;
        }
        if self.inner_measured < self.band_low {
            trace!(measured = self.inner_measured, "below band, forcing maximum");
            self.inner.set_output(self.out_max);
            true
        } else if self.inner_measured > self.band_high {
            trace!(measured = self.inner_measured, "above band, forcing minimum");
            self.inner.set_output(self.out_min);
            true
        } else {
            false
        }
    }

    /// Switch the operating strategy and re-wire controller run modes.
    ///
    /// Calling this with the current mode is harmless and re-pins the
    /// setpoint links; [`ControlLoop::set_point`] relies on that.
    pub fn set_control_type(&mut self, mode: ControlMode) {
        self.mode = mode;
        match mode {
            ControlMode::OnOff => {
                self.inner.set_mode(RunMode::Manual);
                self.outer.set_mode(RunMode::Manual);
            }
            ControlMode::SingleLoop => {
                self.inner.set_mode(RunMode::Automatic);
                self.outer.set_mode(RunMode::Manual);
                // Pin the outer-output/inner-setpoint link to the setpoint,
                // bypassing the outer loop entirely.
                self.outer.set_output(self.setpoint);
                self.inner.set_setpoint(self.setpoint);
            }
            ControlMode::Cascade => {
                self.inner.set_mode(RunMode::Automatic);
                self.outer.set_mode(RunMode::Automatic);
                // The outer loop starts from the setpoint on both ends of
                // the link; its first compute then takes over the inner
                // setpoint.
                self.outer.set_setpoint(self.setpoint);
                self.outer.set_output(self.setpoint);
                self.inner.set_setpoint(self.setpoint);
            }
        }
    }

    /// Store a new target value, recompute the hysteresis band from the
    /// current margins and refresh the mode's pinned links.
    pub fn set_point(&mut self, value: f64) {
        self.setpoint = value;
        self.band_low = value - self.bang_lower;
        self.band_high = value + self.bang_upper;
        self.set_control_type(self.mode);
    }

    /// Set the hysteresis band margins around the setpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidArg`] unless both margins are strictly
    /// positive and finite; the previous band stays in effect.
    pub fn set_bang_bang_range(&mut self, lower: f64, upper: f64) -> LoopResult<()> {
        if !(lower.is_finite() && upper.is_finite() && lower > 0.0 && upper > 0.0) {
            return Err(LoopError::InvalidArg {
                what: "bang-bang margins must be positive",
            });
        }
        self.bang_lower = lower;
        self.bang_upper = upper;
        self.set_point(self.setpoint);
        Ok(())
    }

    /// Symmetric convenience for [`ControlLoop::set_bang_bang_range`].
    pub fn set_bang_bang_margin(&mut self, margin: f64) -> LoopResult<()> {
        self.set_bang_bang_range(margin, margin)
    }

    pub fn enable_bang_bang(&mut self) {
        self.bang_bang = true;
    }

    pub fn disable_bang_bang(&mut self) {
        self.bang_bang = false;
    }

    pub fn bang_bang_enabled(&self) -> bool {
        self.bang_bang
    }

    /// Power the loop on: signal the actuator, then enable automatic
    /// computation on the controllers the current mode uses.
    pub fn set_on(&mut self) {
        self.set_on_off(true);
    }

    /// Power the loop off: signal the actuator and leave both controllers
    /// manual. Takes effect on the next compute cycle.
    pub fn set_off(&mut self) {
        self.set_on_off(false);
    }

    fn set_on_off(&mut self, turn_on: bool) {
        // Drop to manual first; the on-path below re-enables per mode. The
        // manual-to-automatic transition re-initializes each controller
        // from its current output, so the handover is bumpless.
        self.inner.set_mode(RunMode::Manual);
        self.outer.set_mode(RunMode::Manual);
        self.is_on = turn_on;

        if turn_on {
            self.sink.on();
            match self.mode {
                ControlMode::OnOff => {}
                ControlMode::SingleLoop => {
                    self.inner.set_mode(RunMode::Automatic);
                }
                ControlMode::Cascade => {
                    self.inner.set_mode(RunMode::Automatic);
                    self.outer.set_mode(RunMode::Automatic);
                }
            }
        } else {
            self.sink.off();
        }
    }

    /// Set a controller's output clamp range. Inner-loop limits double as
    /// the bang-bang override and on/off extremes.
    pub fn set_output_limits(&mut self, side: LoopSide, min: f64, max: f64) -> LoopResult<()> {
        self.controller_mut(side).set_output_limits(min, max)?;
        if side == LoopSide::Inner {
            self.out_min = min;
            self.out_max = max;
        }
        Ok(())
    }

    /// Set the inner-loop sample period and push the scaled period to the
    /// outer loop.
    pub fn set_sample_time(&mut self, ms: u64) -> LoopResult<()> {
        if ms == 0 {
            return Err(LoopError::InvalidArg {
                what: "sample time must be positive",
            });
        }
        self.sample_time_ms = ms;
        self.inner.set_sample_time(ms)?;
        self.outer
            .set_sample_time(ms * u64::from(self.outer_factor))?;
        Ok(())
    }

    /// Set the outer-to-inner period multiplier.
    pub fn set_outer_sample_factor(&mut self, factor: u32) -> LoopResult<()> {
        if factor == 0 {
            return Err(LoopError::InvalidArg {
                what: "outer sample factor must be positive",
            });
        }
        self.outer_factor = factor;
        self.outer
            .set_sample_time(self.sample_time_ms * u64::from(factor))?;
        Ok(())
    }

    /// Set a controller's actuation sense.
    pub fn set_direction(&mut self, side: LoopSide, direction: Direction) {
        self.controller_mut(side).set_direction(direction);
    }

    /// Relay-style convenience: `true` selects direct action (output rises
    /// with positive error), `false` reverse.
    pub fn set_direction_increase(&mut self, side: LoopSide, increase: bool) {
        let direction = if increase {
            Direction::Direct
        } else {
            Direction::Reverse
        };
        self.set_direction(side, direction);
    }

    pub fn direction_increase(&self, side: LoopSide) -> bool {
        self.controller(side).direction() == Direction::Direct
    }

    /// Replace a controller's gains.
    pub fn set_tunings(&mut self, side: LoopSide, kp: f64, ki: f64, kd: f64) -> LoopResult<()> {
        self.controller_mut(side).set_tunings(kp, ki, kd)?;
        Ok(())
    }

    /// Inner-loop convenience for [`ControlLoop::set_tunings`].
    pub fn set_inner_tunings(&mut self, kp: f64, ki: f64, kd: f64) -> LoopResult<()> {
        self.set_tunings(LoopSide::Inner, kp, ki, kd)
    }

    pub fn kp(&self, side: LoopSide) -> f64 {
        self.controller(side).kp()
    }

    pub fn ki(&self, side: LoopSide) -> f64 {
        self.controller(side).ki()
    }

    pub fn kd(&self, side: LoopSide) -> f64 {
        self.controller(side).kd()
    }

    // Introspection.

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// The live inner setpoint while cascading (driven by the outer loop),
    /// `None` in the other modes where it is pinned.
    pub fn inner_setpoint(&self) -> Option<f64> {
        if self.mode == ControlMode::Cascade {
            Some(self.inner.setpoint())
        } else {
            None
        }
    }

    /// The hysteresis band as `(low, high)`.
    pub fn band(&self) -> (f64, f64) {
        (self.band_low, self.band_high)
    }

    pub fn bang_bang_lower(&self) -> f64 {
        self.bang_lower
    }

    pub fn bang_bang_upper(&self) -> f64 {
        self.bang_upper
    }

    pub fn control_type(&self) -> ControlMode {
        self.mode
    }

    pub fn is_control_on_off(&self) -> bool {
        self.mode == ControlMode::OnOff
    }

    pub fn is_control_single_loop(&self) -> bool {
        self.mode == ControlMode::SingleLoop
    }

    pub fn is_control_cascade(&self) -> bool {
        self.mode == ControlMode::Cascade
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// The last actuator command (held between updates).
    pub fn command(&self) -> f64 {
        self.inner.output()
    }

    pub fn base_sample_time_ms(&self) -> u64 {
        self.sample_time_ms
    }

    pub fn outer_sample_factor(&self) -> u32 {
        self.outer_factor
    }

    /// A controller's effective sample period.
    pub fn sample_time_ms(&self, side: LoopSide) -> u64 {
        self.controller(side).sample_time_ms()
    }

    fn controller(&self, side: LoopSide) -> &Pid {
        match side {
            LoopSide::Inner => &self.inner,
            LoopSide::Outer => &self.outer,
        }
    }

    fn controller_mut(&mut self, side: LoopSide) -> &mut Pid {
        match side {
            LoopSide::Inner => &mut self.inner,
            LoopSide::Outer => &mut self.outer,
        }
    }
}

/// Baseline controller: unity proportional gain, manual, given clamp range
/// and period. The constants are static and satisfy every setter guard.
fn default_pid(out_min: f64, out_max: f64, sample_ms: u64) -> Pid {
    let mut pid =
        Pid::new(1.0, 0.0, 0.0, Direction::Direct).expect("unity tunings are valid");
    pid.set_output_limits(out_min, out_max)
        .expect("static limits are ordered");
    pid.set_sample_time(sample_ms)
        .expect("static sample time is positive");
    pid
}


#[cfg(test)]
mod proptests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use cf_core::clock::ManualClock;
    use proptest::prelude::*;

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

    proptest! {
        #[test]
        fn hysteresis_holds_inside_band(inside in 45.0_f64..=55.0, prime in prop::bool::ANY) {
            let value = Rc::new(Cell::new(0.0));
            let clock = Rc::new(ManualClock::new(0));
            let mut control = ControlLoop::single_source(
                Box::new(CellSource(Rc::clone(&value))),
                Box::new(NullSink),
                clock,
                50.0,
            );
            control.set_bang_bang_range(5.0, 5.0).unwrap();
            control.enable_bang_bang();
            control.set_control_type(ControlMode::OnOff);
            control.set_on();

            // Drive the command to a known extreme from either side.
            value.set(if prime { 40.0 } else { 60.0 });
            prop_assert!(control.compute());
            let held = control.command();

            // Any measurement inside the band leaves the command alone.
            value.set(inside);
            prop_assert!(control.compute());
            prop_assert_eq!(control.command(), held);
        }

        #[test]
        fn band_tracks_setpoint_and_margins(
            sp in -100.0_f64..100.0,
            lower in 0.1_f64..20.0,
            upper in 0.1_f64..20.0,
        ) {
            let value = Rc::new(Cell::new(0.0));
            let clock = Rc::new(ManualClock::new(0));
            let mut control = ControlLoop::single_source(
                Box::new(CellSource(Rc::clone(&value))),
                Box::new(NullSink),
                clock,
                0.0,
            );
            control.set_bang_bang_range(lower, upper).unwrap();
            control.set_point(sp);
            let (low, high) = control.band();
            prop_assert_eq!(low, sp - lower);
            prop_assert_eq!(high, sp + upper);
        }
    }
}
