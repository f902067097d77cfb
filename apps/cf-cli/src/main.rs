use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use cf_core::clock::{ManualClock, MonotonicClock};
use cf_loop::{ActuatorSink, ControlLoop, ControlMode, DataSource, LoopSide};
use cf_sim::{SlowValveTank, TankModel};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "cf-cli")]
#[command(about = "Cascadeflow CLI - closed-loop control over simulated tank plants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay control with a hysteresis band around the setpoint
    OnOff {
        /// Target level (litres)
        #[arg(long, default_value_t = 10.0)]
        setpoint: f64,
        /// Symmetric hysteresis margin (litres)
        #[arg(long, default_value_t = 1.0)]
        band: f64,
        /// Simulated duration in seconds
        #[arg(long, default_value_t = 300.0)]
        t_end: f64,
        /// Simulation step in seconds
        #[arg(long, default_value_t = 1.0)]
        dt: f64,
    },
    /// Single continuous loop on the tank level
    Single {
        /// Target level (litres)
        #[arg(long, default_value_t = 10.0)]
        setpoint: f64,
        #[arg(long, default_value_t = 0.5)]
        kp: f64,
        #[arg(long, default_value_t = 0.05)]
        ki: f64,
        #[arg(long, default_value_t = 0.0)]
        kd: f64,
        /// Controller sample period in milliseconds
        #[arg(long, default_value_t = 1_000)]
        sample_ms: u64,
        /// Simulated duration in seconds
        #[arg(long, default_value_t = 600.0)]
        t_end: f64,
        /// Simulation step in seconds
        #[arg(long, default_value_t = 1.0)]
        dt: f64,
    },
    /// Cascade: a level loop steering a stem-position loop through a slow valve
    Cascade {
        /// Target level (litres)
        #[arg(long, default_value_t = 10.0)]
        setpoint: f64,
        /// Inner (stem) sample period in milliseconds
        #[arg(long, default_value_t = 500)]
        sample_ms: u64,
        /// Outer period as a multiple of the inner one
        #[arg(long, default_value_t = 4)]
        factor: u32,
        /// Simulated duration in seconds
        #[arg(long, default_value_t = 1_200.0)]
        t_end: f64,
        /// Simulation step in seconds
        #[arg(long, default_value_t = 0.5)]
        dt: f64,
    },
}

fn main() -> CliResult {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::OnOff {
            setpoint,
            band,
            t_end,
            dt,
        } => cmd_on_off(setpoint, band, t_end, dt),
        Commands::Single {
            setpoint,
            kp,
            ki,
            kd,
            sample_ms,
            t_end,
            dt,
        } => cmd_single(setpoint, kp, ki, kd, sample_ms, t_end, dt),
        Commands::Cascade {
            setpoint,
            sample_ms,
            factor,
            t_end,
            dt,
        } => cmd_cascade(setpoint, sample_ms, factor, t_end, dt),
    }
}

struct TankSensor(Rc<RefCell<TankModel>>);

impl DataSource for TankSensor {
    fn get(&mut self) -> f64 {
        self.0.borrow().level()
    }
}

struct TankActuator(Rc<RefCell<TankModel>>);

impl ActuatorSink for TankActuator {
    fn on(&mut self) {}

    fn off(&mut self) {
        self.0.borrow_mut().set_valve_opening(0.0);
    }

    fn update(&mut self, value: f64) {
        self.0.borrow_mut().set_valve_opening(value);
    }
}

fn cmd_on_off(setpoint: f64, band: f64, t_end: f64, dt: f64) -> CliResult {
    let tank = Rc::new(RefCell::new(TankModel::new(60.0, 6.0)?));
    let clock = Rc::new(ManualClock::new(0));
    let clock_dyn: Rc<dyn MonotonicClock> = clock.clone();

    let mut control = ControlLoop::single_source(
        Box::new(TankSensor(Rc::clone(&tank))),
        Box::new(TankActuator(Rc::clone(&tank))),
        Rc::clone(&clock_dyn),
        setpoint,
    );
    control.set_bang_bang_range(band, band)?;
    control.enable_bang_bang();
    control.set_control_type(ControlMode::OnOff);
    control.set_on();

    run_scenario(&mut control, t_end, dt, &clock, |control| {
        let mut tank = tank.borrow_mut();
        tank.advance(dt);
        (tank.level(), control.command())
    })
}

fn cmd_single(
    setpoint: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    sample_ms: u64,
    t_end: f64,
    dt: f64,
) -> CliResult {
    let tank = Rc::new(RefCell::new(TankModel::new(60.0, 6.0)?));
    let clock = Rc::new(ManualClock::new(0));
    let clock_dyn: Rc<dyn MonotonicClock> = clock.clone();

    let mut control = ControlLoop::single_source(
        Box::new(TankSensor(Rc::clone(&tank))),
        Box::new(TankActuator(Rc::clone(&tank))),
        Rc::clone(&clock_dyn),
        setpoint,
    );
    control.set_sample_time(sample_ms)?;
    control.set_inner_tunings(kp, ki, kd)?;
    control.set_on();

    run_scenario(&mut control, t_end, dt, &clock, |control| {
        let mut tank = tank.borrow_mut();
        tank.advance(dt);
        (tank.level(), control.command())
    })
}

struct LevelSensor(Rc<RefCell<SlowValveTank>>);

impl DataSource for LevelSensor {
    fn get(&mut self) -> f64 {
        self.0.borrow().level()
    }
}

struct StemSensor(Rc<RefCell<SlowValveTank>>);

impl DataSource for StemSensor {
    fn get(&mut self) -> f64 {
        self.0.borrow().valve_position()
    }
}

struct StemActuator(Rc<RefCell<SlowValveTank>>);

impl ActuatorSink for StemActuator {
    fn on(&mut self) {}

    fn off(&mut self) {
        self.0.borrow_mut().command_valve(0.0);
    }

    fn update(&mut self, value: f64) {
        self.0.borrow_mut().command_valve(value);
    }
}

fn cmd_cascade(setpoint: f64, sample_ms: u64, factor: u32, t_end: f64, dt: f64) -> CliResult {
    let plant = Rc::new(RefCell::new(SlowValveTank::new(60.0, 6.0, 1.0, 5.0)?));
    let clock = Rc::new(ManualClock::new(0));
    let clock_dyn: Rc<dyn MonotonicClock> = clock.clone();

    let mut control = ControlLoop::new(
        Box::new(StemSensor(Rc::clone(&plant))),
        Box::new(LevelSensor(Rc::clone(&plant))),
        Box::new(StemActuator(Rc::clone(&plant))),
        Rc::clone(&clock_dyn),
        setpoint,
    );
    control.set_output_limits(LoopSide::Outer, 0.0, 1.0)?;
    control.set_sample_time(sample_ms)?;
    control.set_outer_sample_factor(factor)?;
    control.set_tunings(LoopSide::Outer, 0.3, 0.02, 0.0)?;
    control.set_tunings(LoopSide::Inner, 2.0, 0.2, 0.0)?;
    control.set_control_type(ControlMode::Cascade);
    control.set_on();

    run_scenario(&mut control, t_end, dt, &clock, |control| {
        let mut plant = plant.borrow_mut();
        plant.advance(dt);
        (plant.level(), control.command())
    })
}

/// Step the closed loop and print a CSV time series on stdout.
fn run_scenario<F>(
    control: &mut ControlLoop,
    t_end: f64,
    dt: f64,
    clock: &Rc<ManualClock>,
    mut step_plant: F,
) -> CliResult
where
    F: FnMut(&ControlLoop) -> (f64, f64),
{
    if !(dt > 0.0 && dt.is_finite()) {
        return Err("dt must be positive".into());
    }
    if !(t_end >= 0.0 && t_end.is_finite()) {
        return Err("t_end must be non-negative".into());
    }

    println!("t_s,level_l,command");
    let steps = (t_end / dt).ceil() as u64;
    let dt_ms = (dt * 1000.0).round() as u64;
    for n in 0..steps {
        control.compute();
        let (level, command) = step_plant(control);
        println!("{:.1},{level:.4},{command:.4}", n as f64 * dt);
        clock.advance(dt_ms);
    }
    Ok(())
}
