//! # Pendulum
//!
//! Balances the inverted pendulum for one session.
//!
//! Loads `config/pendulum.toml` (defaults when absent), applies command
//! line overrides, checks that the required devices exist, performs RT
//! setup and runs the balancing supervisor. `--simulate` replaces the
//! encoders and the motor controller with simulated devices so the whole
//! loop runs off-target.

use clap::Parser;
use pendulum_common::consts::DEFAULT_CONFIG_PATH;
use pendulum_common::prelude::*;
use pendulum_control::balance::{Balancer, RunSummary};
use pendulum_control::control::Controller;
use pendulum_control::rt::rt_setup;
use pendulum_hal::encoder::{EncoderChannel, QuadratureCounter, SimulatedCounter};
use pendulum_hal::preflight::check_devices;
use pendulum_hal::smc::{SerialRegistry, SerialTransport, SimulatedSmc, SmcLink, TermiosPort};
use pendulum_hal::status::QueuedStatus;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Inverted pendulum balancer
#[derive(Parser, Debug)]
#[command(name = "pendulum")]
#[command(version)]
#[command(about = "Balance an inverted pendulum on a motor-driven arm")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Proportional gain (overrides [controller].kp).
    #[arg(long)]
    kp: Option<f64>,

    /// Integral gain (overrides [controller].ki).
    #[arg(long)]
    ki: Option<f64>,

    /// Derivative gain (overrides [controller].kd).
    #[arg(long)]
    kd: Option<f64>,

    /// Controller direction: direct, reverse, or the numeric flag 0/1.
    #[arg(long)]
    direction: Option<Direction>,

    /// Control law: basic, velocity or lqr.
    #[arg(long)]
    controller: Option<ControllerKind>,

    /// Run against simulated encoders and motor controller.
    #[arg(long)]
    simulate: bool,

    /// Skip the device pre-flight check.
    #[arg(long)]
    skip_preflight: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("Pendulum v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Pendulum shutdown complete");
}

/// Load the file (defaults when it does not exist) and apply CLI overrides.
fn load_config(args: &Args) -> Result<PendulumConfig, ConfigError> {
    let mut config = match PendulumConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) => PendulumConfig::default(),
        Err(e) => return Err(e),
    };

    let ctrl = &mut config.controller;
    if let Some(kind) = args.controller {
        ctrl.kind = kind;
    }
    if let Some(kp) = args.kp {
        ctrl.kp = kp;
    }
    if let Some(ki) = args.ki {
        ctrl.ki = ki;
    }
    if let Some(kd) = args.kd {
        ctrl.kd = kd;
    }
    if let Some(direction) = args.direction {
        ctrl.direction = direction;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: &Args, config: PendulumConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !args.config.exists() {
        warn!("{} not found, using built-in defaults", args.config.display());
    }
    let ctrl = &config.controller;
    info!(
        "Config OK: {:?} controller, kp={} ki={} kd={}, direction={:?}, sample={}ms",
        ctrl.kind, ctrl.kp, ctrl.ki, ctrl.kd, ctrl.direction, ctrl.sample_time_ms
    );

    if args.simulate || args.skip_preflight || !config.preflight.enabled {
        info!("Device pre-flight skipped");
    } else {
        info!("Checking required devices...");
        let report = check_devices(&config.preflight.devices, config.preflight.slots_path.as_deref());
        if !report.ready() {
            let missing: Vec<_> = report.missing().map(|p| p.display().to_string()).collect();
            return Err(format!("required devices unavailable: {}", missing.join(", ")).into());
        }
        info!("Devices OK");
    }

    let rt = &config.runtime;
    rt_setup(rt.cpu_core, rt.rt_priority)?;

    let (status, status_task) = QueuedStatus::spawn()?;

    let summary = if args.simulate {
        info!("Simulated hardware");
        let pendulum_counter = SimulatedCounter::new();
        // The simulated pendulum starts raised.
        pendulum_counter.set((config.encoders.pendulum_ppr() / 2.0).round() as i64);
        let pendulum =
            EncoderChannel::with_counter("sim-pendulum", pendulum_counter, config.encoders.pendulum_ppr())?;
        let motor =
            EncoderChannel::with_counter("sim-motor", SimulatedCounter::new(), config.encoders.motor_ppr())?;
        let smc = Arc::new(SmcLink::with_transport("sim-smc", SimulatedSmc::new())?);
        balance(&config, pendulum, motor, smc, status.clone())?
    } else {
        let enc = &config.encoders;
        let pendulum = EncoderChannel::new(enc.pendulum_channel, enc.pendulum_ppr())?;
        let motor = EncoderChannel::new(enc.motor_channel, enc.motor_ppr())?;
        let mut registry = SerialRegistry::<TermiosPort>::new();
        let smc = registry.get_or_open(&config.motor.tty)?;
        debug!("{} motor controller link(s) open", registry.len());
        balance(&config, pendulum, motor, smc, status.clone())?
    };

    if !summary.completed {
        info!("Session ended early");
    }
    if status.dropped() > 0 {
        warn!("{} status messages dropped", status.dropped());
    }
    status_task.stop_and_join()?;
    Ok(())
}

fn balance<C, T, S>(
    config: &PendulumConfig,
    pendulum: EncoderChannel<C>,
    motor: EncoderChannel<C>,
    smc: Arc<SmcLink<T>>,
    status: S,
) -> Result<RunSummary, Box<dyn std::error::Error>>
where
    C: QuadratureCounter,
    T: SerialTransport,
    S: StatusSink,
{
    let balancer = Balancer::new(config.balance.clone(), &config.motor, pendulum, motor, smc, status);

    let stop = balancer.stop_signal();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        stop.request();
    })?;

    let controller = Controller::from_config(&config.controller, balancer.inputs());
    info!("Using {:?} controller", config.controller.kind);
    Ok(balancer.run(controller)?)
}

/// Setup tracing subscriber based on CLI arguments and `[shared].log_level`.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        log_level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
