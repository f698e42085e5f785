//! Balancing supervisor.
//!
//! Runs one balancing session end to end:
//!
//! 1. Command zero speed, report the battery voltage and any controller
//!    error that would keep the motor from moving.
//! 2. Start both encoder samplers and wait until the pendulum (hanging
//!    down at start) has been raised to `raise_angle_deg ± tolerance`.
//! 3. Re-zero the pendulum so vertical reads 0 and zero the motor counter,
//!    wait until both samplers publish the new positions, then put the
//!    controller in Automatic and start its task.
//! 4. Until the run time elapses (or a stop is requested), turn the
//!    controller output into a motor speed and push status lines.
//! 5. Stop the motor, stop and join every task, stop the motor again and
//!    report the battery voltage.

use crate::control::{ControlLaw, Controller, ControllerHandle, Mode};
use crate::inputs::EncoderInputs;
use pendulum_common::config::{BalanceConfig, MotorConfig};
use pendulum_common::hal::HalError;
use pendulum_common::status::{StatusSink, status_text};
use pendulum_common::task::{StopSignal, TaskError};
use pendulum_hal::encoder::{EncoderChannel, QuadratureCounter};
use pendulum_hal::smc::{SerialTransport, SmcErrorStatus, SmcLink};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Supervisor iterations between timing reports.
pub const STATS_EVERY: u64 = 1000;

/// Longest wait for the samplers to publish a re-zero.
pub const REZERO_TIMEOUT: Duration = Duration::from_secs(1);
const REZERO_POLL: Duration = Duration::from_micros(50);

/// Status screen cells.
const STATUS_COL: u8 = 18;
const ROW_PENDULUM: u8 = 24;
const ROW_MOTOR: u8 = 32;
const ROW_SPEED: u8 = 40;

/// Errors that end a balancing session.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("hardware: {0}")]
    Hal(#[from] HalError),

    #[error("task: {0}")]
    Task(#[from] TaskError),

    #[error("encoders did not publish the re-zeroed position within {0:?}")]
    RezeroTimeout(Duration),
}

/// Turn a controller output into a motor speed command.
///
/// The motor does not move below `dead_band`, so a non-zero output is
/// pushed out by `sign(output) · dead_band`. The result is clamped to
/// `±max_speed`. Beyond `cutoff_deg` of tilt the command is zero.
#[inline]
pub fn shape_speed(output: f64, dead_band: i32, max_speed: i32, angle_deg: f64, cutoff_deg: f64) -> i32 {
    if angle_deg.is_nan() || angle_deg.abs() > cutoff_deg {
        return 0;
    }
    let offset = if output > 0.0 {
        dead_band
    } else if output < 0.0 {
        -dead_band
    } else {
        0
    };
    (output as i32).saturating_add(offset).clamp(-max_speed, max_speed)
}

/// Supervisor loop timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    count: u64,
    total: Duration,
    max: Duration,
}

impl LoopStats {
    /// Record one iteration. Returns `true` every [`STATS_EVERY`] iterations.
    #[inline]
    pub fn record(&mut self, elapsed: Duration) -> bool {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        self.count % STATS_EVERY == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean iteration time.
    pub fn avg(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }
}

/// What happened during a session.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// The controller ran for the full run time.
    pub completed: bool,
    /// Supervisor loop timing.
    pub stats: LoopStats,
    /// Speed commands that failed on the wire.
    pub send_failures: u64,
    /// Battery voltage before the session [V].
    pub battery_before: Option<f64>,
    /// Battery voltage after the session [V].
    pub battery_after: Option<f64>,
    /// Controller error status read before the session.
    pub error_status: Option<SmcErrorStatus>,
}

/// One balancing session over a pair of encoders and a motor link.
pub struct Balancer<C: QuadratureCounter, T: SerialTransport, S: StatusSink> {
    config: BalanceConfig,
    dead_band: i32,
    max_speed: i32,
    pendulum: EncoderChannel<C>,
    motor: EncoderChannel<C>,
    smc: Arc<SmcLink<T>>,
    status: S,
    stop: StopSignal,
}

impl<C: QuadratureCounter, T: SerialTransport, S: StatusSink> Balancer<C, T, S> {
    pub fn new(
        config: BalanceConfig,
        motor_config: &MotorConfig,
        pendulum: EncoderChannel<C>,
        motor: EncoderChannel<C>,
        smc: Arc<SmcLink<T>>,
        status: S,
    ) -> Self {
        Self {
            config,
            dead_band: motor_config.dead_band,
            max_speed: motor_config.max_speed,
            pendulum,
            motor,
            smc,
            status,
            stop: StopSignal::new(),
        }
    }

    /// Controller inputs wired to this session's encoders.
    pub fn inputs(&self) -> EncoderInputs {
        EncoderInputs::new(self.pendulum.reader(), self.motor.reader())
    }

    /// Requesting this signal ends the session early but cleanly.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run the session with `controller`, which must read [`Self::inputs`].
    pub fn run<L: ControlLaw>(
        mut self,
        mut controller: Controller<L, EncoderInputs>,
    ) -> Result<RunSummary, BalanceError> {
        let mut summary = RunSummary::default();

        self.command_speed(0, &mut summary);
        info!("Exit safe start: {}", self.smc.is_safe_start_exited());
        summary.battery_before = self.battery_voltage();
        summary.error_status = self.error_status();

        self.pendulum.run()?;
        self.motor.run()?;

        if !self.wait_for_raise() {
            info!("Stopped before the pendulum was raised");
            self.shutdown(None, &mut summary)?;
            return Ok(summary);
        }

        let angle = self.pendulum.reader().angle_deg();
        let offset = angle - self.config.raise_angle_deg * angle.signum();
        self.pendulum.set_deg(offset)?;
        self.motor.set_position(0)?;

        match self.await_rezero() {
            Ok(true) => {}
            Ok(false) => {
                info!("Stopped before the encoders were re-zeroed");
                self.shutdown(None, &mut summary)?;
                return Ok(summary);
            }
            Err(e) => {
                self.shutdown(None, &mut summary)?;
                return Err(e);
            }
        }

        // Seeds the bumpless transfer from the re-zeroed snapshot.
        controller.set_mode_at(Mode::Automatic, Instant::now());
        let handle = controller.run()?;
        info!("Controller running");
        self.status.write(4, 2, "Controller Running");

        let run_time = Duration::try_from_secs_f64(self.config.run_duration_s).unwrap_or_default();
        let period = Duration::from_micros(self.config.loop_period_us);
        let status_every = u64::from(self.config.status_every.max(1));
        let pendulum = self.pendulum.reader();
        let motor = self.motor.reader();
        let start = Instant::now();

        while !self.stop.is_requested() {
            let iteration = Instant::now();
            if iteration.duration_since(start) >= run_time {
                summary.completed = true;
                break;
            }

            let angle_deg = pendulum.angle_deg();
            let speed = shape_speed(
                handle.output(),
                self.dead_band,
                self.max_speed,
                angle_deg,
                self.config.tilt_cutoff_deg,
            );
            self.command_speed(speed, &mut summary);

            if summary.stats.count() % status_every == 0 {
                self.status
                    .write(ROW_PENDULUM, STATUS_COL, &status_text(format_args!("{angle_deg:.2}")));
                self.status
                    .write(ROW_MOTOR, STATUS_COL, &status_text(format_args!("{:.3}", motor.angle())));
                self.status
                    .write(ROW_SPEED, STATUS_COL, &status_text(format_args!("{speed}")));
                self.status.refresh();
            }

            if summary.stats.record(iteration.elapsed()) {
                debug!(
                    "Supervisor loop: {} iterations, avg={:?}, max={:?}",
                    summary.stats.count(),
                    summary.stats.avg(),
                    summary.stats.max()
                );
            }
            thread::sleep(period);
        }

        self.shutdown(Some(handle), &mut summary)?;
        Ok(summary)
    }

    /// Block until the pendulum is in the raise window. `false` if a stop
    /// was requested first.
    fn wait_for_raise(&self) -> bool {
        let reader = self.pendulum.reader();
        let poll = Duration::from_micros(self.config.loop_period_us);
        let target = self.config.raise_angle_deg;
        let tolerance = self.config.raise_tolerance_deg;
        info!("Waiting for the pendulum to reach {target}° ± {tolerance}°");

        while !self.stop.is_requested() {
            let angle = reader.angle_deg();
            if (angle.abs() - target).abs() <= tolerance {
                info!("Pendulum raised ({angle:.2}°)");
                return true;
            }
            self.status
                .write(ROW_PENDULUM, STATUS_COL, &status_text(format_args!("{angle:.2}")));
            self.status.refresh();
            thread::sleep(poll);
        }
        false
    }

    /// Block until both samplers have published a sample taken after the
    /// re-zero. `false` if a stop was requested first.
    fn await_rezero(&self) -> Result<bool, BalanceError> {
        let deadline = Instant::now() + REZERO_TIMEOUT;
        while !(self.pendulum.rezero_published() && self.motor.rezero_published()) {
            if self.stop.is_requested() {
                return Ok(false);
            }
            if Instant::now() >= deadline {
                return Err(BalanceError::RezeroTimeout(REZERO_TIMEOUT));
            }
            thread::sleep(REZERO_POLL);
        }
        Ok(true)
    }

    fn shutdown(
        &mut self,
        controller: Option<ControllerHandle>,
        summary: &mut RunSummary,
    ) -> Result<(), BalanceError> {
        self.command_speed(0, summary);

        let controller_result = controller.map_or(Ok(()), |h| h.stop_and_join());
        self.pendulum.stop();
        self.motor.stop();
        let pendulum_result = self.pendulum.join();
        let motor_result = self.motor.join();

        self.command_speed(0, summary);
        summary.battery_after = self.battery_voltage();

        info!(
            "Done: {} iterations, avg={:?}, max={:?}, {} failed speed commands",
            summary.stats.count(),
            summary.stats.avg(),
            summary.stats.max(),
            summary.send_failures
        );

        controller_result?;
        pendulum_result?;
        motor_result?;
        Ok(())
    }

    fn command_speed(&self, speed: i32, summary: &mut RunSummary) {
        if let Err(e) = self.smc.set_target_speed(speed) {
            summary.send_failures += 1;
            if summary.send_failures == 1 || summary.send_failures % 1000 == 0 {
                warn!(
                    "{}: speed {speed} not sent: {e} ({} failures)",
                    self.smc.label(),
                    summary.send_failures
                );
            }
        }
    }

    fn error_status(&self) -> Option<SmcErrorStatus> {
        match self.smc.error_status() {
            Ok(status) if status.blocks_motion() => {
                warn!("{}: motor controller reports {status:?}", self.smc.label());
                Some(status)
            }
            Ok(status) => Some(status),
            Err(e) => {
                warn!("{}: error status unavailable: {e}", self.smc.label());
                None
            }
        }
    }

    fn battery_voltage(&self) -> Option<f64> {
        match self.smc.input_voltage() {
            Ok(v) => {
                info!("Battery voltage: {v:.2}V");
                Some(v)
            }
            Err(e) => {
                warn!("{}: battery voltage unavailable: {e}", self.smc.label());
                None
            }
        }
    }
}
