//! Control laws and the controller state machine.
//!
//! ## Structure
//!
//! - [`ControlLaw`]: the variant-specific part (how one output is computed
//!   from a state snapshot, how gains are scaled). Implemented by
//!   [`BasicPid`], [`VelocityPid`] and [`Lqr`], and by [`Law`], the closed
//!   set of all three selected at run time.
//! - [`ControllerCore`]: what every variant shares: mode, output limits,
//!   sample period, direction and the timestamp of the last computation.
//! - [`Controller`]: core + law + input source. Owns sample gating and
//!   bumpless Manual→Automatic transfer, and publishes its output, mode and
//!   display gains through atomics.
//!
//! ## Runtime changes
//!
//! Once [`Controller::run`] has moved the controller onto its task thread,
//! the returned [`ControllerHandle`] sends [`ControllerCommand`]s through a
//! bounded mailbox. The task drains the mailbox at the top of every
//! iteration, so live state has exactly one writer.
//!
//! ## Rejected settings
//!
//! Invalid limits, negative PID gains, gains of the wrong shape and a zero
//! sample period are silent no-ops (logged at `debug`). The previous
//! configuration stays active.

pub mod lqr;
pub mod pid;
pub mod velocity;

pub use lqr::Lqr;
pub use pid::{BasicPid, PidTunings};
pub use velocity::VelocityPid;

use crate::inputs::{ControlInputs, InputSource};
use pendulum_common::atomic::AtomicF64;
use pendulum_common::config::{ControllerConfig, ControllerKind, Direction};
use pendulum_common::consts::DEFAULT_SAMPLE_TIME_MS;
use pendulum_common::task::{self, Pacing, PeriodicTask, TaskError, TaskHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Pending runtime changes a running controller holds.
pub const MAILBOX_CAPACITY: usize = 16;

// ─── Shared types ───────────────────────────────────────────────────

/// Controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    /// Output frozen; external code owns it.
    #[default]
    Manual = 0,
    /// Output computed every sample period.
    Automatic = 1,
}

impl Mode {
    /// Map the legacy numeric flag (1 = automatic, anything else = manual).
    pub const fn from_flag(flag: i32) -> Self {
        if flag == 1 { Self::Automatic } else { Self::Manual }
    }

    const fn from_u8(v: u8) -> Self {
        if v == Self::Automatic as u8 {
            Self::Automatic
        } else {
            Self::Manual
        }
    }
}

/// Controller gains, in the shape of the variant they belong to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gains {
    /// Proportional, integral, derivative.
    Pid { kp: f64, ki: f64, kd: f64 },
    /// State feedback `[k1, k2, k3, k4]` over
    /// (pendulum angle, motor angle, pendulum velocity, motor velocity).
    Lqr([f64; 4]),
}

impl Gains {
    /// Flatten into four slots; PID leaves the last one at zero.
    pub const fn to_array(self) -> [f64; 4] {
        match self {
            Self::Pid { kp, ki, kd } => [kp, ki, kd, 0.0],
            Self::Lqr(k) => k,
        }
    }

    /// Inverse of [`Gains::to_array`] for a variant.
    pub const fn from_array(kind: ControllerKind, k: [f64; 4]) -> Self {
        match kind {
            ControllerKind::Lqr => Self::Lqr(k),
            ControllerKind::Basic | ControllerKind::Velocity => Self::Pid {
                kp: k[0],
                ki: k[1],
                kd: k[2],
            },
        }
    }

    /// Every gain is a finite number.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|k| k.is_finite())
    }
}

/// Closed output interval `[min, max]` with `min < max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputLimits {
    min: f64,
    max: f64,
}

impl OutputLimits {
    /// `None` unless `min < max` (which also rules out NaN).
    pub fn new(min: f64, max: f64) -> Option<Self> {
        (min < max).then_some(Self { min, max })
    }

    pub const fn min(&self) -> f64 {
        self.min
    }

    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Clamp `value` into the interval.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
        }
    }
}

// ─── Variant trait ──────────────────────────────────────────────────

/// The variant-specific part of a controller.
pub trait ControlLaw: Send + 'static {
    /// Which variant this is.
    fn kind(&self) -> ControllerKind;

    /// One evaluation. The result must already lie within `limits`.
    fn compute(&mut self, inputs: &ControlInputs, limits: &OutputLimits) -> f64;

    /// Prepare for bumpless entry into Automatic with `output` held.
    fn initialize(&mut self, _inputs: &ControlInputs, _output: f64, _limits: &OutputLimits) {}

    /// Install new display gains for the given sample period. Returns
    /// `false` (and changes nothing) if the gains are rejected. Live gains
    /// come out with Direct sign.
    fn set_tunings(&mut self, gains: Gains, sample_secs: f64) -> bool;

    /// Flip the sign of every live gain.
    fn negate_gains(&mut self);

    /// The sample period was multiplied by `ratio`.
    fn rescale_sample_time(&mut self, _ratio: f64) {}

    /// Limits changed; bring internal accumulators back inside.
    fn clamp_state(&mut self, _limits: &OutputLimits) {}

    /// Gains as entered by the user.
    fn display_gains(&self) -> Gains;

    /// Gains actually used by [`ControlLaw::compute`].
    fn live_gains(&self) -> Gains;
}

/// Any of the three control laws, chosen at run time.
#[derive(Debug, Clone)]
pub enum Law {
    Basic(BasicPid),
    Velocity(VelocityPid),
    Lqr(Lqr),
}

impl Law {
    /// Untuned law of `kind`.
    pub fn new(kind: ControllerKind, setpoint: f64, supply_voltage: f64) -> Self {
        match kind {
            ControllerKind::Basic => Self::Basic(BasicPid::new(setpoint)),
            ControllerKind::Velocity => Self::Velocity(VelocityPid::new(supply_voltage)),
            ControllerKind::Lqr => Self::Lqr(Lqr::new(supply_voltage)),
        }
    }

    fn as_dyn(&self) -> &dyn ControlLaw {
        match self {
            Self::Basic(l) => l,
            Self::Velocity(l) => l,
            Self::Lqr(l) => l,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn ControlLaw {
        match self {
            Self::Basic(l) => l,
            Self::Velocity(l) => l,
            Self::Lqr(l) => l,
        }
    }
}

impl ControlLaw for Law {
    fn kind(&self) -> ControllerKind {
        self.as_dyn().kind()
    }

    #[inline]
    fn compute(&mut self, inputs: &ControlInputs, limits: &OutputLimits) -> f64 {
        self.as_dyn_mut().compute(inputs, limits)
    }

    fn initialize(&mut self, inputs: &ControlInputs, output: f64, limits: &OutputLimits) {
        self.as_dyn_mut().initialize(inputs, output, limits);
    }

    fn set_tunings(&mut self, gains: Gains, sample_secs: f64) -> bool {
        self.as_dyn_mut().set_tunings(gains, sample_secs)
    }

    fn negate_gains(&mut self) {
        self.as_dyn_mut().negate_gains();
    }

    fn rescale_sample_time(&mut self, ratio: f64) {
        self.as_dyn_mut().rescale_sample_time(ratio);
    }

    fn clamp_state(&mut self, limits: &OutputLimits) {
        self.as_dyn_mut().clamp_state(limits);
    }

    fn display_gains(&self) -> Gains {
        self.as_dyn().display_gains()
    }

    fn live_gains(&self) -> Gains {
        self.as_dyn().live_gains()
    }
}

// ─── Shared state machine ───────────────────────────────────────────

/// State common to every variant.
#[derive(Debug, Clone)]
pub struct ControllerCore {
    mode: Mode,
    limits: OutputLimits,
    sample_time: Duration,
    direction: Direction,
    last_compute: Instant,
}

impl ControllerCore {
    fn new(now: Instant) -> Self {
        Self {
            mode: Mode::Manual,
            limits: OutputLimits::default(),
            sample_time: Duration::from_millis(u64::from(DEFAULT_SAMPLE_TIME_MS)),
            direction: Direction::Direct,
            last_compute: now,
        }
    }

    /// Whether a computation is due at `now`.
    #[inline]
    pub fn is_due(&self, now: Instant) -> bool {
        self.mode == Mode::Automatic
            && now.saturating_duration_since(self.last_compute) >= self.sample_time
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn limits(&self) -> OutputLimits {
        self.limits
    }

    pub fn sample_time(&self) -> Duration {
        self.sample_time
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Values a controller publishes for other tasks.
#[derive(Debug)]
struct ControllerShared {
    kind: ControllerKind,
    output: AtomicF64,
    mode: AtomicU8,
    direction: AtomicU8,
    gains: [AtomicF64; 4],
}

impl ControllerShared {
    fn new(kind: ControllerKind) -> Self {
        Self {
            kind,
            output: AtomicF64::new(0.0),
            mode: AtomicU8::new(Mode::Manual as u8),
            direction: AtomicU8::new(0),
            gains: Default::default(),
        }
    }
}

/// Read-only view of a controller, usable from any task.
#[derive(Debug, Clone)]
pub struct ControllerView {
    shared: Arc<ControllerShared>,
}

impl ControllerView {
    /// Latest published output.
    #[inline]
    pub fn output(&self) -> f64 {
        self.shared.output.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.shared.mode.load(Ordering::Acquire))
    }

    pub fn direction(&self) -> Direction {
        Direction::from_flag(i32::from(self.shared.direction.load(Ordering::Acquire)))
    }

    /// Display gains.
    pub fn gains(&self) -> Gains {
        let k = &self.shared.gains;
        Gains::from_array(
            self.shared.kind,
            [
                k[0].load(Ordering::Acquire),
                k[1].load(Ordering::Acquire),
                k[2].load(Ordering::Acquire),
                k[3].load(Ordering::Acquire),
            ],
        )
    }

    pub fn kind(&self) -> ControllerKind {
        self.shared.kind
    }
}

/// A control law bound to an input source.
pub struct Controller<L: ControlLaw, S: InputSource> {
    core: ControllerCore,
    law: L,
    inputs: S,
    output: f64,
    shared: Arc<ControllerShared>,
}

impl<S: InputSource> Controller<Law, S> {
    /// Build the controller described by `[controller]`.
    ///
    /// Settings are applied in the order tunings, direction, limits, sample
    /// time, so that gains are rescaled to the configured period.
    pub fn from_config(config: &ControllerConfig, inputs: S) -> Self {
        let law = Law::new(config.kind, config.setpoint, config.supply_voltage);
        let gains = match config.kind {
            ControllerKind::Lqr => Gains::Lqr(config.lqr_gains),
            ControllerKind::Basic | ControllerKind::Velocity => Gains::Pid {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
            },
        };
        let mut controller = Self::new(law, inputs, gains, config.direction);
        controller.set_output_limits(config.output_min, config.output_max);
        controller.set_sample_time(config.sample_time_ms);
        controller
    }
}

impl<L: ControlLaw, S: InputSource> Controller<L, S> {
    /// A Manual-mode controller with limits `[0, 100]` and a 100 ms period.
    pub fn new(law: L, inputs: S, gains: Gains, direction: Direction) -> Self {
        let shared = Arc::new(ControllerShared::new(law.kind()));
        let mut controller = Self {
            core: ControllerCore::new(Instant::now()),
            law,
            inputs,
            output: 0.0,
            shared,
        };
        controller.set_controller_direction(direction);
        controller.set_tunings(gains);
        controller.publish_state();
        controller
    }

    /// Switch mode at the current instant.
    pub fn set_mode(&mut self, mode: Mode) {
        self.set_mode_at(mode, Instant::now());
    }

    /// Switch mode as of `now`. Entering Automatic re-initializes the law
    /// from the current input and output (bumpless transfer).
    pub fn set_mode_at(&mut self, mode: Mode, now: Instant) {
        if mode == Mode::Automatic && self.core.mode == Mode::Manual {
            self.initialize_at(now);
        }
        self.core.mode = mode;
        self.shared.mode.store(mode as u8, Ordering::Release);
    }

    fn initialize_at(&mut self, now: Instant) {
        let inputs = self.inputs.sample();
        self.output = self.core.limits.clamp(self.output);
        self.law.initialize(&inputs, self.output, &self.core.limits);
        self.core.last_compute = now;
        self.shared.output.store(self.output, Ordering::Release);
    }

    /// Set output bounds. Ignored unless `min < max`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        let Some(limits) = OutputLimits::new(min, max) else {
            debug!("Rejected output limits [{min}, {max}]");
            return;
        };
        self.core.limits = limits;
        self.output = limits.clamp(self.output);
        self.law.clamp_state(&limits);
        self.shared.output.store(self.output, Ordering::Release);
    }

    /// Install new gains. Ignored if the law rejects them.
    pub fn set_tunings(&mut self, gains: Gains) {
        if !self.law.set_tunings(gains, self.core.sample_time.as_secs_f64()) {
            debug!("Rejected tunings {gains:?} for {:?} controller", self.law.kind());
            return;
        }
        if self.core.direction == Direction::Reverse {
            self.law.negate_gains();
        }
        self.publish_gains();
    }

    /// Set the sample period. Ignored for zero.
    pub fn set_sample_time(&mut self, ms: u32) {
        if ms == 0 {
            debug!("Rejected zero sample time");
            return;
        }
        let new = Duration::from_millis(u64::from(ms));
        let ratio = new.as_secs_f64() / self.core.sample_time.as_secs_f64();
        self.law.rescale_sample_time(ratio);
        self.core.sample_time = new;
    }

    /// Set controller action. Live gains flip once per actual change.
    pub fn set_controller_direction(&mut self, direction: Direction) {
        if direction != self.core.direction {
            self.law.negate_gains();
            self.core.direction = direction;
        }
        let flag = match direction {
            Direction::Direct => 0,
            Direction::Reverse => 1,
        };
        self.shared.direction.store(flag, Ordering::Release);
    }

    /// Hold `output` while in Manual. Ignored in Automatic.
    pub fn set_manual_output(&mut self, output: f64) {
        if self.core.mode == Mode::Manual {
            self.output = output;
            self.shared.output.store(output, Ordering::Release);
        }
    }

    /// Apply one mailbox command.
    pub fn apply(&mut self, command: ControllerCommand, now: Instant) {
        match command {
            ControllerCommand::SetMode(mode) => self.set_mode_at(mode, now),
            ControllerCommand::SetOutputLimits { min, max } => self.set_output_limits(min, max),
            ControllerCommand::SetTunings(gains) => self.set_tunings(gains),
            ControllerCommand::SetSampleTime(ms) => self.set_sample_time(ms),
            ControllerCommand::SetDirection(direction) => self.set_controller_direction(direction),
        }
    }

    /// Evaluate once if Automatic and a sample period has elapsed since the
    /// last computation. Returns the new output when one was computed.
    #[inline]
    pub fn compute_at(&mut self, now: Instant) -> Option<f64> {
        if !self.core.is_due(now) {
            return None;
        }
        let inputs = self.inputs.sample();
        let output = self
            .core
            .limits
            .clamp(self.law.compute(&inputs, &self.core.limits));
        self.output = output;
        self.core.last_compute = now;
        self.shared.output.store(output, Ordering::Release);
        Some(output)
    }

    pub fn mode(&self) -> Mode {
        self.core.mode
    }

    pub fn direction(&self) -> Direction {
        self.core.direction
    }

    /// Display gains.
    pub fn gains(&self) -> Gains {
        self.law.display_gains()
    }

    /// Live (scaled, direction-signed) gains.
    pub fn live_gains(&self) -> Gains {
        self.law.live_gains()
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn core(&self) -> &ControllerCore {
        &self.core
    }

    pub fn law(&self) -> &L {
        &self.law
    }

    /// A view that stays valid after [`Controller::run`].
    pub fn view(&self) -> ControllerView {
        ControllerView {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Move the controller onto its own task.
    pub fn run(self) -> Result<ControllerHandle, TaskError> {
        let (tx, rx) = mpsc::sync_channel(MAILBOX_CAPACITY);
        let view = self.view();
        let task = task::spawn(ControllerTask {
            controller: self,
            mailbox: rx,
            computations: 0,
        })?;
        Ok(ControllerHandle { task, tx, view })
    }

    fn publish_gains(&self) {
        let k = self.law.display_gains().to_array();
        for (cell, value) in self.shared.gains.iter().zip(k) {
            cell.store(value, Ordering::Release);
        }
    }

    fn publish_state(&self) {
        self.publish_gains();
        self.shared.mode.store(self.core.mode as u8, Ordering::Release);
        self.shared.output.store(self.output, Ordering::Release);
    }
}

// ─── Controller task ────────────────────────────────────────────────

/// Runtime change for a running controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerCommand {
    SetMode(Mode),
    SetOutputLimits { min: f64, max: f64 },
    SetTunings(Gains),
    SetSampleTime(u32),
    SetDirection(Direction),
}

/// Errors submitting a runtime change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// [`MAILBOX_CAPACITY`] changes are already pending.
    #[error("controller mailbox full")]
    MailboxFull,
    /// The controller task has exited.
    #[error("controller task not running")]
    Stopped,
}

struct ControllerTask<L: ControlLaw, S: InputSource> {
    controller: Controller<L, S>,
    mailbox: Receiver<ControllerCommand>,
    computations: u64,
}

impl<L: ControlLaw, S: InputSource> PeriodicTask for ControllerTask<L, S> {
    fn name(&self) -> &str {
        "controller"
    }

    fn on_start(&mut self) {
        let c = &mut self.controller;
        if c.core.mode == Mode::Automatic {
            c.initialize_at(Instant::now());
        }
        info!(
            "{:?} controller running (mode={:?}, sample={}ms, direction={:?})",
            c.law.kind(),
            c.core.mode,
            c.core.sample_time.as_millis(),
            c.core.direction
        );
    }

    fn step(&mut self) {
        let now = Instant::now();
        while let Ok(command) = self.mailbox.try_recv() {
            self.controller.apply(command, now);
        }
        if self.controller.compute_at(now).is_some() {
            self.computations += 1;
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing::Yield
    }

    fn on_stop(&mut self) {
        info!(
            "Controller stopped after {} computations (last output {:.1})",
            self.computations, self.controller.output
        );
    }
}

/// Owner's handle to a running controller.
///
/// Dropping the handle stops and joins the task.
pub struct ControllerHandle {
    task: TaskHandle,
    tx: SyncSender<ControllerCommand>,
    view: ControllerView,
}

impl ControllerHandle {
    /// Queue a runtime change.
    pub fn send(&self, command: ControllerCommand) -> Result<(), ControlError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ControlError::MailboxFull,
            TrySendError::Disconnected(_) => ControlError::Stopped,
        })
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), ControlError> {
        self.send(ControllerCommand::SetMode(mode))
    }

    pub fn set_output_limits(&self, min: f64, max: f64) -> Result<(), ControlError> {
        self.send(ControllerCommand::SetOutputLimits { min, max })
    }

    pub fn set_tunings(&self, gains: Gains) -> Result<(), ControlError> {
        self.send(ControllerCommand::SetTunings(gains))
    }

    pub fn set_sample_time(&self, ms: u32) -> Result<(), ControlError> {
        self.send(ControllerCommand::SetSampleTime(ms))
    }

    pub fn set_controller_direction(&self, direction: Direction) -> Result<(), ControlError> {
        self.send(ControllerCommand::SetDirection(direction))
    }

    /// Latest published output.
    pub fn output(&self) -> f64 {
        self.view.output()
    }

    pub fn mode(&self) -> Mode {
        self.view.mode()
    }

    /// Display gains.
    pub fn gains(&self) -> Gains {
        self.view.gains()
    }

    pub fn view(&self) -> ControllerView {
        self.view.clone()
    }

    /// Request termination; does not wait.
    pub fn stop(&self) {
        self.task.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Block until the task has exited.
    pub fn join(self) -> Result<(), TaskError> {
        self.task.join()
    }

    /// Request termination and wait for it.
    pub fn stop_and_join(self) -> Result<(), TaskError> {
        self.task.stop_and_join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::ManualInputs;

    const SAMPLE: Duration = Duration::from_millis(20);

    fn basic(kp: f64, ki: f64, kd: f64, direction: Direction) -> (Controller<Law, ManualInputs>, ManualInputs) {
        let inputs = ManualInputs::new();
        let mut c = Controller::new(
            Law::new(ControllerKind::Basic, 0.0, 11.7),
            inputs.clone(),
            Gains::Pid { kp, ki, kd },
            direction,
        );
        c.set_output_limits(-768.0, 768.0);
        c.set_sample_time(20);
        (c, inputs)
    }

    #[test]
    fn manual_mode_computes_nothing() {
        let (mut c, inputs) = basic(6.0, 0.0, 0.0, Direction::Direct);
        inputs.set_pendulum_angle(1.0);
        assert_eq!(c.compute_at(Instant::now() + Duration::from_secs(1)), None);
        assert_eq!(c.output(), 0.0);
    }

    #[test]
    fn computation_is_gated_by_sample_time() {
        let (mut c, inputs) = basic(6.0, 0.0, 0.0, Direction::Direct);
        let t0 = Instant::now();
        c.set_mode_at(Mode::Automatic, t0);
        inputs.set_pendulum_angle(0.5);

        assert_eq!(c.compute_at(t0 + Duration::from_millis(5)), None);
        assert_eq!(c.compute_at(t0 + SAMPLE), Some(-3.0));
        // The reference advanced to the computation, not the start.
        assert_eq!(c.compute_at(t0 + SAMPLE + Duration::from_millis(19)), None);
        assert!(c.compute_at(t0 + 2 * SAMPLE).is_some());
    }

    #[test]
    fn bumpless_manual_to_automatic() {
        let (mut c, inputs) = basic(6.0, 0.75, 1.5, Direction::Direct);
        inputs.set_pendulum_angle(0.0);
        c.set_manual_output(123.0);

        let t0 = Instant::now();
        c.set_mode_at(Mode::Automatic, t0);
        let first = c.compute_at(t0 + SAMPLE).unwrap();
        assert!((first - 123.0).abs() < 1e-12);
    }

    #[test]
    fn manual_output_ignored_in_automatic() {
        let (mut c, _) = basic(1.0, 0.0, 0.0, Direction::Direct);
        c.set_mode(Mode::Automatic);
        c.set_manual_output(50.0);
        assert_eq!(c.output(), 0.0);
    }

    #[test]
    fn rejected_limits_keep_previous() {
        let (mut c, _) = basic(1.0, 0.0, 0.0, Direction::Direct);
        c.set_output_limits(10.0, 10.0);
        c.set_output_limits(f64::NAN, 1.0);
        assert_eq!(c.core().limits(), OutputLimits::new(-768.0, 768.0).unwrap());
    }

    #[test]
    fn narrowing_limits_clamps_output() {
        let (mut c, _) = basic(1.0, 0.0, 0.0, Direction::Direct);
        c.set_manual_output(500.0);
        c.set_output_limits(-100.0, 100.0);
        assert_eq!(c.output(), 100.0);
    }

    #[test]
    fn zero_sample_time_rejected() {
        let (mut c, _) = basic(1.0, 1.0, 1.0, Direction::Direct);
        let before = c.live_gains();
        c.set_sample_time(0);
        assert_eq!(c.core().sample_time(), SAMPLE);
        assert_eq!(c.live_gains(), before);
    }

    #[test]
    fn direction_flips_once_per_change() {
        let (mut c, _) = basic(6.0, 0.75, 1.5, Direction::Direct);
        let direct = c.live_gains().to_array();

        c.set_controller_direction(Direction::Reverse);
        c.set_controller_direction(Direction::Reverse);
        let reverse = c.live_gains().to_array();
        for (d, r) in direct.iter().zip(reverse) {
            assert_eq!(-d, r);
        }

        c.set_controller_direction(Direction::Direct);
        assert_eq!(c.live_gains().to_array(), direct);
        assert_eq!(c.gains(), Gains::Pid { kp: 6.0, ki: 0.75, kd: 1.5 });
    }

    #[test]
    fn tunings_under_reverse_stay_negated() {
        let (mut c, _) = basic(1.0, 0.0, 0.0, Direction::Reverse);
        c.set_tunings(Gains::Pid { kp: 2.0, ki: 0.0, kd: 0.0 });
        assert_eq!(c.live_gains(), Gains::Pid { kp: -2.0, ki: -0.0, kd: -0.0 });
    }

    #[test]
    fn view_tracks_published_state() {
        let (mut c, inputs) = basic(6.0, 0.0, 0.0, Direction::Direct);
        let view = c.view();
        assert_eq!(view.kind(), ControllerKind::Basic);
        assert_eq!(view.mode(), Mode::Manual);

        let t0 = Instant::now();
        c.set_mode_at(Mode::Automatic, t0);
        inputs.set_pendulum_angle(-1.0);
        c.compute_at(t0 + SAMPLE);

        assert_eq!(view.mode(), Mode::Automatic);
        assert_eq!(view.output(), 6.0);
        assert_eq!(view.gains(), Gains::Pid { kp: 6.0, ki: 0.0, kd: 0.0 });
    }

    #[test]
    fn from_config_builds_selected_law() {
        let config = ControllerConfig {
            kind: ControllerKind::Lqr,
            direction: Direction::Reverse,
            ..ControllerConfig::default()
        };
        let c = Controller::from_config(&config, ManualInputs::new());
        assert_eq!(c.law().kind(), ControllerKind::Lqr);
        assert_eq!(c.gains(), Gains::Lqr(config.lqr_gains));
        assert_eq!(c.direction(), Direction::Reverse);
        assert_eq!(c.core().sample_time(), SAMPLE);
        assert_eq!(c.core().limits().max(), config.output_max);
    }

    #[test]
    fn running_controller_applies_mailbox_commands() {
        let (c, inputs) = basic(6.0, 0.0, 0.0, Direction::Direct);
        let handle = c.run().unwrap();
        inputs.set_pendulum_angle(-2.0);

        handle.set_sample_time(1).unwrap();
        handle.set_mode(Mode::Automatic).unwrap();
        handle
            .set_tunings(Gains::Pid { kp: 10.0, ki: 0.0, kd: 0.0 })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.output() != 20.0 {
            assert!(Instant::now() < deadline, "controller never produced output");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.mode(), Mode::Automatic);
        assert_eq!(handle.gains(), Gains::Pid { kp: 10.0, ki: 0.0, kd: 0.0 });
        handle.stop_and_join().unwrap();
    }

    #[test]
    fn send_after_stop_reports_stopped() {
        let (c, _) = basic(1.0, 0.0, 0.0, Direction::Direct);
        let handle = c.run().unwrap();
        handle.stop();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.set_mode(Mode::Automatic), Err(ControlError::Stopped));
        handle.join().unwrap();
    }
}
