//! Quadrature encoder channels.
//!
//! An [`EncoderChannel`] owns one hardware counter and, once [`run`], a
//! sampling task that turns raw pulse counts into position, delta and
//! angular velocity snapshots. Any number of [`EncoderReader`]s observe the
//! latest snapshot without blocking.
//!
//! ```text
//!  counter ──read──▶ EncoderSampler ──Release──▶ EncoderShared ◀──Acquire── EncoderReader(s)
//!                      (task thread)             position / Δpos / ω
//! ```
//!
//! [`run`]: EncoderChannel::run

mod eqep;
mod sim;

pub use eqep::{EQEP_DEVICES, SysfsEqep};
pub use sim::SimulatedCounter;

use pendulum_common::atomic::AtomicF64;
use pendulum_common::consts::{
    ENCODER_SAMPLE_INTERVAL, EQEP_UNIT_PERIOD_NS, MIN_RESOLVABLE_DT,
};
use pendulum_common::hal::HalError;
use pendulum_common::task::{self, Pacing, PeriodicTask, TaskError, TaskHandle};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Log one counter read failure out of this many.
const READ_FAILURE_LOG_EVERY: u64 = 1000;

/// A hardware position counter in quadrature mode.
///
/// Methods take `&self`: the sampler reads while the owner may re-zero.
pub trait QuadratureCounter: Send + Sync + 'static {
    /// Zero the position counter.
    fn reset(&self) -> Result<(), HalError>;

    /// Select x4 quadrature counting in absolute mode and arm the unit timer.
    fn configure_quadrature(&self, unit_period_ns: u64) -> Result<(), HalError>;

    /// Current signed pulse count.
    fn read_position(&self) -> Result<i64, HalError>;

    /// Overwrite the pulse count.
    fn set_position(&self, position: i64) -> Result<(), HalError>;
}

/// Cells shared between the channel owner and its sampler.
#[derive(Debug, Default)]
struct EncoderShared {
    // Written by the sampler only.
    position: AtomicI64,
    delta_position: AtomicI64,
    velocity: AtomicF64,
    /// Last re-zero generation covered by a published sample.
    applied_generation: AtomicU64,

    /// Written by the owner only. Odd while a counter write is in flight.
    rezero_generation: AtomicU64,
}

/// Brackets a counter write: the generation is odd from `begin` until drop.
struct Rezero<'a>(&'a AtomicU64);

impl<'a> Rezero<'a> {
    fn begin(generation: &'a AtomicU64) -> Self {
        generation.fetch_add(1, Ordering::Relaxed);
        atomic::fence(Ordering::Release);
        Self(generation)
    }
}

impl Drop for Rezero<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

/// Lock-free view of an encoder channel's latest snapshot.
#[derive(Debug, Clone)]
pub struct EncoderReader {
    shared: Arc<EncoderShared>,
    ppr: f64,
}

impl EncoderReader {
    /// Signed pulse count.
    #[inline]
    pub fn position(&self) -> i64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Angle [rad].
    #[inline]
    pub fn angle(&self) -> f64 {
        self.position() as f64 / self.ppr * TAU
    }

    /// Angle [deg].
    #[inline]
    pub fn angle_deg(&self) -> f64 {
        self.angle().to_degrees()
    }

    /// Angular velocity [rad/s].
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.shared.velocity.load(Ordering::Acquire)
    }

    /// Angular velocity [deg/s].
    #[inline]
    pub fn velocity_deg(&self) -> f64 {
        self.velocity().to_degrees()
    }

    /// Pulses between the last two samples.
    #[inline]
    pub fn delta_position(&self) -> i64 {
        self.shared.delta_position.load(Ordering::Acquire)
    }

    /// Pulses per revolution.
    pub fn ppr(&self) -> f64 {
        self.ppr
    }
}

/// The sampling loop body.
///
/// [`EncoderChannel::run`] spawns this as a task. It is public so that
/// tests and benches can drive it with explicit timestamps.
pub struct EncoderSampler<C: QuadratureCounter> {
    name: String,
    counter: Arc<C>,
    shared: Arc<EncoderShared>,
    ppr: f64,
    last: Option<(i64, Instant)>,
    seen_generation: u64,
    read_failures: u64,
}

impl<C: QuadratureCounter> EncoderSampler<C> {
    /// Take one sample as if the counter was read at `now`.
    pub fn sample_at(&mut self, now: Instant) {
        let begun = self.shared.rezero_generation.load(Ordering::Acquire);
        let position = match self.counter.read_position() {
            Ok(p) => p,
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures % READ_FAILURE_LOG_EVERY == 1 {
                    warn!(
                        "{}: counter read failed ({} so far): {e}",
                        self.name, self.read_failures
                    );
                }
                return;
            }
        };

        atomic::fence(Ordering::Acquire);
        let generation = self.shared.rezero_generation.load(Ordering::Relaxed);
        // A read overlapping a re-zero may see either count; keep treating
        // samples as rebases until one lands entirely after it.
        let settled = begun == generation && generation % 2 == 0;
        let rebased = !settled || generation != self.seen_generation;

        match self.last {
            None => {
                self.publish(position, 0, Some(0.0));
                self.last = Some((position, now));
                if settled {
                    self.settle(generation);
                }
            }
            Some(_) if rebased => {
                self.publish(position, 0, None);
                self.last = Some((position, now));
                if settled {
                    self.settle(generation);
                }
            }
            Some((prev_position, prev_time)) => {
                let dt = now.saturating_duration_since(prev_time);
                if dt < MIN_RESOLVABLE_DT {
                    // Keep the reference point until time has visibly moved.
                    self.shared.position.store(position, Ordering::Release);
                    return;
                }
                let delta = position - prev_position;
                let dtheta = delta as f64 / self.ppr * TAU;
                self.publish(position, delta, Some(dtheta / dt.as_secs_f64()));
                self.last = Some((position, now));
            }
        }
    }

    fn settle(&mut self, generation: u64) {
        self.seen_generation = generation;
        self.shared
            .applied_generation
            .store(generation, Ordering::Release);
    }

    fn publish(&self, position: i64, delta: i64, velocity: Option<f64>) {
        self.shared.position.store(position, Ordering::Release);
        self.shared.delta_position.store(delta, Ordering::Release);
        if let Some(v) = velocity {
            self.shared.velocity.store(v, Ordering::Release);
        }
    }
}

impl<C: QuadratureCounter> PeriodicTask for EncoderSampler<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self) {
        self.sample_at(Instant::now());
    }

    fn pacing(&self) -> Pacing {
        Pacing::Sleep(ENCODER_SAMPLE_INTERVAL)
    }

    fn on_stop(&mut self) {
        debug!(
            "{} stopped ({} read failures)",
            self.name, self.read_failures
        );
    }
}

/// One quadrature encoder and its sampling task.
///
/// Dropping the channel stops and joins the sampler.
pub struct EncoderChannel<C: QuadratureCounter = SysfsEqep> {
    name: String,
    counter: Arc<C>,
    shared: Arc<EncoderShared>,
    ppr: f64,
    task: Option<TaskHandle>,
}

impl EncoderChannel<SysfsEqep> {
    /// Open eQEP `channel` through sysfs.
    pub fn new(channel: u8, ppr: f64) -> Result<Self, HalError> {
        let counter = SysfsEqep::open(channel)?;
        Self::with_counter(format!("eqep{channel}"), counter, ppr)
    }
}

impl<C: QuadratureCounter> EncoderChannel<C> {
    /// Wrap an arbitrary counter: reset it and select quadrature mode.
    pub fn with_counter(name: impl Into<String>, counter: C, ppr: f64) -> Result<Self, HalError> {
        if ppr.is_nan() || ppr <= 0.0 {
            return Err(HalError::ConfigError(format!(
                "pulses per revolution must be > 0, got {ppr}"
            )));
        }
        counter.reset()?;
        counter.configure_quadrature(EQEP_UNIT_PERIOD_NS)?;

        let name = name.into();
        debug!("{name}: configured (ppr={ppr})");

        Ok(Self {
            name,
            counter: Arc::new(counter),
            shared: Arc::new(EncoderShared::default()),
            ppr,
            task: None,
        })
    }

    /// Channel name, also used as the sampler thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A reader sharing this channel's snapshot.
    pub fn reader(&self) -> EncoderReader {
        EncoderReader {
            shared: Arc::clone(&self.shared),
            ppr: self.ppr,
        }
    }

    /// A sampler for this channel that is not yet running.
    pub fn sampler(&self) -> EncoderSampler<C> {
        EncoderSampler {
            name: self.name.clone(),
            counter: Arc::clone(&self.counter),
            shared: Arc::clone(&self.shared),
            ppr: self.ppr,
            last: None,
            seen_generation: 0,
            read_failures: 0,
        }
    }

    /// Start the sampling task. A second call while running is a no-op.
    pub fn run(&mut self) -> Result<(), TaskError> {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("{}: sampler already running", self.name);
            return Ok(());
        }
        self.task = Some(task::spawn(self.sampler())?);
        Ok(())
    }

    /// Whether the sampler task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the sampler to exit after its current iteration.
    pub fn stop(&self) {
        if let Some(task) = &self.task {
            task.stop();
        }
    }

    /// Wait for the sampler to exit.
    pub fn join(&mut self) -> Result<(), TaskError> {
        match self.task.take() {
            Some(task) => task.join(),
            None => Ok(()),
        }
    }

    /// Re-zero the counter to `position` pulses.
    ///
    /// The sampler publishes no velocity across the jump. Readers see the
    /// new position once [`Self::rezero_published`] returns `true`.
    pub fn set_position(&self, position: i64) -> Result<(), HalError> {
        {
            let _rezero = Rezero::begin(&self.shared.rezero_generation);
            self.counter.set_position(position)?;
        }
        debug!("{}: position set to {position}", self.name);
        Ok(())
    }

    /// Whether a sample taken after the last re-zero has been published.
    pub fn rezero_published(&self) -> bool {
        self.shared.applied_generation.load(Ordering::Acquire)
            == self.shared.rezero_generation.load(Ordering::Relaxed)
    }

    /// Re-zero the counter so that it currently reads `deg` degrees.
    pub fn set_deg(&self, deg: f64) -> Result<(), HalError> {
        self.set_position((self.ppr / 360.0 * deg).round() as i64)
    }

    /// Pulses per revolution.
    pub fn ppr(&self) -> f64 {
        self.ppr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PPR: f64 = 1600.0;

    fn channel() -> (EncoderChannel<SimulatedCounter>, SimulatedCounter) {
        let counter = SimulatedCounter::new();
        counter.set(42);
        let ch = EncoderChannel::with_counter("test", counter.clone(), PPR).unwrap();
        (ch, counter)
    }

    #[test]
    fn construction_resets_counter() {
        let (ch, counter) = channel();
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.unit_period_ns(), EQEP_UNIT_PERIOD_NS);
        assert_eq!(ch.reader().position(), 0);
    }

    #[test]
    fn invalid_ppr_rejected() {
        let result = EncoderChannel::with_counter("bad", SimulatedCounter::new(), 0.0);
        assert!(matches!(result, Err(HalError::ConfigError(_))));
    }

    #[test]
    fn velocity_follows_position_steps() {
        let (ch, counter) = channel();
        let reader = ch.reader();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();
        let step = Duration::from_millis(10);
        let unit = TAU / PPR / 0.01;

        counter.set(0);
        sampler.sample_at(t0);
        assert_eq!(reader.velocity(), 0.0);

        counter.set(10);
        sampler.sample_at(t0 + step);
        assert!((reader.velocity() - 10.0 * unit).abs() < 1e-9);
        assert_eq!(reader.delta_position(), 10);

        counter.set(10);
        sampler.sample_at(t0 + 2 * step);
        assert_eq!(reader.velocity(), 0.0);

        counter.set(25);
        sampler.sample_at(t0 + 3 * step);
        assert!((reader.velocity() - 15.0 * unit).abs() < 1e-9);
        assert_eq!(reader.delta_position(), 15);
        assert_eq!(reader.position(), 25);
    }

    #[test]
    fn unresolvable_dt_keeps_previous_velocity() {
        let (ch, counter) = channel();
        let reader = ch.reader();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();

        sampler.sample_at(t0);
        counter.set(16);
        sampler.sample_at(t0 + Duration::from_millis(1));
        let v = reader.velocity();
        assert!(v > 0.0);

        counter.set(32);
        sampler.sample_at(t0 + Duration::from_millis(1) + Duration::from_nanos(100));
        assert_eq!(reader.velocity(), v);
        assert!(reader.velocity().is_finite());
        assert_eq!(reader.position(), 32);
    }

    #[test]
    fn read_failure_keeps_snapshot() {
        let (ch, counter) = channel();
        let reader = ch.reader();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();

        counter.set(100);
        sampler.sample_at(t0);
        counter.fail_reads(true);
        counter.set(200);
        sampler.sample_at(t0 + Duration::from_millis(5));
        assert_eq!(reader.position(), 100);

        counter.fail_reads(false);
        sampler.sample_at(t0 + Duration::from_millis(10));
        assert_eq!(reader.position(), 200);
    }

    #[test]
    fn angle_conversions() {
        let (ch, counter) = channel();
        let mut sampler = ch.sampler();
        counter.set(400);
        sampler.sample_at(Instant::now());

        let reader = ch.reader();
        assert!((reader.angle() - TAU / 4.0).abs() < 1e-12);
        assert!((reader.angle_deg() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn set_deg_rezeroes_without_velocity_spike() {
        let (ch, counter) = channel();
        let reader = ch.reader();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();

        counter.set(800);
        sampler.sample_at(t0);
        ch.set_deg(0.5).unwrap();
        assert_eq!(counter.get(), 2);

        sampler.sample_at(t0 + Duration::from_millis(10));
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.delta_position(), 0);
        assert_eq!(reader.velocity(), 0.0);
    }

    #[test]
    fn rezero_overlapping_reads_is_not_motion() {
        let (ch, counter) = channel();
        let reader = ch.reader();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();
        let step = Duration::from_millis(10);

        counter.set(800);
        sampler.sample_at(t0);
        assert!(ch.rezero_published());

        // Generation bumped, counter not yet written.
        let rezero = Rezero::begin(&ch.shared.rezero_generation);
        sampler.sample_at(t0 + step);
        // Counter written, write not yet closed.
        counter.set(0);
        sampler.sample_at(t0 + 2 * step);
        drop(rezero);
        assert!(!ch.rezero_published());

        sampler.sample_at(t0 + 3 * step);
        assert!(ch.rezero_published());
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.delta_position(), 0);
        assert_eq!(reader.velocity(), 0.0);

        // Genuine motion right after the re-zero is kept.
        counter.set(16);
        sampler.sample_at(t0 + 4 * step);
        assert_eq!(reader.delta_position(), 16);
        assert!((reader.velocity() - 16.0 * TAU / PPR / 0.01).abs() < 1e-9);
    }

    #[test]
    fn rezero_published_after_next_sample() {
        let (ch, _counter) = channel();
        let mut sampler = ch.sampler();
        let t0 = Instant::now();

        sampler.sample_at(t0);
        ch.set_position(5).unwrap();
        assert!(!ch.rezero_published());
        sampler.sample_at(t0 + Duration::from_millis(1));
        assert!(ch.rezero_published());
        assert_eq!(ch.reader().position(), 5);
    }

    #[test]
    fn run_stop_join() {
        let (mut ch, counter) = channel();
        let reader = ch.reader();
        ch.run().unwrap();
        assert!(ch.is_running());

        counter.set(77);
        let deadline = Instant::now() + Duration::from_secs(5);
        while reader.position() != 77 {
            assert!(Instant::now() < deadline, "sampler never published");
            std::thread::sleep(Duration::from_millis(1));
        }

        ch.stop();
        ch.join().unwrap();
        assert!(!ch.is_running());
    }
}
