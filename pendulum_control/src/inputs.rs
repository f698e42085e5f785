//! Controller inputs.
//!
//! A control law sees the full plant state as one [`ControlInputs`]
//! snapshot. The four fields are loaded independently, so a snapshot may
//! mix values from two consecutive encoder samples.

use pendulum_common::atomic::AtomicF64;
use pendulum_hal::encoder::EncoderReader;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Plant state seen by a control law.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInputs {
    /// Pendulum angle from vertical [rad].
    pub pendulum_angle: f64,
    /// Pendulum angular velocity [rad/s].
    pub pendulum_velocity: f64,
    /// Motor shaft angle [rad].
    pub motor_angle: f64,
    /// Motor shaft angular velocity [rad/s].
    pub motor_velocity: f64,
}

/// Where a controller reads its inputs from.
pub trait InputSource: Send + 'static {
    /// Latest plant state. Must not block.
    fn sample(&self) -> ControlInputs;
}

/// Inputs read from the pendulum and motor encoders.
#[derive(Debug, Clone)]
pub struct EncoderInputs {
    pendulum: EncoderReader,
    motor: EncoderReader,
}

impl EncoderInputs {
    pub fn new(pendulum: EncoderReader, motor: EncoderReader) -> Self {
        Self { pendulum, motor }
    }
}

impl InputSource for EncoderInputs {
    #[inline]
    fn sample(&self) -> ControlInputs {
        ControlInputs {
            pendulum_angle: self.pendulum.angle(),
            pendulum_velocity: self.pendulum.velocity(),
            motor_angle: self.motor.angle(),
            motor_velocity: self.motor.velocity(),
        }
    }
}

#[derive(Debug, Default)]
struct Cells {
    pendulum_angle: AtomicF64,
    pendulum_velocity: AtomicF64,
    motor_angle: AtomicF64,
    motor_velocity: AtomicF64,
}

/// Inputs injected by hand.
///
/// Clones share the same cells: keep one to drive the values, give another
/// to the controller. Used by tests and benches.
#[derive(Debug, Clone, Default)]
pub struct ManualInputs {
    cells: Arc<Cells>,
}

impl ManualInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a complete state.
    pub fn set(&self, inputs: ControlInputs) {
        let c = &self.cells;
        c.pendulum_angle.store(inputs.pendulum_angle, Ordering::Release);
        c.pendulum_velocity
            .store(inputs.pendulum_velocity, Ordering::Release);
        c.motor_angle.store(inputs.motor_angle, Ordering::Release);
        c.motor_velocity.store(inputs.motor_velocity, Ordering::Release);
    }

    /// Publish only the pendulum angle.
    pub fn set_pendulum_angle(&self, angle: f64) {
        self.cells.pendulum_angle.store(angle, Ordering::Release);
    }
}

impl InputSource for ManualInputs {
    fn sample(&self) -> ControlInputs {
        let c = &self.cells;
        ControlInputs {
            pendulum_angle: c.pendulum_angle.load(Ordering::Acquire),
            pendulum_velocity: c.pendulum_velocity.load(Ordering::Acquire),
            motor_angle: c.motor_angle.load(Ordering::Acquire),
            motor_velocity: c.motor_velocity.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pendulum_hal::encoder::{EncoderChannel, SimulatedCounter};
    use std::f64::consts::FRAC_PI_2;
    use std::time::Instant;

    #[test]
    fn manual_inputs_are_shared_between_clones() {
        let driver = ManualInputs::new();
        let seen = driver.clone();
        driver.set_pendulum_angle(0.25);
        assert_eq!(seen.sample().pendulum_angle, 0.25);
        assert_eq!(seen.sample().motor_angle, 0.0);
    }

    #[test]
    fn encoder_inputs_follow_readers() {
        let p = SimulatedCounter::new();
        let m = SimulatedCounter::new();
        let pendulum = EncoderChannel::with_counter("p", p.clone(), 1600.0).unwrap();
        let motor = EncoderChannel::with_counter("m", m.clone(), 1600.0).unwrap();
        let inputs = EncoderInputs::new(pendulum.reader(), motor.reader());

        p.set(400);
        m.set(-800);
        let now = Instant::now();
        pendulum.sampler().sample_at(now);
        motor.sampler().sample_at(now);

        let s = inputs.sample();
        assert!((s.pendulum_angle - FRAC_PI_2).abs() < 1e-12);
        assert!((s.motor_angle + 2.0 * FRAC_PI_2).abs() < 1e-12);
        assert_eq!(s.pendulum_velocity, 0.0);
    }
}
