//! Setpoint-tracking PID on the pendulum angle.
//!
//! Integral and derivative gains are pre-scaled by the sample period
//! (`ki·dt`, `kd/dt`), so one computation is a plain weighted sum.
//! The derivative acts on the measurement, not the error, so setpoint
//! changes do not kick the output.

use super::{ControlLaw, Gains, OutputLimits};
use crate::inputs::ControlInputs;
use pendulum_common::config::ControllerKind;

/// PID gains as entered and as used.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTunings {
    /// Live proportional gain.
    pub kp: f64,
    /// Live integral gain, scaled by the sample period.
    pub ki: f64,
    /// Live derivative gain, divided by the sample period.
    pub kd: f64,
    display: [f64; 3],
}

impl PidTunings {
    /// Install `gains` for a sample period of `sample_secs`.
    ///
    /// Rejects non-PID gains and any negative or non-finite component.
    pub fn set(&mut self, gains: Gains, sample_secs: f64) -> bool {
        let Gains::Pid { kp, ki, kd } = gains else {
            return false;
        };
        if !gains.is_finite() || kp < 0.0 || ki < 0.0 || kd < 0.0 {
            return false;
        }
        self.display = [kp, ki, kd];
        self.kp = kp;
        self.ki = ki * sample_secs;
        self.kd = kd / sample_secs;
        true
    }

    /// Flip every live gain.
    pub fn negate(&mut self) {
        self.kp = -self.kp;
        self.ki = -self.ki;
        self.kd = -self.kd;
    }

    /// Sample period multiplied by `ratio`.
    pub fn rescale(&mut self, ratio: f64) {
        self.ki *= ratio;
        self.kd /= ratio;
    }

    pub fn display(&self) -> Gains {
        let [kp, ki, kd] = self.display;
        Gains::Pid { kp, ki, kd }
    }

    pub fn live(&self) -> Gains {
        Gains::Pid {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }
}

/// Classic PID with integral clamping.
#[derive(Debug, Clone, Default)]
pub struct BasicPid {
    tunings: PidTunings,
    setpoint: f64,
    integral: f64,
    last_input: f64,
}

impl BasicPid {
    /// Untuned controller holding the pendulum at `setpoint` [rad].
    pub fn new(setpoint: f64) -> Self {
        Self {
            setpoint,
            ..Self::default()
        }
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Integral accumulator.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl ControlLaw for BasicPid {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Basic
    }

    #[inline]
    fn compute(&mut self, inputs: &ControlInputs, limits: &OutputLimits) -> f64 {
        let t = &self.tunings;
        let input = inputs.pendulum_angle;
        let error = self.setpoint - input;

        self.integral = limits.clamp(self.integral + t.ki * error);
        let d_input = input - self.last_input;
        self.last_input = input;

        limits.clamp(t.kp * error + self.integral - t.kd * d_input)
    }

    fn initialize(&mut self, inputs: &ControlInputs, output: f64, limits: &OutputLimits) {
        self.last_input = inputs.pendulum_angle;
        self.integral = limits.clamp(output);
    }

    fn set_tunings(&mut self, gains: Gains, sample_secs: f64) -> bool {
        self.tunings.set(gains, sample_secs)
    }

    fn negate_gains(&mut self) {
        self.tunings.negate();
    }

    fn rescale_sample_time(&mut self, ratio: f64) {
        self.tunings.rescale(ratio);
    }

    fn clamp_state(&mut self, limits: &OutputLimits) {
        self.integral = limits.clamp(self.integral);
    }

    fn display_gains(&self) -> Gains {
        self.tunings.display()
    }

    fn live_gains(&self) -> Gains {
        self.tunings.live()
    }
}
