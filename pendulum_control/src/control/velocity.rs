//! PID over pendulum angle and angular velocity.
//!
//! Both errors are taken against zero and the "integral" term is their
//! instantaneous sum:
//!
//! ```text
//! u      = -(kp·e_p + kd·e_d + ki·(e_p + e_d))
//! output = out_max / V · u
//! ```
//!
//! with `V` the supply voltage. There is no accumulated state.

use super::{ControlLaw, Gains, OutputLimits, PidTunings};
use crate::inputs::ControlInputs;
use pendulum_common::config::ControllerKind;

#[derive(Debug, Clone)]
pub struct VelocityPid {
    tunings: PidTunings,
    supply_voltage: f64,
}

impl VelocityPid {
    /// Untuned controller normalised to `supply_voltage` [V].
    pub fn new(supply_voltage: f64) -> Self {
        Self {
            tunings: PidTunings::default(),
            supply_voltage,
        }
    }

    pub fn supply_voltage(&self) -> f64 {
        self.supply_voltage
    }
}

impl ControlLaw for VelocityPid {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Velocity
    }

    #[inline]
    fn compute(&mut self, inputs: &ControlInputs, limits: &OutputLimits) -> f64 {
        let t = &self.tunings;
        let err_p = -inputs.pendulum_angle;
        let err_d = -inputs.pendulum_velocity;
        let u = -(t.kp * err_p + t.kd * err_d + t.ki * (err_p + err_d));
        limits.clamp(limits.max() / self.supply_voltage * u)
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

    fn display_gains(&self) -> Gains {
        self.tunings.display()
    }

    fn live_gains(&self) -> Gains {
        self.tunings.live()
    }
}
