//! Four-state LQR feedback.
//!
//! ```text
//! u      = k1·θp + k2·θm + k3·ωp + k4·ωm
//! output = out_max / V · u
//! ```
//!
//! Gains come from an offline design and may have any sign; they are not
//! rescaled when the sample period changes.

use super::{ControlLaw, Gains, OutputLimits};
use crate::inputs::ControlInputs;
use pendulum_common::config::ControllerKind;

#[derive(Debug, Clone)]
pub struct Lqr {
    k: [f64; 4],
    display: [f64; 4],
    supply_voltage: f64,
}

impl Lqr {
    /// Untuned controller normalised to `supply_voltage` [V].
    pub fn new(supply_voltage: f64) -> Self {
        Self {
            k: [0.0; 4],
            display: [0.0; 4],
            supply_voltage,
        }
    }

    /// Raw control effort before normalisation.
    #[inline]
    pub fn effort(&self, inputs: &ControlInputs) -> f64 {
        let [k1, k2, k3, k4] = self.k;
        k1 * inputs.pendulum_angle
            + k2 * inputs.motor_angle
            + k3 * inputs.pendulum_velocity
            + k4 * inputs.motor_velocity
    }
}

impl ControlLaw for Lqr {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Lqr
    }

    #[inline]
    fn compute(&mut self, inputs: &ControlInputs, limits: &OutputLimits) -> f64 {
        limits.clamp(limits.max() / self.supply_voltage * self.effort(inputs))
    }

    fn set_tunings(&mut self, gains: Gains, _sample_secs: f64) -> bool {
        let Gains::Lqr(k) = gains else {
            return false;
        };
        if !gains.is_finite() {
            return false;
        }
        self.k = k;
        self.display = k;
        true
    }

    fn negate_gains(&mut self) {
        for k in &mut self.k {
            *k = -*k;
        }
    }

    fn display_gains(&self) -> Gains {
        Gains::Lqr(self.display)
    }

    fn live_gains(&self) -> Gains {
        Gains::Lqr(self.k)
    }
}
