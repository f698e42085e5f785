//! In-memory quadrature counter.

use super::QuadratureCounter;
use pendulum_common::hal::HalError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct SimState {
    position: AtomicI64,
    unit_period_ns: AtomicU64,
    fail_reads: AtomicBool,
}

/// Counter backed by a shared atomic.
///
/// Clones share the same count, so a test or physics model holds one clone
/// and drives the value the sampler sees.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCounter {
    state: Arc<SimState>,
}

impl SimulatedCounter {
    /// A counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the shaft to `position` pulses.
    pub fn set(&self, position: i64) {
        self.state.position.store(position, Ordering::Release);
    }

    /// Move the shaft by `delta` pulses.
    pub fn advance(&self, delta: i64) {
        self.state.position.fetch_add(delta, Ordering::AcqRel);
    }

    /// Current pulse count.
    pub fn get(&self) -> i64 {
        self.state.position.load(Ordering::Acquire)
    }

    /// Unit timer period last configured [ns].
    pub fn unit_period_ns(&self) -> u64 {
        self.state.unit_period_ns.load(Ordering::Acquire)
    }

    /// Make subsequent reads fail until cleared.
    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::Release);
    }
}

impl QuadratureCounter for SimulatedCounter {
    fn reset(&self) -> Result<(), HalError> {
        self.set(0);
        Ok(())
    }

    fn configure_quadrature(&self, unit_period_ns: u64) -> Result<(), HalError> {
        self.state
            .unit_period_ns
            .store(unit_period_ns, Ordering::Release);
        Ok(())
    }

    fn read_position(&self) -> Result<i64, HalError> {
        if self.state.fail_reads.load(Ordering::Acquire) {
            return Err(HalError::HardwareAccess("simulated read failure".into()));
        }
        Ok(self.get())
    }

    fn set_position(&self, position: i64) -> Result<(), HalError> {
        self.set(position);
        Ok(())
    }
}
