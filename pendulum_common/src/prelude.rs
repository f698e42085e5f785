//! Prelude module for common re-exports.
//!
//! ```rust
//! use pendulum_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, ControllerKind, Direction, LogLevel, PendulumConfig, SharedConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{ENCODER_PPR, MOTOR_PPR, SERIAL_ERROR, SMC_MAX_SPEED};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::hal::{HalError, SerialError};

// ─── Runtime ────────────────────────────────────────────────────────
pub use crate::atomic::AtomicF64;
pub use crate::status::{NullStatus, StatusSink, StatusText, status_text};
pub use crate::task::{Pacing, PeriodicTask, StopSignal, TaskError, TaskHandle};
