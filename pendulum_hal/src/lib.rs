//! # Pendulum HAL
//!
//! Hardware edge of the balancer:
//!
//! - [`encoder`]: quadrature counters sampled by a background task into
//!   lock-free position/velocity snapshots.
//! - [`smc`]: byte-level serial protocol to the Pololu Simple Motor
//!   Controller, with the auto-baud and exit-safe-start handshake done at
//!   construction.
//! - [`preflight`]: device presence check and overlay bring-up.
//! - [`status`]: a non-blocking, queued [`StatusSink`] rendered through
//!   `tracing`.
//!
//! Every device has a simulated twin so that the whole stack runs
//! off-target.
//!
//! [`StatusSink`]: pendulum_common::status::StatusSink

pub mod encoder;
pub mod preflight;
pub mod smc;
pub mod status;

pub use encoder::{EncoderChannel, EncoderReader, QuadratureCounter, SimulatedCounter, SysfsEqep};
pub use smc::{SerialRegistry, SerialTransport, SimulatedSmc, SmcErrorStatus, SmcLink, TermiosPort};
