//! Pendulum Common Library
//!
//! Shared constants, configuration loading, error types and the periodic
//! task runtime used by every crate in the pendulum workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Hardware calibration and protocol constants
//! - [`config`] - Configuration loading traits and the `pendulum.toml` schema
//! - [`hal`] - Hardware error taxonomy (construction-fatal vs transient)
//! - [`task`] - Periodic task runtime (start / stop / join)
//! - [`atomic`] - Lock-free single-writer cells
//! - [`status`] - Status display collaborator contract
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pendulum_common::prelude::*;
//! ```

pub mod atomic;
pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod status;
pub mod task;
