//! # Pendulum Control
//!
//! Closes the loop between the encoders and the motor controller:
//!
//! 1. [`inputs`]: lock-free state snapshots (pendulum and motor angle and
//!    velocity) assembled from encoder readers.
//! 2. [`control`]: the control law family (basic PID, velocity-feedback
//!    PID, LQR) behind one [`control::ControlLaw`] trait, and the
//!    [`control::Controller`] state machine that gates computation on the
//!    sample period and owns bumpless mode transfer.
//! 3. [`balance`]: the supervisor that waits for the pendulum to be raised,
//!    re-zeroes the encoders, runs the controller and shapes its output into
//!    motor speed commands.
//! 4. [`rt`]: optional real-time process setup.

pub mod balance;
pub mod control;
pub mod inputs;
pub mod rt;
