//! Periodic task runtime.
//!
//! Encoder samplers, the controller and the status renderer all run as
//! independent units of repeated work on their own OS thread:
//!
//! 1. [`spawn`] starts the loop and returns immediately with a [`TaskHandle`].
//! 2. [`TaskHandle::stop`] requests termination. The task observes the
//!    request at the top of its next iteration; an iteration in flight always
//!    completes.
//! 3. [`TaskHandle::join`] blocks until the thread has exited.
//!
//! Each iteration has exactly one suspension point, chosen by
//! [`PeriodicTask::pacing`]. State shared with other tasks must go through
//! single-writer atomics (see [`crate::atomic`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How a task gives up the CPU once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// `sched_yield` and poll again immediately.
    Yield,
    /// Sleep for a fixed interval.
    Sleep(Duration),
}

/// A unit of repeated work.
pub trait PeriodicTask: Send + 'static {
    /// Thread name (truncated to 15 bytes by the kernel).
    fn name(&self) -> &str;

    /// Called once on the task thread before the first iteration.
    fn on_start(&mut self) {}

    /// One loop iteration.
    fn step(&mut self);

    /// Suspension after each iteration.
    fn pacing(&self) -> Pacing {
        Pacing::Yield
    }

    /// Called once on the task thread after the last iteration.
    fn on_stop(&mut self) {}
}

/// Cooperative stop request shared between a task and its owners.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// A fresh, un-requested signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the task to exit after its current iteration.
    #[inline]
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Errors from the task runtime.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The OS refused to create the thread.
    #[error("failed to spawn task '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The task body panicked.
    #[error("task '{name}' panicked")]
    Panicked { name: String },
}

/// Owner's view of a running task.
///
/// Dropping the handle stops and joins the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request termination; does not wait.
    pub fn stop(&self) {
        debug!("Stop requested for task '{}'", self.name);
        self.stop.request();
    }

    /// Clone of the stop signal, for signal handlers and supervisors.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Whether the task thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Block until the task has exited.
    ///
    /// Does not request a stop by itself; call [`TaskHandle::stop`] first
    /// unless the task ends on its own.
    pub fn join(mut self) -> Result<(), TaskError> {
        self.join_inner()
    }

    /// Request termination and wait for it.
    pub fn stop_and_join(self) -> Result<(), TaskError> {
        self.stop();
        self.join()
    }

    fn join_inner(&mut self) -> Result<(), TaskError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| TaskError::Panicked {
                name: self.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop.request();
            if let Err(e) = self.join_inner() {
                warn!("{e}");
            }
        }
    }
}

/// Start `task` on a new thread with a fresh stop signal.
pub fn spawn<T: PeriodicTask>(task: T) -> Result<TaskHandle, TaskError> {
    spawn_with_signal(task, StopSignal::new())
}

/// Start `task` on a new thread, stopping when `stop` is requested.
pub fn spawn_with_signal<T: PeriodicTask>(
    mut task: T,
    stop: StopSignal,
) -> Result<TaskHandle, TaskError> {
    let name = task.name().to_string();
    let task_stop = stop.clone();

    let thread = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            task.on_start();
            while !task_stop.is_requested() {
                task.step();
                match task.pacing() {
                    Pacing::Yield => thread::yield_now(),
                    Pacing::Sleep(interval) => thread::sleep(interval),
                }
            }
            task.on_stop();
        })
        .map_err(|e| TaskError::SpawnFailed {
            name: name.clone(),
            reason: e.to_string(),
        })?;

    debug!("Task '{name}' started");

    Ok(TaskHandle {
        name,
        stop,
        thread: Some(thread),
    })
}
