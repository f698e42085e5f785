//! Real-time process setup.
//!
//! Locks memory, prefaults the stack, pins the calling thread to one core
//! and switches it to `SCHED_FIFO`. Threads spawned afterwards inherit the
//! affinity and scheduling policy, so this runs once on the main thread
//! before any task starts.
//!
//! Without the `rt` feature every step except prefaulting is a no-op.

use thiserror::Error;
use tracing::info;

/// Stack prefaulted before entering real-time mode.
const PREFAULT_STACK_BYTES: usize = 512 * 1024;

/// A real-time system call failed.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("mlockall failed: {0}")]
    LockMemory(String),
    #[error("cannot pin to CPU {cpu}: {reason}")]
    Affinity { cpu: usize, reason: String },
    #[error("SCHED_FIFO priority {priority} rejected: {reason}")]
    Scheduler { priority: i32, reason: String },
}

/// Full setup sequence: lock, prefault, pin, schedule.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    lock_memory()?;
    prefault_stack();
    set_affinity(cpu_core)?;
    set_scheduler(rt_priority)?;
    if cfg!(feature = "rt") {
        info!("Real-time mode: CPU {cpu_core}, SCHED_FIFO {rt_priority}");
    }
    Ok(())
}

#[cfg(feature = "rt")]
fn lock_memory() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::LockMemory(e.to_string()))
}

#[cfg(not(feature = "rt"))]
fn lock_memory() -> Result<(), RtError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; PREFAULT_STACK_BYTES];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { std::ptr::write_volatile(byte, 0xA5) };
    }
    std::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    set.set(cpu).map_err(|e| RtError::Affinity {
        cpu,
        reason: e.to_string(),
    })?;
    sched_setaffinity(Pid::from_raw(0), &set).map_err(|e| RtError::Affinity {
        cpu,
        reason: e.to_string(),
    })
}

#[cfg(not(feature = "rt"))]
fn set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtError::Scheduler {
            priority,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_without_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        assert!(rt_setup(0, 80).is_ok());
    }

    #[test]
    fn error_messages_name_the_failing_step() {
        let e = RtError::Scheduler {
            priority: 90,
            reason: "Operation not permitted".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("SCHED_FIFO"));
        assert!(msg.contains("90"));

        let e = RtError::Affinity {
            cpu: 7,
            reason: "Invalid argument".into(),
        };
        assert!(e.to_string().contains("CPU 7"));
    }
}
