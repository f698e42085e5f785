//! Handshaken link to one SMC.

use super::transport::{SerialTransport, TermiosPort};
use super::{
    CMD_AUTO_BAUD, CMD_EXIT_SAFE_START, CMD_GET_VARIABLE, SmcErrorStatus, Variable, clamp_speed,
    encode_speed,
};
use parking_lot::Mutex;
use pendulum_common::consts::SMC_MAX_SPEED;
use pendulum_common::hal::{HalError, SerialError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, info, warn};

/// A motor controller that has completed the auto-baud and exit-safe-start
/// handshake.
///
/// Every transaction holds the transport lock for its whole write+read
/// pair, so the link can be shared between tasks. Dropping the link
/// commands zero speed.
pub struct SmcLink<T: SerialTransport = TermiosPort> {
    label: String,
    port: Mutex<T>,
    safe_start_exited: AtomicBool,
    last_speed: AtomicI32,
}

impl SmcLink<TermiosPort> {
    /// Open the tty at `path` and handshake.
    pub fn open(path: &Path) -> Result<Self, HalError> {
        let port = TermiosPort::open(path)?;
        Self::with_transport(path.display().to_string(), port)
    }
}

impl<T: SerialTransport> SmcLink<T> {
    /// Handshake over an already open transport.
    pub fn with_transport(label: impl Into<String>, transport: T) -> Result<Self, HalError> {
        let link = Self {
            label: label.into(),
            port: Mutex::new(transport),
            safe_start_exited: AtomicBool::new(false),
            last_speed: AtomicI32::new(0),
        };

        link.send(&[CMD_AUTO_BAUD])
            .map_err(|e| HalError::HandshakeFailed(format!("{}: auto-baud: {e}", link.label)))?;
        link.exit_safe_start()
            .map_err(|e| HalError::HandshakeFailed(format!("{}: exit safe start: {e}", link.label)))?;

        info!("{}: motor controller link ready", link.label);
        Ok(link)
    }

    /// Device label (the tty path for hardware links).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the exit-safe-start command has been sent.
    pub fn is_safe_start_exited(&self) -> bool {
        self.safe_start_exited.load(Ordering::Acquire)
    }

    /// Last speed sent with [`SmcLink::set_target_speed`].
    pub fn last_speed(&self) -> i32 {
        self.last_speed.load(Ordering::Acquire)
    }

    /// Send the exit-safe-start command.
    ///
    /// Needed again after the controller re-enters safe start (e.g. after
    /// an error clears).
    pub fn exit_safe_start(&self) -> Result<(), SerialError> {
        self.send(&[CMD_EXIT_SAFE_START])?;
        self.safe_start_exited.store(true, Ordering::Release);
        Ok(())
    }

    /// Read raw variable `id` as `lo + 256·hi`.
    pub fn get_variable(&self, id: u8) -> Result<u16, SerialError> {
        let mut reply = [0u8; 2];
        self.query(&[CMD_GET_VARIABLE, id], &mut reply)?;
        Ok(u16::from_le_bytes(reply))
    }

    /// Read a named variable.
    pub fn variable(&self, var: Variable) -> Result<u16, SerialError> {
        self.get_variable(var.id())
    }

    /// Currently active errors.
    pub fn error_status(&self) -> Result<SmcErrorStatus, SerialError> {
        self.variable(Variable::ErrorStatus)
            .map(SmcErrorStatus::from_bits_truncate)
    }

    /// Target speed as the controller sees it.
    pub fn target_speed(&self) -> Result<i16, SerialError> {
        self.variable(Variable::TargetSpeed).map(|raw| raw as i16)
    }

    /// Supply voltage [V].
    pub fn input_voltage(&self) -> Result<f64, SerialError> {
        self.variable(Variable::InputVoltage)
            .map(|mv| f64::from(mv) / 1000.0)
    }

    /// Board temperature [°C].
    pub fn temperature(&self) -> Result<f64, SerialError> {
        self.variable(Variable::Temperature)
            .map(|dc| f64::from(dc) / 10.0)
    }

    /// Command `speed`, clamped to ±3200. Negative drives in reverse.
    pub fn set_target_speed(&self, speed: i32) -> Result<(), SerialError> {
        let speed = clamp_speed(speed);
        self.send(&encode_speed(speed))?;
        self.last_speed.store(speed, Ordering::Release);
        Ok(())
    }

    /// Command `percent` of full speed, clamped to ±100.
    pub fn set_target_percent(&self, percent: f64) -> Result<(), SerialError> {
        let percent = percent.clamp(-100.0, 100.0);
        let speed = (percent / 100.0 * f64::from(SMC_MAX_SPEED)).round() as i32;
        self.set_target_speed(speed)
    }

    fn send(&self, frame: &[u8]) -> Result<(), SerialError> {
        let mut port = self.port.lock();
        write_frame(&mut *port, frame)
    }

    fn query(&self, frame: &[u8], reply: &mut [u8]) -> Result<(), SerialError> {
        let mut port = self.port.lock();
        write_frame(&mut *port, frame)?;

        let mut read = 0;
        while read < reply.len() {
            match port.read(&mut reply[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("{}: read failed: {e}", self.label);
                    return Err(SerialError::ReadFailed);
                }
            }
        }
        if read < reply.len() {
            return Err(SerialError::ShortRead {
                expected: reply.len(),
                read,
            });
        }
        Ok(())
    }
}

fn write_frame<T: SerialTransport>(port: &mut T, frame: &[u8]) -> Result<(), SerialError> {
    match port.write(frame) {
        Ok(n) if n == frame.len() => Ok(()),
        Ok(n) => Err(SerialError::ShortWrite {
            expected: frame.len(),
            written: n,
        }),
        Err(e) => {
            debug!("serial write failed: {e}");
            Err(SerialError::WriteFailed)
        }
    }
}

impl<T: SerialTransport> Drop for SmcLink<T> {
    fn drop(&mut self) {
        if !self.is_safe_start_exited() {
            return;
        }
        if let Err(e) = self.set_target_speed(0) {
            warn!("{}: failed to stop motor on close: {e}", self.label);
        }
    }
}
