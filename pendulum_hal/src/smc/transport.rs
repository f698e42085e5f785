//! Byte transports for the SMC link.

use nix::sys::termios::{self, BaudRate, FlushArg, SetArg, SpecialCharacterIndices};
use pendulum_common::hal::HalError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::debug;

/// Baud rate of the SMC serial line.
pub const SMC_BAUD: BaudRate = BaudRate::B9600;

/// Minimum bytes before a read returns.
const VMIN: u8 = 1;
/// Inter-byte timeout [0.1 s].
const VTIME: u8 = 10;

/// Raw byte I/O to a motor controller.
pub trait SerialTransport: Send + 'static {
    /// Write `bytes`, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Read into `buf`, returning how many bytes arrived (0 on timeout).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A tty configured for the SMC: raw, 9600 baud, `VMIN = 1`, `VTIME = 10`.
#[derive(Debug)]
pub struct TermiosPort {
    file: File,
}

impl TermiosPort {
    /// Open and configure `path`.
    pub fn open(path: &Path) -> Result<Self, HalError> {
        let serial_err = |what: &str, e: &dyn std::fmt::Display| {
            HalError::SerialOpen(format!("{}: {what}: {e}", path.display()))
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|e| serial_err("open", &e))?;

        let mut tio = termios::tcgetattr(&file).map_err(|e| serial_err("tcgetattr", &e))?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, SMC_BAUD).map_err(|e| serial_err("cfsetspeed", &e))?;
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = VMIN;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = VTIME;
        termios::tcflush(&file, FlushArg::TCIOFLUSH).map_err(|e| serial_err("tcflush", &e))?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)
            .map_err(|e| serial_err("tcsetattr", &e))?;

        debug!("{}: configured raw 9600 8N1", path.display());
        Ok(Self { file })
    }
}

impl SerialTransport for TermiosPort {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.file.write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device_fails() {
        let result = TermiosPort::open(Path::new("/nonexistent/ttyO9"));
        assert!(matches!(result, Err(HalError::SerialOpen(_))));
    }

    #[test]
    fn open_regular_file_is_not_a_tty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = TermiosPort::open(file.path());
        assert!(matches!(result, Err(HalError::SerialOpen(msg)) if msg.contains("tcgetattr")));
    }
}
