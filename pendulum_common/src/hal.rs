//! Hardware error taxonomy.
//!
//! - [`HalError`]: construction-fatal. A device that cannot be opened,
//!   mapped or handshaken is reported to the owning application and the
//!   core never starts.
//! - [`SerialError`]: transient. One serial transaction failed; the caller
//!   of that single operation sees it and the owning loop carries on.

use crate::consts::SERIAL_ERROR;
use thiserror::Error;

/// Construction-time hardware failures.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Counter registers or sysfs attributes could not be accessed.
    #[error("Hardware access error: {0}")]
    HardwareAccess(String),

    /// Serial device could not be opened or configured.
    #[error("Serial open error: {0}")]
    SerialOpen(String),

    /// Auto-baud / exit-safe-start handshake could not be sent.
    #[error("Motor controller handshake failed: {0}")]
    HandshakeFailed(String),

    /// Requested channel or device does not exist.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A single failed serial transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerialError {
    /// The write system call failed.
    #[error("serial write failed")]
    WriteFailed,

    /// Fewer bytes were written than the frame holds.
    #[error("short serial write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// The read system call failed.
    #[error("serial read failed")]
    ReadFailed,

    /// Fewer bytes were read than the reply holds.
    #[error("short serial read: {read} of {expected} bytes")]
    ShortRead { expected: usize, read: usize },
}

impl SerialError {
    /// Legacy integer sentinel for this failure.
    pub const fn code(&self) -> i32 {
        SERIAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_error_display() {
        let err = HalError::HardwareAccess("eqep1".to_string());
        assert!(err.to_string().contains("eqep1"));

        let err = HalError::SerialOpen("/dev/ttyO2".to_string());
        assert!(err.to_string().contains("/dev/ttyO2"));
    }

    #[test]
    fn test_serial_error_maps_to_sentinel() {
        let err = SerialError::ShortRead {
            expected: 2,
            read: 1,
        };
        assert_eq!(err.code(), SERIAL_ERROR);
        assert!(err.to_string().contains("1 of 2"));
    }
}
