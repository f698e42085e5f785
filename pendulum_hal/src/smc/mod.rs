//! Pololu Simple Motor Controller (SMC) over a serial line.
//!
//! ## Protocol (compact Pololu protocol)
//!
//! | Frame | Bytes |
//! |-------|-------|
//! | auto-baud | `0xAA` |
//! | exit safe start | `0x83` |
//! | forward speed | `0x85, speed & 0x1F, (speed >> 5) & 0x7F` |
//! | reverse speed | `0x86, speed & 0x1F, (speed >> 5) & 0x7F` |
//! | get variable | `0xA1, id` → reply `lo, hi` |
//!
//! The controller ignores speed commands until it has seen the auto-baud
//! byte and the exit-safe-start command; [`SmcLink`] sends both before it
//! hands out a link.

mod link;
mod registry;
mod sim;
mod transport;

pub use link::SmcLink;
pub use registry::SerialRegistry;
pub use sim::SimulatedSmc;
pub use transport::{SerialTransport, TermiosPort};

use bitflags::bitflags;
use pendulum_common::consts::SMC_MAX_SPEED;

/// Baud rate detection byte.
pub const CMD_AUTO_BAUD: u8 = 0xAA;
/// Leave the safe-start state.
pub const CMD_EXIT_SAFE_START: u8 = 0x83;
/// Motor forward, followed by a 12-bit speed.
pub const CMD_MOTOR_FORWARD: u8 = 0x85;
/// Motor reverse, followed by a 12-bit speed.
pub const CMD_MOTOR_REVERSE: u8 = 0x86;
/// Read a 16-bit controller variable.
pub const CMD_GET_VARIABLE: u8 = 0xA1;

/// Controller variables readable with [`CMD_GET_VARIABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Variable {
    /// Currently active errors ([`SmcErrorStatus`]).
    ErrorStatus = 0,
    /// Errors seen since the last read.
    ErrorsOccurred = 1,
    /// Serial errors seen since the last read.
    SerialErrorsOccurred = 2,
    /// Limit/kill switch status.
    LimitStatus = 3,
    /// Signed target speed, −3200..=3200.
    TargetSpeed = 20,
    /// Signed current speed, −3200..=3200.
    Speed = 21,
    /// Brake amount (0..=32, 0xFF when not braking).
    BrakeAmount = 22,
    /// Input voltage [mV].
    InputVoltage = 23,
    /// Board temperature [0.1 °C].
    Temperature = 24,
}

impl Variable {
    /// Wire id.
    pub const fn id(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Bits of the error status word (variable 0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SmcErrorStatus: u16 {
        const SAFE_START = 1 << 0;
        const REQUIRED_CHANNEL_INVALID = 1 << 1;
        const SERIAL = 1 << 2;
        const COMMAND_TIMEOUT = 1 << 3;
        const LIMIT_KILL_SWITCH = 1 << 4;
        const LOW_VIN = 1 << 5;
        const HIGH_VIN = 1 << 6;
        const OVER_TEMPERATURE = 1 << 7;
        const MOTOR_DRIVER = 1 << 8;
        const ERR_LINE_HIGH = 1 << 9;
    }
}

impl SmcErrorStatus {
    /// Whether anything other than safe start prevents driving.
    pub fn blocks_motion(&self) -> bool {
        !self.difference(Self::SAFE_START).is_empty()
    }
}

/// Clamp `speed` to the controller's range.
#[inline]
pub const fn clamp_speed(speed: i32) -> i32 {
    if speed > SMC_MAX_SPEED {
        SMC_MAX_SPEED
    } else if speed < -SMC_MAX_SPEED {
        -SMC_MAX_SPEED
    } else {
        speed
    }
}

/// Encode a (clamped) target speed frame.
pub const fn encode_speed(speed: i32) -> [u8; 3] {
    let speed = clamp_speed(speed);
    let (cmd, magnitude) = if speed < 0 {
        (CMD_MOTOR_REVERSE, -speed)
    } else {
        (CMD_MOTOR_FORWARD, speed)
    };
    [cmd, (magnitude & 0x1F) as u8, ((magnitude >> 5) & 0x7F) as u8]
}

/// Decode a speed frame back to a signed speed.
pub const fn decode_speed(frame: [u8; 3]) -> Option<i32> {
    let magnitude = (frame[1] as i32 & 0x1F) | ((frame[2] as i32 & 0x7F) << 5);
    match frame[0] {
        CMD_MOTOR_FORWARD => Some(magnitude),
        CMD_MOTOR_REVERSE => Some(-magnitude),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_forward_and_reverse() {
        assert_eq!(encode_speed(200), [0x85, 0x08, 0x06]);
        assert_eq!(encode_speed(-200), [0x86, 0x08, 0x06]);
        assert_eq!(encode_speed(0), [0x85, 0x00, 0x00]);
    }

    #[test]
    fn encode_clamps_to_max() {
        assert_eq!(encode_speed(5000), encode_speed(SMC_MAX_SPEED));
        assert_eq!(encode_speed(-5000), encode_speed(-SMC_MAX_SPEED));
        assert_eq!(decode_speed(encode_speed(-5000)), Some(-SMC_MAX_SPEED));
    }

    #[test]
    fn decode_rejects_other_commands() {
        assert_eq!(decode_speed([CMD_GET_VARIABLE, 0, 0]), None);
    }

    #[test]
    fn error_status_bits() {
        let status = SmcErrorStatus::from_bits_truncate(0b10_0000_0001);
        assert!(status.contains(SmcErrorStatus::SAFE_START));
        assert!(status.contains(SmcErrorStatus::ERR_LINE_HIGH));
        assert!(status.blocks_motion());
        assert!(!SmcErrorStatus::SAFE_START.blocks_motion());
    }

    #[test]
    fn variable_ids() {
        assert_eq!(Variable::ErrorStatus.id(), 0);
        assert_eq!(Variable::TargetSpeed.id(), 20);
        assert_eq!(Variable::InputVoltage.id(), 23);
        assert_eq!(Variable::Temperature.id(), 24);
    }
}
