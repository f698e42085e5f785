//! System-wide constants for the pendulum workspace.
//!
//! Single source of truth for calibration values, protocol limits and
//! default paths. Configuration defaults are built from these.

use static_assertions::const_assert;
use std::time::Duration;

/// eQEP channel wired to the pendulum encoder.
pub const PENDULUM_EQEP: u8 = 0;

/// eQEP channel wired to the motor-side encoder.
pub const MOTOR_EQEP: u8 = 1;

/// Number of eQEP channels on the SoC.
pub const EQEP_CHANNELS: u8 = 3;

/// Encoder pulses per revolution (x4 quadrature decoding).
pub const ENCODER_PPR: f64 = 1600.0;

/// Teeth on the motor pulley.
pub const MOTOR_PULLEY_TEETH: f64 = 40.0;

/// Teeth on the encoder pulley.
pub const ENCODER_PULLEY_TEETH: f64 = 12.0;

/// Effective motor-side pulses per revolution after pulley gearing.
pub const MOTOR_PPR: f64 = ENCODER_PPR * MOTOR_PULLEY_TEETH / ENCODER_PULLEY_TEETH;

/// Serial device the motor controller is attached to.
pub const SMC_TTY: &str = "/dev/ttyO2";

/// Maximum speed magnitude accepted by the motor controller.
pub const SMC_MAX_SPEED: i32 = 3200;

/// Sentinel returned for a failed serial transaction.
pub const SERIAL_ERROR: i32 = -9999;

/// Nominal supply voltage used to normalise state-feedback control effort.
pub const NOMINAL_SUPPLY_VOLTAGE: f64 = 11.7;

/// Smallest command the motor actually responds to.
pub const MOTOR_DEAD_BAND: i32 = 350;

/// Pause between encoder samples.
pub const ENCODER_SAMPLE_INTERVAL: Duration = Duration::from_micros(20);

/// Below this interval a velocity estimate is not resolvable.
pub const MIN_RESOLVABLE_DT: Duration = Duration::from_micros(1);

/// eQEP unit timer period [ns].
pub const EQEP_UNIT_PERIOD_NS: u64 = 10_000;

/// Default controller sample period [ms].
pub const DEFAULT_SAMPLE_TIME_MS: u32 = 100;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/pendulum.toml";

/// Cape manager slots file used to load device tree overlays.
pub const DEFAULT_SLOTS_PATH: &str = "/sys/devices/bone_capemgr.9/slots";

// Speed magnitude must fit the 5 + 7 bit frame encoding.
const_assert!(SMC_MAX_SPEED < (1 << 12));
const_assert!(MOTOR_DEAD_BAND < SMC_MAX_SPEED);
