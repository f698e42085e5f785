//! Configuration loading traits and the `pendulum.toml` schema.
//!
//! Every section except `[shared]` has complete defaults taken from
//! [`crate::consts`], so a minimal file only names the service.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pendulum_common::config::{ConfigError, ConfigLoader, PendulumConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PendulumConfig::load(Path::new("config/pendulum.toml"))?;
//!     config.validate()?;
//!     println!("Controller: {:?}", config.controller.kind);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_SLOTS_PATH, ENCODER_PPR, ENCODER_PULLEY_TEETH, EQEP_CHANNELS,
    MOTOR_DEAD_BAND, MOTOR_EQEP, MOTOR_PULLEY_TEETH, NOMINAL_SUPPLY_VOLTAGE, PENDULUM_EQEP,
    SMC_MAX_SPEED, SMC_TTY,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common fields shared by every pendulum application.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "pendulum-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "pendulum".to_string(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Controller selection ───────────────────────────────────────────

/// Controller action.
///
/// `Direct`: a positive output drives the measured variable up.
/// `Reverse`: a positive output drives it down; live gains are negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Direct,
    Reverse,
}

impl Direction {
    /// Map the legacy numeric flag (0 = direct, anything else = reverse).
    pub const fn from_flag(flag: i32) -> Self {
        if flag == 0 { Self::Direct } else { Self::Reverse }
    }

    /// The opposite action.
    pub const fn flipped(self) -> Self {
        match self {
            Self::Direct => Self::Reverse,
            Self::Reverse => Self::Direct,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ConfigError;

    /// Accepts `direct`/`reverse` or the legacy numeric flag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "reverse" => Ok(Self::Reverse),
            other => other
                .parse::<i32>()
                .map(Self::from_flag)
                .map_err(|_| ConfigError::ParseError(format!("unknown direction '{s}'"))),
        }
    }
}

/// Which control law drives the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Setpoint-tracking PID on pendulum angle.
    #[default]
    Basic,
    /// PID over pendulum angle and angular velocity.
    Velocity,
    /// Four-state LQR feedback.
    Lqr,
}

impl std::str::FromStr for ControllerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "velocity" => Ok(Self::Velocity),
            "lqr" => Ok(Self::Lqr),
            _ => Err(ConfigError::ParseError(format!("unknown controller '{s}'"))),
        }
    }
}

// ─── Sections ───────────────────────────────────────────────────────

/// `[encoders]`: channel assignment and calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// eQEP channel of the pendulum encoder.
    pub pendulum_channel: u8,
    /// eQEP channel of the motor-side encoder.
    pub motor_channel: u8,
    /// Encoder pulses per revolution (x4 mode).
    pub encoder_ppr: f64,
    /// Teeth on the motor pulley.
    pub motor_pulley_teeth: f64,
    /// Teeth on the encoder pulley.
    pub encoder_pulley_teeth: f64,
}

impl EncoderConfig {
    /// Pulses per revolution of the pendulum shaft.
    pub fn pendulum_ppr(&self) -> f64 {
        self.encoder_ppr
    }

    /// Pulses per revolution of the motor shaft, through the pulley ratio.
    pub fn motor_ppr(&self) -> f64 {
        self.encoder_ppr * self.motor_pulley_teeth / self.encoder_pulley_teeth
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            pendulum_channel: PENDULUM_EQEP,
            motor_channel: MOTOR_EQEP,
            encoder_ppr: ENCODER_PPR,
            motor_pulley_teeth: MOTOR_PULLEY_TEETH,
            encoder_pulley_teeth: ENCODER_PULLEY_TEETH,
        }
    }
}

/// `[motor]`: motor controller link and command shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Serial device of the motor controller.
    pub tty: PathBuf,
    /// Offset added to every non-zero command to overcome static friction.
    pub dead_band: i32,
    /// Largest speed magnitude sent to the controller.
    pub max_speed: i32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            tty: PathBuf::from(SMC_TTY),
            dead_band: MOTOR_DEAD_BAND,
            max_speed: SMC_MAX_SPEED,
        }
    }
}

/// `[controller]`: control law selection and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Control law.
    pub kind: ControllerKind,
    /// Proportional gain (PID variants).
    pub kp: f64,
    /// Integral gain (PID variants).
    pub ki: f64,
    /// Derivative gain (PID variants).
    pub kd: f64,
    /// State feedback gains `[k1, k2, k3, k4]` (LQR).
    pub lqr_gains: [f64; 4],
    /// Controller action.
    pub direction: Direction,
    /// Sample period [ms].
    pub sample_time_ms: u32,
    /// Lower output bound.
    pub output_min: f64,
    /// Upper output bound.
    pub output_max: f64,
    /// Supply voltage used to normalise state-feedback effort [V].
    pub supply_voltage: f64,
    /// Pendulum angle setpoint [rad].
    pub setpoint: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kind: ControllerKind::Basic,
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            lqr_gains: [-23.1455, 126.3112, -5.7435, 7.5213],
            direction: Direction::Direct,
            sample_time_ms: 20,
            output_min: -(SMC_MAX_SPEED as f64),
            output_max: SMC_MAX_SPEED as f64,
            supply_voltage: NOMINAL_SUPPLY_VOLTAGE,
            setpoint: 0.0,
        }
    }
}

/// `[balance]`: supervisor loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Angle the pendulum must be raised to before control starts [deg].
    pub raise_angle_deg: f64,
    /// Accepted deviation from `raise_angle_deg` [deg].
    pub raise_tolerance_deg: f64,
    /// Beyond this tilt from vertical the motor is stopped [deg].
    pub tilt_cutoff_deg: f64,
    /// How long the controller runs [s].
    pub run_duration_s: f64,
    /// Supervisor loop period [µs].
    pub loop_period_us: u64,
    /// Status lines are refreshed every N supervisor iterations.
    pub status_every: u32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            raise_angle_deg: 180.0,
            raise_tolerance_deg: 1.0,
            tilt_cutoff_deg: 30.0,
            run_duration_s: 90.0,
            loop_period_us: 1000,
            status_every: 50,
        }
    }
}

/// A device node that must exist before start-up, with the overlays that
/// provide it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRequirement {
    /// Device path to probe.
    pub path: PathBuf,
    /// Overlay names to load if the device is missing.
    #[serde(default)]
    pub overlays: Vec<String>,
}

/// `[preflight]`: device presence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Run the check at all.
    pub enabled: bool,
    /// Cape manager slots file; overlays are written here when missing.
    pub slots_path: Option<PathBuf>,
    /// Required devices.
    pub devices: Vec<DeviceRequirement>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slots_path: Some(PathBuf::from(DEFAULT_SLOTS_PATH)),
            devices: vec![
                DeviceRequirement {
                    path: PathBuf::from(SMC_TTY),
                    overlays: vec!["ADAFRUIT-UART2".to_string()],
                },
                DeviceRequirement {
                    path: PathBuf::from("/sys/bus/platform/devices/48300180.eqep"),
                    overlays: vec!["PyBBIO-epwmss0".to_string(), "PyBBIO-eqep0".to_string()],
                },
                DeviceRequirement {
                    path: PathBuf::from("/sys/bus/platform/devices/48302180.eqep"),
                    overlays: vec!["PyBBIO-epwmss1".to_string(), "PyBBIO-eqep1".to_string()],
                },
            ],
        }
    }
}

/// `[runtime]`: real-time scheduling of the supervisor thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// CPU core to pin to.
    pub cpu_core: usize,
    /// SCHED_FIFO priority.
    pub rt_priority: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cpu_core: 0,
            rt_priority: 80,
        }
    }
}

/// Complete `pendulum.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendulumConfig {
    /// Common fields.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Encoder channels and calibration.
    #[serde(default)]
    pub encoders: EncoderConfig,
    /// Motor controller link.
    #[serde(default)]
    pub motor: MotorConfig,
    /// Control law.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Supervisor loop.
    #[serde(default)]
    pub balance: BalanceConfig,
    /// Device pre-flight.
    #[serde(default)]
    pub preflight: PreflightConfig,
    /// Scheduling.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl PendulumConfig {
    /// Semantic validation across all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let enc = &self.encoders;
        if enc.pendulum_channel >= EQEP_CHANNELS || enc.motor_channel >= EQEP_CHANNELS {
            return Err(invalid(format!(
                "encoder channels must be < {EQEP_CHANNELS} (pendulum={}, motor={})",
                enc.pendulum_channel, enc.motor_channel
            )));
        }
        if enc.pendulum_channel == enc.motor_channel {
            return Err(invalid(format!(
                "pendulum and motor share eQEP channel {}",
                enc.pendulum_channel
            )));
        }
        if enc.encoder_ppr <= 0.0 || enc.motor_pulley_teeth <= 0.0 || enc.encoder_pulley_teeth <= 0.0
        {
            return Err(invalid("encoder ppr and pulley teeth must be > 0".into()));
        }

        let motor = &self.motor;
        if motor.max_speed <= 0 || motor.max_speed > SMC_MAX_SPEED {
            return Err(invalid(format!(
                "motor.max_speed must be in 1..={SMC_MAX_SPEED}, got {}",
                motor.max_speed
            )));
        }
        if motor.dead_band < 0 || motor.dead_band >= motor.max_speed {
            return Err(invalid(format!(
                "motor.dead_band must be in 0..{}, got {}",
                motor.max_speed, motor.dead_band
            )));
        }

        let ctrl = &self.controller;
        if ctrl.output_min >= ctrl.output_max {
            return Err(invalid(format!(
                "controller output_min ({}) must be < output_max ({})",
                ctrl.output_min, ctrl.output_max
            )));
        }
        if ctrl.sample_time_ms == 0 {
            return Err(invalid("controller.sample_time_ms must be > 0".into()));
        }
        if ctrl.supply_voltage <= 0.0 {
            return Err(invalid("controller.supply_voltage must be > 0".into()));
        }
        if ctrl.kind != ControllerKind::Lqr && (ctrl.kp < 0.0 || ctrl.ki < 0.0 || ctrl.kd < 0.0) {
            return Err(invalid(format!(
                "PID gains must be non-negative (kp={}, ki={}, kd={})",
                ctrl.kp, ctrl.ki, ctrl.kd
            )));
        }

        let bal = &self.balance;
        if bal.tilt_cutoff_deg <= 0.0 || bal.raise_tolerance_deg <= 0.0 {
            return Err(invalid("balance angles must be > 0".into()));
        }
        if bal.run_duration_s <= 0.0 {
            return Err(invalid("balance.run_duration_s must be > 0".into()));
        }
        if bal.status_every == 0 {
            return Err(invalid("balance.status_every must be > 0".into()));
        }

        Ok(())
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::ValidationError(msg)
}
