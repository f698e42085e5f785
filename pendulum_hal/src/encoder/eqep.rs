//! eQEP counters through the Linux `eqep` platform driver.
//!
//! Each channel is a sysfs directory with one attribute per register
//! group. Reads and writes are positional (`pread`/`pwrite` at offset 0)
//! so an open file is reused for every access.

use super::QuadratureCounter;
use pendulum_common::hal::HalError;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Directory holding the platform devices.
pub const SYSFS_PLATFORM_DEVICES: &str = "/sys/bus/platform/devices";

/// Device names of eQEP channels 0, 1, 2.
pub const EQEP_DEVICES: [&str; 3] = ["48300180.eqep", "48302180.eqep", "48304180.eqep"];

/// `mode` attribute value for absolute position counting.
const MODE_ABSOLUTE: u8 = 0;

/// One eQEP channel.
#[derive(Debug)]
pub struct SysfsEqep {
    dir: PathBuf,
    enabled: File,
    mode: File,
    period: File,
    position: File,
}

impl SysfsEqep {
    /// Open eQEP `channel` (0, 1 or 2).
    pub fn open(channel: u8) -> Result<Self, HalError> {
        let device = EQEP_DEVICES
            .get(channel as usize)
            .ok_or_else(|| HalError::DeviceNotFound(format!("eQEP channel {channel}")))?;
        Self::open_dir(Path::new(SYSFS_PLATFORM_DEVICES).join(device))
    }

    /// Open the eQEP attributes under `dir`.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, HalError> {
        let dir = dir.into();
        let open = |attr: &str| {
            let path = dir.join(attr);
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| HalError::HardwareAccess(format!("{}: {e}", path.display())))
        };

        Ok(Self {
            enabled: open("enabled")?,
            mode: open("mode")?,
            period: open("period")?,
            position: open("position")?,
            dir,
        })
    }

    /// Sysfs directory of this channel.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_attr(&self, file: &File, name: &str, value: impl Display) -> Result<(), HalError> {
        let text = format!("{value}\n");
        file.write_at(text.as_bytes(), 0)
            .map(|_| ())
            .map_err(|e| HalError::HardwareAccess(format!("{}/{name}: {e}", self.dir.display())))
    }
}

/// Parse the first line of an attribute read.
fn parse_attr(buf: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(buf).ok()?;
    text.lines().next()?.trim().parse().ok()
}

impl QuadratureCounter for SysfsEqep {
    fn reset(&self) -> Result<(), HalError> {
        self.write_attr(&self.position, "position", 0)
    }

    fn configure_quadrature(&self, unit_period_ns: u64) -> Result<(), HalError> {
        self.write_attr(&self.mode, "mode", MODE_ABSOLUTE)?;
        self.write_attr(&self.period, "period", unit_period_ns)?;
        self.write_attr(&self.enabled, "enabled", 1)
    }

    fn read_position(&self) -> Result<i64, HalError> {
        let mut buf = [0u8; 24];
        let n = self
            .position
            .read_at(&mut buf, 0)
            .map_err(|e| HalError::HardwareAccess(format!("{}/position: {e}", self.dir.display())))?;
        parse_attr(&buf[..n]).ok_or_else(|| {
            HalError::HardwareAccess(format!("{}/position: unparsable value", self.dir.display()))
        })
    }

    fn set_position(&self, position: i64) -> Result<(), HalError> {
        self.write_attr(&self.position, "position", position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_eqep() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (attr, value) in [
            ("enabled", "0\n"),
            ("mode", "1\n"),
            ("period", "0\n"),
            ("position", "1234\n"),
        ] {
            fs::write(dir.path().join(attr), value).unwrap();
        }
        dir
    }

    fn attr(dir: &TempDir, name: &str) -> i64 {
        parse_attr(&fs::read(dir.path().join(name)).unwrap()).unwrap()
    }

    #[test]
    fn open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = SysfsEqep::open_dir(dir.path().join("nope.eqep"));
        assert!(matches!(result, Err(HalError::HardwareAccess(_))));
    }

    #[test]
    fn unknown_channel_rejected() {
        assert!(matches!(
            SysfsEqep::open(7),
            Err(HalError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn reads_position_attribute() {
        let dir = fake_eqep();
        let eqep = SysfsEqep::open_dir(dir.path()).unwrap();
        assert_eq!(eqep.read_position().unwrap(), 1234);
    }

    #[test]
    fn reset_and_configure_write_attributes() {
        let dir = fake_eqep();
        let eqep = SysfsEqep::open_dir(dir.path()).unwrap();
        eqep.reset().unwrap();
        eqep.configure_quadrature(10_000).unwrap();

        assert_eq!(attr(&dir, "position"), 0);
        assert_eq!(attr(&dir, "mode"), 0);
        assert_eq!(attr(&dir, "period"), 10_000);
        assert_eq!(attr(&dir, "enabled"), 1);
        assert_eq!(eqep.read_position().unwrap(), 0);
    }

    #[test]
    fn set_position_negative() {
        let dir = fake_eqep();
        let eqep = SysfsEqep::open_dir(dir.path()).unwrap();
        eqep.set_position(-5).unwrap();
        assert_eq!(eqep.read_position().unwrap(), -5);
    }
}
