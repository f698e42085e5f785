//! Device pre-flight check.
//!
//! Before any device is opened, every required node is probed. For a
//! missing node the overlays that provide it are written, one name per
//! write, to the cape manager slots file.

use pendulum_common::config::DeviceRequirement;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome for one required device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCheck {
    /// Probed path.
    pub path: PathBuf,
    /// Whether the path existed when probed.
    pub present: bool,
    /// Overlays written to the slots file for this device.
    pub overlays_loaded: Vec<String>,
    /// Overlays that could not be written.
    pub overlays_failed: Vec<String>,
}

/// Result of [`check_devices`].
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    /// Per-device outcome, in requirement order.
    pub devices: Vec<DeviceCheck>,
    /// Set when the slots file could not be opened.
    pub slots_error: Option<String>,
}

impl PreflightReport {
    /// Every required device existed when probed.
    pub fn all_present(&self) -> bool {
        self.devices.iter().all(|d| d.present)
    }

    /// Every device is present or had all of its overlays requested.
    pub fn ready(&self) -> bool {
        self.devices.iter().all(|d| {
            d.present || (d.overlays_failed.is_empty() && self.slots_error.is_none())
        })
    }

    /// Paths that were missing.
    pub fn missing(&self) -> impl Iterator<Item = &Path> {
        self.devices
            .iter()
            .filter(|d| !d.present)
            .map(|d| d.path.as_path())
    }
}

/// Probe `requirements`, loading overlays through `slots` for missing ones.
///
/// With `slots == None` nothing is loaded and missing devices stay missing.
pub fn check_devices(requirements: &[DeviceRequirement], slots: Option<&Path>) -> PreflightReport {
    let mut report = PreflightReport::default();

    for req in requirements {
        let present = req.path.exists();
        let mut check = DeviceCheck {
            path: req.path.clone(),
            present,
            overlays_loaded: Vec::new(),
            overlays_failed: Vec::new(),
        };

        if present {
            info!("{}: found", req.path.display());
        } else {
            warn!("{}: not found", req.path.display());
            match slots {
                Some(slots) => load_overlays(slots, &req.overlays, &mut check, &mut report),
                None => check.overlays_failed = req.overlays.clone(),
            }
        }
        report.devices.push(check);
    }

    report
}

fn load_overlays(
    slots: &Path,
    overlays: &[String],
    check: &mut DeviceCheck,
    report: &mut PreflightReport,
) {
    let mut file = match OpenOptions::new().write(true).open(slots) {
        Ok(f) => f,
        Err(e) => {
            let msg = format!("{}: {e}", slots.display());
            warn!("Cannot open cape manager slots, overlays not loaded: {msg}");
            report.slots_error.get_or_insert(msg);
            check.overlays_failed = overlays.to_vec();
            return;
        }
    };

    for overlay in overlays {
        match file.write_all(overlay.as_bytes()).and_then(|()| file.flush()) {
            Ok(()) => {
                info!("Loaded overlay {overlay}");
                check.overlays_loaded.push(overlay.clone());
            }
            Err(e) => {
                warn!("Failed to load overlay {overlay}: {e}");
                check.overlays_failed.push(overlay.clone());
            }
        }
    }
}
