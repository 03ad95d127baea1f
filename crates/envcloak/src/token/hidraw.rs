//! hidraw token provider - linux sysfs scan
//!
//! walks /sys/class/hidraw and keeps the nodes whose hid report descriptor
//! declares the fido alliance usage page (0xf1d0). the device is never
//! opened; enumeration only reads sysfs.
//!
//! requires read access to /sys, which every linux user has by default.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::token::{TokenHandle, TokenProvider};
use crate::{Error, Result};

const SYSFS_HIDRAW: &str = "/sys/class/hidraw";

/// long usage page item (0x06) carrying 0xf1d0 little-endian
const FIDO_USAGE_PAGE: [u8; 3] = [0x06, 0xd0, 0xf1];

/// fido2 tokens visible through linux hidraw
#[derive(Debug, Clone)]
pub struct HidrawTokenProvider {
    sysfs_root: PathBuf,
}

impl HidrawTokenProvider {
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from(SYSFS_HIDRAW),
        }
    }

    /// scan a different sysfs tree (for testing)
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
        }
    }
}

impl Default for HidrawTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for HidrawTokenProvider {
    fn name(&self) -> &str {
        "hidraw"
    }

    fn list_devices(&self) -> Result<Vec<TokenHandle>> {
        // no hidraw class at all means no hid devices, not a failure
        if !self.sysfs_root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.sysfs_root)
            .map_err(|e| Error::DeviceEnumeration(format!("{}: {}", self.sysfs_root.display(), e)))?;

        let mut nodes: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("hidraw"))
            .collect();
        // hidraw2 before hidraw10
        nodes.sort_by_key(|name| (name.len(), name.clone()));

        let mut devices = Vec::new();
        for node in nodes {
            let device_dir = self.sysfs_root.join(&node).join("device");
            if !is_fido(&device_dir) {
                continue;
            }
            let product = hid_name(&device_dir).unwrap_or_else(|| "unknown".into());
            debug!("fido token on /dev/{} ({})", node, product);
            devices.push(TokenHandle::new(format!("/dev/{} {}", node, product)));
        }

        Ok(devices)
    }
}

fn is_fido(device_dir: &Path) -> bool {
    match std::fs::read(device_dir.join("report_descriptor")) {
        Ok(descriptor) => descriptor
            .windows(FIDO_USAGE_PAGE.len())
            .any(|w| w == FIDO_USAGE_PAGE),
        Err(_) => false,
    }
}

fn hid_name(device_dir: &Path) -> Option<String> {
    let uevent = std::fs::read_to_string(device_dir.join("uevent")).ok()?;
    uevent
        .lines()
        .find_map(|line| line.strip_prefix("HID_NAME="))
        .map(|name| name.trim().to_string())
}
