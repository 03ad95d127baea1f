//! software token provider - fixed descriptors, no hardware
//!
//! useful for development and testing, NOT a security boundary.

use std::sync::{Arc, RwLock};

use crate::token::{TokenHandle, TokenProvider};
use crate::{Error, Result};

/// in-memory list of pretend devices
#[derive(Debug, Clone, Default)]
pub struct FixedTokenProvider {
    devices: Arc<RwLock<Vec<TokenHandle>>>,
}

impl FixedTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// provider with a single connected device
    pub fn with_device(descriptor: &str) -> Self {
        let provider = Self::new();
        provider.devices_mut(|devices| devices.push(TokenHandle::new(descriptor)));
        provider
    }

    /// simulate plugging in a device
    pub fn plug(&self, descriptor: &str) {
        self.devices_mut(|devices| devices.push(TokenHandle::new(descriptor)));
    }

    /// simulate unplugging every device
    pub fn unplug_all(&self) {
        self.devices_mut(|devices| devices.clear());
    }

    fn devices_mut(&self, f: impl FnOnce(&mut Vec<TokenHandle>)) {
        let mut devices = match self.devices.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut devices);
    }
}

impl TokenProvider for FixedTokenProvider {
    fn name(&self) -> &str {
        "software"
    }

    fn list_devices(&self) -> Result<Vec<TokenHandle>> {
        let devices = self
            .devices
            .read()
            .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;
        Ok(devices.clone())
    }
}
