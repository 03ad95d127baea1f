//! hardware token providers
//!
//! a token provider enumerates connected fido2/ctap devices. the core only
//! ever reads a descriptor string from the first device found; no ctap
//! commands are sent.
//!
//! implementations:
//! - hidraw: linux sysfs scan for fido hid nodes
//! - none: never finds a device, forces fallback mode
//! - software: fixed in-memory descriptors for tests and dev

#[cfg(feature = "hidraw")]
pub mod hidraw;
pub mod software;

use std::fmt;

use crate::{Error, Result};

/// reference to a connected token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHandle {
    descriptor: String,
}

impl TokenHandle {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// numeric identifier: the first run of decimal digits in the descriptor
    pub fn device_number(&self) -> Result<u64> {
        first_number(&self.descriptor)
            .ok_or_else(|| Error::DeviceIdentifier(self.descriptor.clone()))
    }
}

impl fmt::Display for TokenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

/// token provider trait - pluggable source of hardware tokens
pub trait TokenProvider: Send + Sync {
    /// short name used in diagnostics
    fn name(&self) -> &str;

    /// enumerate currently connected tokens, may block while polling
    fn list_devices(&self) -> Result<Vec<TokenHandle>>;

    /// first connected token, `None` when nothing is plugged in
    fn first_device(&self) -> Result<Option<TokenHandle>> {
        Ok(self.list_devices()?.into_iter().next())
    }
}

impl<T: TokenProvider + ?Sized> TokenProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_devices(&self) -> Result<Vec<TokenHandle>> {
        (**self).list_devices()
    }
}

/// provider that never finds a token
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTokenProvider;

impl TokenProvider for NoTokenProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn list_devices(&self) -> Result<Vec<TokenHandle>> {
        Ok(Vec::new())
    }
}

/// default provider for this build
pub fn default_provider() -> Box<dyn TokenProvider> {
    #[cfg(feature = "hidraw")]
    {
        Box::new(hidraw::HidrawTokenProvider::new())
    }
    #[cfg(not(feature = "hidraw"))]
    {
        Box::new(NoTokenProvider)
    }
}

fn first_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
