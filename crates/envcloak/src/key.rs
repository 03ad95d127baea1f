//! key material
//!
//! 32 raw bytes, exchanged as 44 bytes of url-safe base64 (fernet key
//! format). keys only touch disk through an explicit keyfile.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use crate::random::random_array;
use crate::{Error, Result};

/// raw key length
pub const KEY_LEN: usize = 32;
/// url-safe base64 length of an encoded key
pub const ENCODED_KEY_LEN: usize = 44;

/// symmetric key for the cipher
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// fresh key from the os csprng
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// 44-byte url-safe base64
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// parse the 44-byte url-safe base64 form, surrounding whitespace ignored
    pub fn decode(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        if encoded.len() != ENCODED_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "expected {} base64 chars, got {}",
                ENCODED_KEY_LEN,
                encoded.len()
            )));
        }
        let raw = URL_SAFE
            .decode(encoded)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = raw
            .try_into()
            .map_err(|_| Error::InvalidKey("decoded key is not 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    /// write the encoded key to a keyfile, replacing any previous content
    pub fn write_keyfile(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode()).map_err(|e| Error::io(path, e))?;
        restrict_permissions(path)
    }

    pub fn read_keyfile(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::decode(&content)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// where a derived key came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrigin {
    /// token present, key is fresh randomness (not reproducible from the token)
    Hardware,
    /// token id stretched with scrypt, reproducible given the salt
    HardwareStretched { salt: [u8; 16] },
    /// machine fingerprint, no token involved
    Fallback,
}

/// key plus its provenance
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: KeyMaterial,
    pub origin: KeyOrigin,
}

impl DerivedKey {
    pub fn is_hardware_backed(&self) -> bool {
        !matches!(self.origin, KeyOrigin::Fallback)
    }

    /// can the same key be derived again later
    pub fn is_reproducible(&self) -> bool {
        !matches!(self.origin, KeyOrigin::Hardware)
    }

    pub fn salt(&self) -> Option<&[u8; 16]> {
        match &self.origin {
            KeyOrigin::HardwareStretched { salt } => Some(salt),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
