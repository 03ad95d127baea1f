//! key derivation
//!
//! - token present, no stretch: fresh random key, token is a presence check
//! - token present, stretch: scrypt over the token id with a random salt
//! - no token: sha256 over a machine fingerprint (weaker, flagged as such)

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::{ScryptSettings, Settings};
use crate::key::{DerivedKey, KeyMaterial, KeyOrigin, KEY_LEN};
use crate::random::random_array;
use crate::token::TokenProvider;
use crate::{Error, Result};

/// scrypt salt length
pub const SALT_LEN: usize = 16;

/// derives cipher keys from a token provider
pub struct KeyDeriver<P: TokenProvider> {
    provider: P,
    scrypt: ScryptSettings,
    fallback_seed: String,
}

impl<P: TokenProvider> KeyDeriver<P> {
    pub fn new(provider: P, settings: &Settings) -> Self {
        Self {
            provider,
            scrypt: settings.scrypt,
            fallback_seed: settings.fallback_seed.clone(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// derive a key from the first connected token, or the fallback key
    pub fn derive_from_token(&self, use_password_stretch: bool) -> Result<DerivedKey> {
        let device = match self.provider.first_device()? {
            Some(device) => device,
            None => {
                warn!(
                    "no hardware token found via {}, using fallback key (not hardware-backed)",
                    self.provider.name()
                );
                return Ok(DerivedKey {
                    key: self.fallback_key(),
                    origin: KeyOrigin::Fallback,
                });
            }
        };

        let device_number = device.device_number()?;
        info!("using hardware token {}", device);

        if !use_password_stretch {
            debug!("token {} used as presence check only", device_number);
            return Ok(DerivedKey {
                key: KeyMaterial::generate(),
                origin: KeyOrigin::Hardware,
            });
        }

        let salt: [u8; SALT_LEN] = random_array();
        let key = stretch(device_number, &salt, &self.scrypt)?;
        Ok(DerivedKey {
            key,
            origin: KeyOrigin::HardwareStretched { salt },
        })
    }

    /// regenerate a stretched key from a retained salt
    pub fn derive_with_salt(&self, salt: &[u8; SALT_LEN]) -> Result<DerivedKey> {
        let device = self.provider.first_device()?.ok_or(Error::DeviceUnavailable)?;
        let key = stretch(device.device_number()?, salt, &self.scrypt)?;
        Ok(DerivedKey {
            key,
            origin: KeyOrigin::HardwareStretched { salt: *salt },
        })
    }

    /// like `derive_from_token` but logs the failure and returns `None`
    pub fn derive_or_none(&self, use_password_stretch: bool) -> Option<DerivedKey> {
        match self.derive_from_token(use_password_stretch) {
            Ok(key) => Some(key),
            Err(e) => {
                error!("key derivation failed: {}", e);
                None
            }
        }
    }

    /// deterministic key from stable machine identifiers
    pub fn fallback_key(&self) -> KeyMaterial {
        fallback_key(&MachineFingerprint::current(), &self.fallback_seed)
    }
}

/// stable identifiers of the local machine and user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineFingerprint {
    pub hostname: String,
    pub os: String,
    pub username: String,
}

impl MachineFingerprint {
    pub fn current() -> Self {
        Self {
            hostname: hostname(),
            os: std::env::consts::OS.to_string(),
            username: username(),
        }
    }
}

/// sha256 over the fingerprint fields and the seed
pub fn fallback_key(fingerprint: &MachineFingerprint, seed: &str) -> KeyMaterial {
    let mut hasher = Sha256::new();
    for part in [
        fingerprint.hostname.as_str(),
        fingerprint.os.as_str(),
        fingerprint.username.as_str(),
        seed,
    ] {
        // length prefix keeps ("ab", "c") and ("a", "bc") apart
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    KeyMaterial::from_bytes(hasher.finalize().into())
}

/// stretch a low-entropy token id into key material with scrypt
pub fn stretch(device_number: u64, salt: &[u8], params: &ScryptSettings) -> Result<KeyMaterial> {
    let params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_LEN)
        .map_err(|e| Error::KdfFailed(e.to_string()))?;

    let password = device_number.to_string();
    let mut output = [0u8; KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut output)
        .map_err(|e| Error::KdfFailed(e.to_string()))?;

    Ok(KeyMaterial::from_bytes(output))
}

fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().trim().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

fn username() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::software::FixedTokenProvider;
    use crate::token::NoTokenProvider;

    fn settings() -> Settings {
        Settings::default().fast_kdf()
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let deriver = KeyDeriver::new(NoTokenProvider, &settings());
        let a = deriver.derive_from_token(true).unwrap();
        let b = deriver.derive_from_token(false).unwrap();

        assert_eq!(a.origin, KeyOrigin::Fallback);
        assert!(!a.is_hardware_backed());
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_fallback_depends_on_fingerprint() {
        let fp = MachineFingerprint {
            hostname: "box".into(),
            os: "linux".into(),
            username: "alice".into(),
        };
        let other = MachineFingerprint {
            username: "bob".into(),
            ..fp.clone()
        };
        assert_eq!(fallback_key(&fp, "seed"), fallback_key(&fp, "seed"));
        assert_ne!(fallback_key(&fp, "seed"), fallback_key(&other, "seed"));
        assert_ne!(fallback_key(&fp, "seed"), fallback_key(&fp, "other seed"));
    }

    #[test]
    fn test_hostname_ignores_environment() {
        let saved = std::env::var_os("HOSTNAME");
        let before = MachineFingerprint::current();
        std::env::set_var("HOSTNAME", "spoofed-host");
        let after = MachineFingerprint::current();
        match saved {
            Some(value) => std::env::set_var("HOSTNAME", value),
            None => std::env::remove_var("HOSTNAME"),
        }

        assert_eq!(before.hostname, after.hostname);
        assert_ne!(after.hostname, "spoofed-host");
    }

    #[test]
    fn test_token_without_stretch_is_random() {
        let deriver = KeyDeriver::new(FixedTokenProvider::with_device("/dev/hidraw3"), &settings());
        let a = deriver.derive_from_token(false).unwrap();
        let b = deriver.derive_from_token(false).unwrap();

        assert_eq!(a.origin, KeyOrigin::Hardware);
        assert!(!a.is_reproducible());
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_stretch_reproducible_with_salt() {
        let deriver = KeyDeriver::new(FixedTokenProvider::with_device("/dev/hidraw3"), &settings());
        let first = deriver.derive_from_token(true).unwrap();
        let salt = *first.salt().unwrap();

        let again = deriver.derive_with_salt(&salt).unwrap();
        assert_eq!(first.key, again.key);

        // fresh salt each call
        let other = deriver.derive_from_token(true).unwrap();
        assert_ne!(first.salt(), other.salt());
        assert_ne!(first.key, other.key);
    }

    #[test]
    fn test_stretch_depends_on_device() {
        let salt = [9u8; SALT_LEN];
        let params = settings().scrypt;
        assert_ne!(
            stretch(3, &salt, &params).unwrap(),
            stretch(4, &salt, &params).unwrap()
        );
    }

    #[test]
    fn test_descriptor_without_number_is_fatal() {
        let deriver = KeyDeriver::new(FixedTokenProvider::with_device("mystery key"), &settings());
        assert!(matches!(
            deriver.derive_from_token(true),
            Err(Error::DeviceIdentifier(_))
        ));
        assert!(deriver.derive_or_none(true).is_none());
    }

    #[test]
    fn test_derive_with_salt_needs_token() {
        let deriver = KeyDeriver::new(NoTokenProvider, &settings());
        assert!(matches!(
            deriver.derive_with_salt(&[0u8; SALT_LEN]),
            Err(Error::DeviceUnavailable)
        ));
    }

    #[test]
    fn test_bad_scrypt_params() {
        let params = ScryptSettings { log_n: 14, r: 0, p: 1 };
        assert!(matches!(stretch(1, &[0u8; SALT_LEN], &params), Err(Error::KdfFailed(_))));
    }
}
