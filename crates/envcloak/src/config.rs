//! runtime settings
//!
//! every component takes a `Settings` at construction instead of reading
//! process-wide flags. settings can be loaded from a json file and then
//! adjusted with the builder methods.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// default suffix of encrypted env files
pub const DEFAULT_ENCRYPTED_EXTENSION: &str = "enc";
/// default suffix of plaintext env files
pub const DEFAULT_PLAINTEXT_EXTENSION: &str = "env";

/// seed mixed into the machine fingerprint when no token is present
const DEFAULT_FALLBACK_SEED: &str = "envcloak:fallback:v1";

/// scrypt cost parameters for token id stretching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptSettings {
    /// log2 of the cpu/memory cost
    pub log_n: u8,
    /// block size
    pub r: u32,
    /// parallelism
    pub p: u32,
}

impl Default for ScryptSettings {
    fn default() -> Self {
        // n = 2^14, r = 8, p = 1
        Self { log_n: 14, r: 8, p: 1 }
    }
}

/// argon2id cost parameters for memory-hard digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Settings {
    /// memory in KiB
    pub m_cost: u32,
    /// iterations
    pub t_cost: u32,
    /// lanes
    pub p_cost: u32,
}

impl Default for Argon2Settings {
    fn default() -> Self {
        // argon2 crate defaults: 19 MiB, 2 passes, 1 lane
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// settings shared by all components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// print secret values instead of masking them
    pub show_secrets: bool,
    /// emit debug diagnostics
    pub show_debug: bool,
    /// suffix that marks a file as ciphertext
    pub encrypted_extension: String,
    /// suffix of the plaintext sibling file
    pub plaintext_extension: String,
    pub scrypt: ScryptSettings,
    pub argon2: Argon2Settings,
    /// fixed seed mixed into the fallback key
    pub fallback_seed: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_secrets: false,
            show_debug: false,
            encrypted_extension: DEFAULT_ENCRYPTED_EXTENSION.into(),
            plaintext_extension: DEFAULT_PLAINTEXT_EXTENSION.into(),
            scrypt: ScryptSettings::default(),
            argon2: Argon2Settings::default(),
            fallback_seed: DEFAULT_FALLBACK_SEED.into(),
        }
    }
}

impl Settings {
    /// load settings from a json file, missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let settings: Settings = serde_json::from_slice(&data)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// reject settings no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.encrypted_extension.is_empty() || self.plaintext_extension.is_empty() {
            return Err(Error::Configuration("file extensions must not be empty".into()));
        }
        if self.encrypted_extension == self.plaintext_extension {
            return Err(Error::Configuration(
                "encrypted and plaintext extensions must differ".into(),
            ));
        }
        scrypt::Params::new(self.scrypt.log_n, self.scrypt.r, self.scrypt.p, 32)
            .map_err(|e| Error::Configuration(format!("scrypt params: {}", e)))?;
        argon2::Params::new(
            self.argon2.m_cost,
            self.argon2.t_cost,
            self.argon2.p_cost,
            None,
        )
        .map_err(|e| Error::Configuration(format!("argon2 params: {}", e)))?;
        Ok(())
    }

    pub fn with_show_secrets(mut self, show: bool) -> Self {
        self.show_secrets = show;
        self
    }

    pub fn with_show_debug(mut self, show: bool) -> Self {
        self.show_debug = show;
        self
    }

    pub fn with_extensions(mut self, encrypted: &str, plaintext: &str) -> Self {
        self.encrypted_extension = encrypted.trim_start_matches('.').into();
        self.plaintext_extension = plaintext.trim_start_matches('.').into();
        self
    }

    pub fn with_scrypt(mut self, scrypt: ScryptSettings) -> Self {
        self.scrypt = scrypt;
        self
    }

    pub fn with_argon2(mut self, argon2: Argon2Settings) -> Self {
        self.argon2 = argon2;
        self
    }

    /// cheap kdf costs for tests and interactive demos
    pub fn fast_kdf(self) -> Self {
        self.with_scrypt(ScryptSettings { log_n: 4, r: 8, p: 1 })
            .with_argon2(Argon2Settings {
                m_cost: 64,
                t_cost: 1,
                p_cost: 1,
            })
    }

    /// render a secret for display, masked unless `show_secrets` is set
    pub fn display_secret(&self, secret: &str) -> String {
        if self.show_secrets {
            return secret.to_string();
        }
        mask(secret)
    }
}

/// keep the first and last two chars of longer secrets, hide the rest
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(3));
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}
