//! layered config lookup
//!
//! resolution order for a name:
//!
//! ```text
//! process env override
//!        │ unset
//!        ▼
//!   path ends in encrypted suffix? ──no──► read plaintext
//!        │ yes
//!        ▼
//!   token connected? ──no──► plaintext sibling ──► read plaintext
//!        │ yes
//!        ▼
//!   decrypt ──fail──► plaintext sibling ──► read plaintext
//!        │ ok
//!        ▼
//!   parse decrypted (absent here is final, no plaintext fallback)
//!        │ still unresolved
//!        ▼
//!   prompt hook (if any)
//! ```
//!
//! nothing here returns an error to the caller. every failure ends in
//! `None` plus a logged reason. files are only read, never written, and no
//! locking is done against other processes touching the same files.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::cipher::SymmetricCipher;
use crate::config::Settings;
use crate::envfile;
use crate::kdf::{KeyDeriver, SALT_LEN};
use crate::key::KeyMaterial;
use crate::token::TokenProvider;
use crate::{Error, Result};

/// where the decryption key comes from once a token is confirmed present
#[derive(Debug, Clone)]
pub enum KeySource {
    /// encoded key stored in a keyfile
    Keyfile(PathBuf),
    /// key already in memory
    Key(KeyMaterial),
    /// token id stretched with the salt retained at encryption time
    TokenSalt([u8; SALT_LEN]),
}

/// last-resort source, e.g. asking the user on a terminal
pub trait Prompt {
    fn ask(&self, name: &str) -> Option<String>;
}

/// which layer produced a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Environment,
    Decrypted(PathBuf),
    Plaintext(PathBuf),
    Prompt,
}

/// outcome of a file lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    Found { value: String, from: ResolvedFrom },
    /// source was read but does not hold the name
    Missing { source: PathBuf },
    /// no readable source
    Unavailable,
}

impl FileLookup {
    pub fn value(self) -> Option<String> {
        match self {
            FileLookup::Found { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// resolves named values from env overrides and env files
pub struct ConfigResolver<P: TokenProvider> {
    deriver: KeyDeriver<P>,
    key_source: KeySource,
    settings: Settings,
    env_override: bool,
    prompt: Option<Box<dyn Prompt>>,
}

impl<P: TokenProvider> ConfigResolver<P> {
    pub fn new(provider: P, key_source: KeySource, settings: Settings) -> Self {
        Self {
            deriver: KeyDeriver::new(provider, &settings),
            key_source,
            settings,
            env_override: true,
            prompt: None,
        }
    }

    /// consult process environment variables first (default on)
    pub fn with_env_override(mut self, enabled: bool) -> Self {
        self.env_override = enabled;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn Prompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// resolve through every layer
    pub fn resolve(&self, path: &Path, name: &str) -> Option<String> {
        self.resolve_detailed(path, name).map(|(value, _)| value)
    }

    /// resolve through every layer, reporting which one answered
    pub fn resolve_detailed(&self, path: &Path, name: &str) -> Option<(String, ResolvedFrom)> {
        if self.env_override {
            if let Ok(value) = std::env::var(name) {
                debug!("{} taken from environment", name);
                return Some((value, ResolvedFrom::Environment));
            }
        }

        if let FileLookup::Found { value, from } = self.lookup_in_file(path, name) {
            return Some((value, from));
        }

        let prompt = self.prompt.as_ref()?;
        match prompt.ask(name) {
            Some(value) => Some((value, ResolvedFrom::Prompt)),
            None => {
                warn!("no value entered for {}", name);
                None
            }
        }
    }

    /// the file layer alone: encrypted source, plaintext sibling, plaintext
    pub fn lookup_in_file(&self, path: &Path, name: &str) -> FileLookup {
        if !self.is_encrypted(path) {
            return self.read_plaintext(path, name);
        }

        match self.deriver.provider().first_device() {
            Ok(Some(device)) => debug!("token {} present, decrypting {}", device, path.display()),
            Ok(None) => {
                warn!("no hardware token, skipping decryption of {}", path.display());
                return self.fallback_plaintext(path, name);
            }
            Err(e) => {
                warn!("token enumeration failed ({}), skipping decryption", e);
                return self.fallback_plaintext(path, name);
            }
        }

        let content = match self.decrypt(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("could not decrypt {}: {}", path.display(), e);
                return self.fallback_plaintext(path, name);
            }
        };

        match envfile::lookup(&content, name) {
            Some(value) => {
                debug!("{} = {}", name, self.settings.display_secret(&value));
                FileLookup::Found {
                    value,
                    from: ResolvedFrom::Decrypted(path.to_path_buf()),
                }
            }
            None => {
                info!("{} not found in {}", name, path.display());
                FileLookup::Missing {
                    source: path.to_path_buf(),
                }
            }
        }
    }

    /// does the suffix mark this path as ciphertext
    pub fn is_encrypted(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.settings.encrypted_extension.as_str())
            .unwrap_or(false)
    }

    /// plaintext counterpart of an encrypted path
    ///
    /// `prod.env.enc` -> `prod.env`, `.env.enc` -> `.env`,
    /// `secrets.enc` -> `secrets.env`
    pub fn plaintext_sibling(&self, path: &Path) -> PathBuf {
        let plain = &self.settings.plaintext_extension;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem == format!(".{}", plain) || stem.ends_with(&format!(".{}", plain)) {
            return path.with_file_name(stem);
        }
        path.with_extension(plain)
    }

    fn fallback_plaintext(&self, path: &Path, name: &str) -> FileLookup {
        let sibling = self.plaintext_sibling(path);
        info!("falling back to plaintext {}", sibling.display());
        self.read_plaintext(&sibling, name)
    }

    fn read_plaintext(&self, path: &Path, name: &str) -> FileLookup {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!("cannot read {}: {}", path.display(), e);
                return FileLookup::Unavailable;
            }
        };

        match envfile::lookup(&content, name) {
            Some(value) => {
                debug!("{} = {}", name, self.settings.display_secret(&value));
                FileLookup::Found {
                    value,
                    from: ResolvedFrom::Plaintext(path.to_path_buf()),
                }
            }
            None => {
                info!("{} not found in {}", name, path.display());
                FileLookup::Missing {
                    source: path.to_path_buf(),
                }
            }
        }
    }

    fn decrypt(&self, path: &Path) -> Result<String> {
        let key = match &self.key_source {
            KeySource::Keyfile(keyfile) => KeyMaterial::read_keyfile(keyfile)?,
            KeySource::Key(key) => key.clone(),
            KeySource::TokenSalt(salt) => self.deriver.derive_with_salt(salt)?.key,
        };
        let plaintext = SymmetricCipher::new(&key).decrypt_file(path)?;
        // decrypted bytes stay in memory only
        String::from_utf8(plaintext).map_err(|e| {
            warn!("{} decrypts to non utf-8 content: {}", path.display(), e.utf8_error());
            Error::InvalidToken("decrypted content is not utf-8")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::NoTokenProvider;

    fn resolver() -> ConfigResolver<NoTokenProvider> {
        ConfigResolver::new(
            NoTokenProvider,
            KeySource::Key(KeyMaterial::generate()),
            Settings::default().fast_kdf(),
        )
        .with_env_override(false)
    }

    #[test]
    fn test_is_encrypted_by_suffix() {
        let r = resolver();
        assert!(r.is_encrypted(Path::new("prod.env.enc")));
        assert!(r.is_encrypted(Path::new("/etc/app/.env.enc")));
        assert!(!r.is_encrypted(Path::new(".env")));
        assert!(!r.is_encrypted(Path::new("secrets.encrypted")));
    }

    #[test]
    fn test_plaintext_sibling() {
        let r = resolver();
        assert_eq!(r.plaintext_sibling(Path::new("prod.env.enc")), Path::new("prod.env"));
        assert_eq!(r.plaintext_sibling(Path::new("/a/.env.enc")), Path::new("/a/.env"));
        assert_eq!(r.plaintext_sibling(Path::new("secrets.enc")), Path::new("secrets.env"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver();
        let lookup = r.lookup_in_file(&dir.path().join("nope.env"), "KEY");
        assert_eq!(lookup, FileLookup::Unavailable);
        assert_eq!(r.resolve(&dir.path().join("nope.env.enc"), "KEY"), None);
    }

    struct Answer(&'static str);

    impl Prompt for Answer {
        fn ask(&self, _name: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn test_prompt_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "PRESENT=file\n").unwrap();

        let r = resolver().with_prompt(Box::new(Answer("typed")));
        assert_eq!(
            r.resolve_detailed(&path, "PRESENT"),
            Some(("file".into(), ResolvedFrom::Plaintext(path.clone())))
        );
        assert_eq!(
            r.resolve_detailed(&path, "ABSENT"),
            Some(("typed".into(), ResolvedFrom::Prompt))
        );
    }

    #[test]
    fn test_env_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ENVCLOAK_TEST_OVERRIDE_7F3A=file\n").unwrap();
        std::env::set_var("ENVCLOAK_TEST_OVERRIDE_7F3A", "from-env");

        let r = resolver().with_env_override(true);
        assert_eq!(
            r.resolve_detailed(&path, "ENVCLOAK_TEST_OVERRIDE_7F3A"),
            Some(("from-env".into(), ResolvedFrom::Environment))
        );
        assert_eq!(
            resolver().resolve(&path, "ENVCLOAK_TEST_OVERRIDE_7F3A").as_deref(),
            Some("file")
        );
        std::env::remove_var("ENVCLOAK_TEST_OVERRIDE_7F3A");
    }
}
