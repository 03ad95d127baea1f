//! error types for envcloak

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// caller asked for an algorithm, source or parameter that does not exist
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no hardware token connected")]
    DeviceUnavailable,

    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("device descriptor has no numeric identifier: {0}")]
    DeviceIdentifier(String),

    /// wrong key, tampered ciphertext, malformed or expired token
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("kdf failed: {0}")]
    KdfFailed(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("hash failed: {0}")]
    HashFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// wrap an io error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// true for the errors that trigger a fallback instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable | Error::InvalidToken(_) | Error::NotFound(_) | Error::Io { .. }
        )
    }
}
