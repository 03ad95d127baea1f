//! one-way secret digests
//!
//! `MemoryHard` (argon2id, salted, phc string) is the default and the only
//! algorithm meant for storing secrets. the fast digests are unsalted hex;
//! `LegacyMd5` exists for non-security fingerprinting such as dedup checks.

use std::fmt;
use std::str::FromStr;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::config::{Argon2Settings, Settings};
use crate::{Error, Result};

/// digest algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// argon2id with embedded random salt and cost parameters
    #[default]
    MemoryHard,
    FastSha256,
    FastSha512,
    /// fingerprinting only, never for secret storage
    LegacyMd5,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::MemoryHard,
        HashAlgorithm::FastSha256,
        HashAlgorithm::FastSha512,
        HashAlgorithm::LegacyMd5,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::MemoryHard => "memory_hard",
            HashAlgorithm::FastSha256 => "fast_sha256",
            HashAlgorithm::FastSha512 => "fast_sha512",
            HashAlgorithm::LegacyMd5 => "legacy_md5",
        }
    }

    /// whether digests from this algorithm may be used to store secrets
    pub fn suitable_for_secrets(&self) -> bool {
        matches!(self, HashAlgorithm::MemoryHard)
    }

    /// hex length of fast digests
    fn hex_len(&self) -> Option<usize> {
        match self {
            HashAlgorithm::MemoryHard => None,
            HashAlgorithm::FastSha256 => Some(64),
            HashAlgorithm::FastSha512 => Some(128),
            HashAlgorithm::LegacyMd5 => Some(32),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "memory_hard" | "argon2" | "argon2id" => Ok(HashAlgorithm::MemoryHard),
            "fast_sha256" | "sha256" => Ok(HashAlgorithm::FastSha256),
            "fast_sha512" | "sha512" => Ok(HashAlgorithm::FastSha512),
            "legacy_md5" | "md5" => Ok(HashAlgorithm::LegacyMd5),
            _ => Err(Error::Configuration(format!("unknown hash algorithm: {}", s))),
        }
    }
}

/// digest plus the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDigest {
    pub algorithm: HashAlgorithm,
    /// phc string for memory-hard digests, lowercase hex otherwise
    pub encoded: String,
}

impl SecretDigest {
    /// recognise a stored digest: phc strings are memory-hard, hex is
    /// classified by length
    pub fn parse(stored: &str) -> Result<Self> {
        let stored = stored.trim();
        if stored.starts_with("$argon2") {
            PasswordHash::new(stored).map_err(|e| Error::HashFailed(e.to_string()))?;
            return Ok(Self {
                algorithm: HashAlgorithm::MemoryHard,
                encoded: stored.to_string(),
            });
        }
        if !stored.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::HashFailed("digest is neither phc nor hex".into()));
        }
        let algorithm = HashAlgorithm::ALL
            .into_iter()
            .find(|a| a.hex_len() == Some(stored.len()))
            .ok_or_else(|| Error::HashFailed(format!("no digest has {} hex chars", stored.len())))?;
        Ok(Self {
            algorithm,
            encoded: stored.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// hashes and verifies secrets
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl SecretHasher {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            argon2: argon2_with(&settings.argon2)?,
        })
    }

    pub fn hash(&self, cleartext: &str, algorithm: HashAlgorithm) -> Result<SecretDigest> {
        let encoded = match algorithm {
            HashAlgorithm::MemoryHard => {
                let salt = SaltString::generate(&mut OsRng);
                self.argon2
                    .hash_password(cleartext.as_bytes(), &salt)
                    .map_err(|e| Error::HashFailed(e.to_string()))?
                    .to_string()
            }
            HashAlgorithm::FastSha256 => hex::encode(Sha256::digest(cleartext.as_bytes())),
            HashAlgorithm::FastSha512 => hex::encode(Sha512::digest(cleartext.as_bytes())),
            HashAlgorithm::LegacyMd5 => hex::encode(Md5::digest(cleartext.as_bytes())),
        };
        Ok(SecretDigest { algorithm, encoded })
    }

    /// hash by algorithm name, unknown names are a configuration error
    pub fn hash_named(&self, cleartext: &str, algorithm: &str) -> Result<SecretDigest> {
        self.hash(cleartext, algorithm.parse()?)
    }

    /// check a cleartext against a digest with the algorithm's own comparison
    pub fn verify(&self, digest: &SecretDigest, cleartext: &str) -> bool {
        match digest.algorithm {
            HashAlgorithm::MemoryHard => match PasswordHash::new(&digest.encoded) {
                // cost parameters come from the phc string, not from settings
                Ok(parsed) => Argon2::default()
                    .verify_password(cleartext.as_bytes(), &parsed)
                    .is_ok(),
                Err(_) => false,
            },
            fast => match self.hash(cleartext, fast) {
                Ok(fresh) => fresh
                    .encoded
                    .as_bytes()
                    .ct_eq(digest.encoded.to_ascii_lowercase().as_bytes())
                    .into(),
                Err(_) => false,
            },
        }
    }
}

fn argon2_with(settings: &Argon2Settings) -> Result<Argon2<'static>> {
    let params = Params::new(settings.m_cost, settings.t_cost, settings.p_cost, None)
        .map_err(|e| Error::Configuration(format!("argon2 params: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}
