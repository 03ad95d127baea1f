//! # envcloak
//!
//! hardware-token backed encryption for secrets and `.env` files.
//!
//! ## key derivation
//!
//! ```text
//!        ┌──────────────┐
//!        │ fido2 token? │
//!        └──────┬───────┘
//!          yes  │   no
//!      ┌────────┴────────┐
//!      ▼                 ▼
//!  ┌────────┐     ┌─────────────┐
//!  │ id +   │     │ hostname,os │
//!  │ salt   │     │ user, seed  │
//!  └───┬────┘     └──────┬──────┘
//!      │ scrypt          │ sha256
//!      ▼                 ▼
//!  ┌──────────────────────────┐
//!  │  32 byte key (44 b64)    │
//!  └────────────┬─────────────┘
//!               │ chacha20poly1305
//!               ▼
//!        ┌─────────────┐
//!        │  .env.enc   │
//!        └─────────────┘
//! ```
//!
//! ## properties
//!
//! - wrong key or tampering fails with `Error::InvalidToken`, never garbage
//! - fresh nonce per encryption, identical plaintexts never match
//! - the fallback key is deterministic per machine and user, and flagged as
//!   not hardware-backed
//! - config lookups never error: failures end in `None` plus a log line
//!
//! ## usage
//!
//! ```rust,ignore
//! use envcloak::{ConfigResolver, KeySource, Settings, token};
//!
//! let resolver = ConfigResolver::new(
//!     token::default_provider(),
//!     KeySource::Keyfile("envcloak.key".into()),
//!     Settings::default(),
//! );
//! let url = resolver.resolve(".env.enc".as_ref(), "DATABASE_URL");
//! ```
//!
//! single-threaded and synchronous. kdf calls are deliberately slow and have
//! no cancellation; wrap them externally if a timeout is needed.

pub mod cipher;
pub mod config;
pub mod entropy;
pub mod envfile;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod key;
pub mod random;
pub mod resolver;
pub mod token;

pub use cipher::{EncryptedBlob, SymmetricCipher};
pub use config::Settings;
pub use entropy::{audit, shannon_entropy, EntropyReport};
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, SecretDigest, SecretHasher};
pub use kdf::{KeyDeriver, MachineFingerprint};
pub use key::{DerivedKey, KeyMaterial, KeyOrigin};
pub use random::{RandomSource, RandomnessProvider};
pub use resolver::{ConfigResolver, FileLookup, KeySource, Prompt, ResolvedFrom};
pub use token::{NoTokenProvider, TokenHandle, TokenProvider};
pub use token::software::FixedTokenProvider;

#[cfg(feature = "hidraw")]
pub use token::hidraw::HidrawTokenProvider;
