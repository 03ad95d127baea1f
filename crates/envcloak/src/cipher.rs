//! authenticated symmetric encryption
//!
//! token layout (url-safe base64 of):
//!
//! ```text
//! version (1) | timestamp be (8) | nonce (12) | chacha20poly1305 ciphertext + tag
//! ```
//!
//! version and timestamp are bound as associated data, so a wrong key,
//! a flipped bit anywhere or a truncated token all fail with
//! `Error::InvalidToken`. encryption is whole-buffer only.

use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use tracing::debug;

use crate::key::KeyMaterial;
use crate::random::random_array;
use crate::{Error, Result};

/// format version byte
pub const TOKEN_VERSION: u8 = 0x81;

const HEADER_LEN: usize = 1 + 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// tolerated clock skew for tokens stamped in the future
const MAX_CLOCK_SKEW: u64 = 60;

/// encoded ciphertext, safe to store as text
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// read a token from disk, non-utf8 content is a malformed token
    pub fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let token =
            String::from_utf8(content).map_err(|_| Error::InvalidToken("not url-safe base64"))?;
        Ok(Self::from_token(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// seconds since the unix epoch at encryption time
    pub fn timestamp(&self) -> Result<u64> {
        let raw = self.raw()?;
        Ok(read_timestamp(&raw))
    }

    fn raw(&self) -> Result<Vec<u8>> {
        let raw = URL_SAFE
            .decode(self.0.as_bytes())
            .map_err(|_| Error::InvalidToken("not url-safe base64"))?;
        if raw.len() < MIN_TOKEN_LEN {
            return Err(Error::InvalidToken("token too short"));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(Error::InvalidToken("unknown version"));
        }
        Ok(raw)
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} chars)", self.0.len())
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// encryptor bound to one key
pub struct SymmetricCipher {
    aead: ChaCha20Poly1305,
}

impl SymmetricCipher {
    pub fn new(key: &KeyMaterial) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// encrypt with a fresh nonce, never the same output twice
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        self.encrypt_at(plaintext, now())
    }

    fn encrypt_at(&self, plaintext: &[u8], timestamp: u64) -> Result<EncryptedBlob> {
        let nonce: [u8; NONCE_LEN] = random_array();

        let mut header = [0u8; HEADER_LEN];
        header[0] = TOKEN_VERSION;
        header[1..].copy_from_slice(&timestamp.to_be_bytes());

        let ciphertext = self
            .aead
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

        let mut token = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&header);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);

        Ok(EncryptedBlob(URL_SAFE.encode(token)))
    }

    /// decrypt and authenticate, any mismatch is `InvalidToken`
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>> {
        let raw = blob.raw()?;
        let (header, rest) = raw.split_at(HEADER_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        self.aead
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| Error::InvalidToken("authentication failed"))
    }

    /// decrypt, rejecting tokens older than `ttl`
    pub fn decrypt_with_ttl(&self, blob: &EncryptedBlob, ttl: Duration) -> Result<Vec<u8>> {
        let plaintext = self.decrypt(blob)?;
        let stamped = blob.timestamp()?;
        let current = now();
        if stamped > current + MAX_CLOCK_SKEW {
            return Err(Error::InvalidToken("timestamp in the future"));
        }
        if current.saturating_sub(stamped) > ttl.as_secs() {
            return Err(Error::InvalidToken("token expired"));
        }
        Ok(plaintext)
    }

    /// encrypt a whole file and overwrite it with the token
    pub fn encrypt_file(&self, path: &Path) -> Result<EncryptedBlob> {
        let plaintext = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let blob = self.encrypt(&plaintext)?;
        std::fs::write(path, blob.as_bytes()).map_err(|e| Error::io(path, e))?;
        debug!("encrypted {} ({} bytes) in place", path.display(), plaintext.len());
        Ok(blob)
    }

    /// encrypt `src` into `dst`, leaving `src` untouched
    pub fn encrypt_file_to(&self, src: &Path, dst: &Path) -> Result<EncryptedBlob> {
        let plaintext = std::fs::read(src).map_err(|e| Error::io(src, e))?;
        let blob = self.encrypt(&plaintext)?;
        std::fs::write(dst, blob.as_bytes()).map_err(|e| Error::io(dst, e))?;
        debug!("encrypted {} -> {}", src.display(), dst.display());
        Ok(blob)
    }

    /// decrypt a whole file without touching it
    pub fn decrypt_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.decrypt(&EncryptedBlob::read_file(path)?)
    }

    /// decrypt a whole file and overwrite it with the plaintext
    pub fn decrypt_file_in_place(&self, path: &Path) -> Result<Vec<u8>> {
        let plaintext = self.decrypt_file(path)?;
        std::fs::write(path, &plaintext).map_err(|e| Error::io(path, e))?;
        debug!("decrypted {} in place", path.display());
        Ok(plaintext)
    }
}

/// one-shot encrypt
pub fn encrypt(plaintext: &[u8], key: &KeyMaterial) -> Result<EncryptedBlob> {
    SymmetricCipher::new(key).encrypt(plaintext)
}

/// one-shot decrypt
pub fn decrypt(blob: &EncryptedBlob, key: &KeyMaterial) -> Result<Vec<u8>> {
    SymmetricCipher::new(key).decrypt(blob)
}

pub fn encrypt_file(path: &Path, key: &KeyMaterial) -> Result<EncryptedBlob> {
    SymmetricCipher::new(key).encrypt_file(path)
}

pub fn decrypt_file(path: &Path, key: &KeyMaterial) -> Result<Vec<u8>> {
    SymmetricCipher::new(key).decrypt_file(path)
}

fn read_timestamp(raw: &[u8]) -> u64 {
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&raw[1..HEADER_LEN]);
    u64::from_be_bytes(ts)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = KeyMaterial::generate();
        for plaintext in [&b""[..], b"x", b"hello world", &[0u8; 4096]] {
            let blob = encrypt(plaintext, &key).unwrap();
            assert_eq!(decrypt(&blob, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = KeyMaterial::generate();
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt(b"secret data", &KeyMaterial::generate()).unwrap();
        let result = decrypt(&blob, &KeyMaterial::generate());
        assert!(matches!(result, Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_tampering_detected() {
        let key = KeyMaterial::generate();
        let blob = encrypt(b"secret data", &key).unwrap();
        let mut raw = URL_SAFE.decode(blob.as_str()).unwrap();

        // flip one bit in every region: version, timestamp, nonce, body
        for index in [0, 3, HEADER_LEN + 1, raw.len() - 1] {
            raw[index] ^= 0x01;
            let tampered = EncryptedBlob::from_token(URL_SAFE.encode(&raw));
            assert!(matches!(decrypt(&tampered, &key), Err(Error::InvalidToken(_))));
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn test_garbage_tokens() {
        let key = KeyMaterial::generate();
        for token in ["", "not base64 !!", "AAAA"] {
            let blob = EncryptedBlob::from_token(token);
            assert!(matches!(decrypt(&blob, &key), Err(Error::InvalidToken(_))));
        }
    }

    #[test]
    fn test_ttl() {
        let key = KeyMaterial::generate();
        let cipher = SymmetricCipher::new(&key);

        let fresh = cipher.encrypt(b"data").unwrap();
        assert!(cipher.decrypt_with_ttl(&fresh, Duration::from_secs(60)).is_ok());

        let old = cipher.encrypt_at(b"data", now() - 3600).unwrap();
        assert_eq!(old.timestamp().unwrap(), now() - 3600);
        assert!(matches!(
            cipher.decrypt_with_ttl(&old, Duration::from_secs(60)),
            Err(Error::InvalidToken("token expired"))
        ));

        let future = cipher.encrypt_at(b"data", now() + 3600).unwrap();
        assert!(matches!(
            cipher.decrypt_with_ttl(&future, Duration::from_secs(60)),
            Err(Error::InvalidToken("timestamp in the future"))
        ));
    }

    #[test]
    fn test_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"line1\nline2\n").unwrap();
        let key = KeyMaterial::generate();

        encrypt_file(&path, &key).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert!(!on_disk.windows(5).any(|w| w == b"line1"));

        let cipher = SymmetricCipher::new(&key);
        assert_eq!(cipher.decrypt_file_in_place(&path).unwrap(), b"line1\nline2\n");
        assert_eq!(std::fs::read(&path).unwrap(), b"line1\nline2\n");
    }

    #[test]
    fn test_tampered_file_bytes_are_invalid_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.enc");
        std::fs::write(&path, b"API_KEY=abc\n").unwrap();
        let key = KeyMaterial::generate();
        encrypt_file(&path, &key).unwrap();

        let mut on_disk = std::fs::read(&path).unwrap();
        on_disk[5] = 0xff;
        std::fs::write(&path, &on_disk).unwrap();

        assert!(matches!(
            decrypt_file(&path, &key),
            Err(Error::InvalidToken("not url-safe base64"))
        ));
    }

    #[test]
    fn test_encrypt_file_to_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join(".env");
        let dst = dir.path().join(".env.enc");
        std::fs::write(&src, b"A=1\n").unwrap();
        let key = KeyMaterial::generate();

        SymmetricCipher::new(&key).encrypt_file_to(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&src).unwrap(), b"A=1\n");
        assert_eq!(decrypt_file(&dst, &key).unwrap(), b"A=1\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = encrypt_file(&dir.path().join("missing"), &KeyMaterial::generate());
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
