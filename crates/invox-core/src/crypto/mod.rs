//! Per-owner document keys and the authenticated document cipher.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 from the owner's username and a
//! stored per-owner salt, then URL-safe base64 encoded. Owners without a
//! salt (created before salts were introduced) derive with an empty salt,
//! which reproduces their original key so existing uploads stay readable.

mod cipher;

pub use cipher::DocumentCipher;

use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use sha2::Sha256;
use tracing::trace;

use crate::error::CryptoError;
use crate::models::Owner;

/// Iteration count used by the original key scheme.
pub const LEGACY_ITERATIONS: u32 = 390_000;

/// Raw key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A derived symmetric key, URL-safe base64 encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey(String);

impl DerivedKey {
    /// Wrap an already encoded key, checking that it decodes to 32 bytes.
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self, CryptoError> {
        let key = Self(encoded.into());
        key.to_bytes()?;
        Ok(key)
    }

    fn from_raw(raw: &[u8; KEY_LEN]) -> Self {
        Self(URL_SAFE.encode(raw))
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Decode to raw key bytes.
    pub fn to_bytes(&self) -> Result<[u8; KEY_LEN], CryptoError> {
        let bytes = URL_SAFE
            .decode(self.0.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("bad base64: {e}")))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!("key must be {KEY_LEN} bytes, got {}", b.len()))
        })
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Source of document keys for owners.
pub trait KeyProvider: Send + Sync {
    /// The key that encrypts and decrypts this owner's documents.
    fn key_for(&self, owner: &Owner) -> Result<DerivedKey, CryptoError>;
}

/// PBKDF2-HMAC-SHA256 key derivation from the username and stored salt.
#[derive(Debug, Clone)]
pub struct Pbkdf2KeyDeriver {
    iterations: u32,
}

impl Pbkdf2KeyDeriver {
    /// Create a deriver with the legacy iteration count.
    pub fn new() -> Self {
        Self {
            iterations: LEGACY_ITERATIONS,
        }
    }

    /// Set the iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Derive the key for a username and salt. Deterministic.
    pub fn derive(&self, username: &str, salt: &[u8]) -> DerivedKey {
        let mut raw = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(username.as_bytes(), salt, self.iterations, &mut raw);
        trace!(iterations = self.iterations, salted = !salt.is_empty(), "derived document key");
        DerivedKey::from_raw(&raw)
    }
}

impl Default for Pbkdf2KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for Pbkdf2KeyDeriver {
    fn key_for(&self, owner: &Owner) -> Result<DerivedKey, CryptoError> {
        Ok(self.derive(&owner.username, &owner.key_salt))
    }
}

/// Generate a random salt for a new owner.
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;
    use chrono::Utc;

    fn fast() -> Pbkdf2KeyDeriver {
        Pbkdf2KeyDeriver::new().with_iterations(1_000)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let deriver = fast();
        assert_eq!(deriver.derive("alice", b""), deriver.derive("alice", b""));
        assert_ne!(deriver.derive("alice", b""), deriver.derive("bob", b""));
    }

    #[test]
    fn test_salt_changes_key() {
        let deriver = fast();
        assert_ne!(deriver.derive("alice", b""), deriver.derive("alice", b"pepper"));
    }

    #[test]
    fn test_key_is_urlsafe_base64_of_32_bytes() {
        let key = fast().derive("alice", b"");
        assert_eq!(key.as_base64().len(), 44);
        assert!(key.as_base64().ends_with('='));
        assert!(!key.as_base64().contains('+') && !key.as_base64().contains('/'));
        assert_eq!(key.to_bytes().unwrap().len(), KEY_LEN);
    }

    #[test]
    fn test_matches_reference_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", 1, 64), first 32 bytes.
        let key = Pbkdf2KeyDeriver::new().with_iterations(1).derive("passwd", b"salt");
        let expected: [u8; 32] = [
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc,
        ];
        assert_eq!(key.to_bytes().unwrap(), expected);
    }

    #[test]
    fn test_key_provider_uses_owner_salt() {
        let deriver = fast();
        let owner = Owner {
            id: OwnerId::new(),
            username: "alice".to_string(),
            key_salt: b"salt".to_vec(),
            created_at: Utc::now(),
        };
        assert_eq!(deriver.key_for(&owner).unwrap(), deriver.derive("alice", b"salt"));
    }

    #[test]
    fn test_from_base64_rejects_short_keys() {
        assert!(DerivedKey::from_base64("c2hvcnQ=").is_err());
        assert!(DerivedKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let key = fast().derive("alice", b"");
        assert_eq!(format!("{key:?}"), "DerivedKey(<redacted>)");
    }

    #[test]
    fn test_generate_salt() {
        let a = generate_salt(16);
        let b = generate_salt(16);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
