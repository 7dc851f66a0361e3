//! AES-256-GCM document encryption.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use tracing::debug;

use super::DerivedKey;
use crate::error::CryptoError;

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Authenticated cipher for uploaded documents.
///
/// Blob format: `<12-byte nonce><ciphertext><16-byte tag>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentCipher;

impl DocumentCipher {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt a document with the owner's key.
    pub fn encrypt(&self, plaintext: &[u8], key: &DerivedKey) -> Result<Vec<u8>, CryptoError> {
        let cipher = Self::cipher(key)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend(ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`DocumentCipher::encrypt`].
    ///
    /// Truncated input, tampered bytes and a wrong key all fail with
    /// [`CryptoError::Decryption`].
    pub fn decrypt(&self, blob: &[u8], key: &DerivedKey) -> Result<Vec<u8>, CryptoError> {
        let cipher = Self::cipher(key)?;

        if blob.len() < NONCE_SIZE {
            debug!("ciphertext shorter than nonce ({} bytes)", blob.len());
            return Err(CryptoError::Decryption);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }

    fn cipher(key: &DerivedKey) -> Result<Aes256Gcm, CryptoError> {
        let raw = key.to_bytes()?;
        Aes256Gcm::new_from_slice(&raw)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to create cipher: {e}")))
    }
}
