//! ChaCha20-Poly1305 secrets provider
//!
//! Blob layout: base64(nonce || ciphertext). The nonce is 96 bits of fresh
//! randomness per encryption, so encrypting the same payload twice yields
//! different blobs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use switchboard_interfaces::{SecretsError, SecretsProvider};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AEAD-backed [`SecretsProvider`] keyed from a base64-encoded 32-byte key
pub struct ChaChaSecretsProvider {
    cipher: ChaCha20Poly1305,
}

impl ChaChaSecretsProvider {
    /// Build a provider from a base64 key string
    pub fn from_base64_key(encoded: &str) -> Result<Self, SecretsError> {
        let key_bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SecretsError::InvalidKey {
                reason: format!("key is not valid base64: {}", e),
            })?;

        if key_bytes.len() != KEY_LEN {
            return Err(SecretsError::InvalidKey {
                reason: format!("key must decode to {} bytes, got {}", KEY_LEN, key_bytes.len()),
            });
        }

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key_bytes)),
        })
    }

    /// Generate a fresh random key in the accepted base64 format
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

impl SecretsProvider for ChaChaSecretsProvider {
    fn encrypt(&self, plaintext: &str) -> Result<String, SecretsError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretsError::EncryptionFailed {
                reason: "AEAD encryption failed".to_string(),
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretsError> {
        let blob = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| SecretsError::Malformed {
                reason: format!("blob is not valid base64: {}", e),
            })?;

        if blob.len() <= NONCE_LEN {
            return Err(SecretsError::Malformed {
                reason: "blob too short to contain a nonce".to_string(),
            });
        }

        let (nonce_bytes, payload) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|_| SecretsError::DecryptionFailed {
                reason: "AEAD tag verification failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|e| SecretsError::Malformed {
            reason: format!("decrypted payload is not UTF-8: {}", e),
        })
    }
}
