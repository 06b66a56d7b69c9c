//! Secrets-provider contract
//!
//! Server `args` and `env` are stored encrypted; the provider is the only
//! component that sees key material. Callers get plaintext transiently and
//! must not persist it.

use thiserror::Error;

/// Errors from encrypt/decrypt operations
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Invalid key material: {reason}")]
    InvalidKey { reason: String },

    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Malformed secret payload: {reason}")]
    Malformed { reason: String },
}

/// Symmetric encrypt/decrypt of opaque string payloads
pub trait SecretsProvider: Send + Sync {
    /// Encrypt a plaintext payload into a self-contained string blob
    fn encrypt(&self, plaintext: &str) -> Result<String, SecretsError>;

    /// Decrypt a blob produced by [`SecretsProvider::encrypt`]
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretsError>;
}
