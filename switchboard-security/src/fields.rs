//! Encrypted-field adapter for server args/env
//!
//! Server rows written before encryption landed carry plaintext `args`/`env`;
//! current rows carry ciphertext. Reads prefer the ciphertext and fall back
//! to the legacy field so old rows keep working until the next write
//! re-encrypts them. Writes always go through the provider.

use std::collections::HashMap;

use tracing::warn;

use switchboard_interfaces::{McpServer, SecretsError, SecretsProvider};

/// Resolve a server's command arguments to plaintext
pub fn open_args(
    provider: &dyn SecretsProvider,
    server: &McpServer,
) -> Result<Vec<String>, SecretsError> {
    if let Some(blob) = &server.args_encrypted {
        match provider.decrypt(blob) {
            Ok(json) => {
                return serde_json::from_str(&json).map_err(|e| SecretsError::Malformed {
                    reason: format!("decrypted args are not a JSON array: {}", e),
                });
            }
            Err(e) if server.args_plain.is_some() => {
                warn!(server = %server.name, error = %e, "args decryption failed, using legacy plaintext");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(server.args_plain.clone().unwrap_or_default())
}

/// Resolve a server's environment overlay to plaintext
pub fn open_env(
    provider: &dyn SecretsProvider,
    server: &McpServer,
) -> Result<HashMap<String, String>, SecretsError> {
    if let Some(blob) = &server.env_encrypted {
        match provider.decrypt(blob) {
            Ok(json) => {
                return serde_json::from_str(&json).map_err(|e| SecretsError::Malformed {
                    reason: format!("decrypted env is not a JSON object: {}", e),
                });
            }
            Err(e) if server.env_plain.is_some() => {
                warn!(server = %server.name, error = %e, "env decryption failed, using legacy plaintext");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(server.env_plain.clone().unwrap_or_default())
}

/// Encrypt command arguments for persistence
pub fn seal_args(provider: &dyn SecretsProvider, args: &[String]) -> Result<String, SecretsError> {
    let json = serde_json::to_string(args).map_err(|e| SecretsError::Malformed {
        reason: format!("args are not serializable: {}", e),
    })?;
    provider.encrypt(&json)
}

/// Encrypt an environment overlay for persistence
pub fn seal_env(
    provider: &dyn SecretsProvider,
    env: &HashMap<String, String>,
) -> Result<String, SecretsError> {
    let json = serde_json::to_string(env).map_err(|e| SecretsError::Malformed {
        reason: format!("env is not serializable: {}", e),
    })?;
    provider.encrypt(&json)
}
