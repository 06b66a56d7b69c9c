//! Security configuration: secrets key and token signing

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

/// Key material configuration
///
/// Both values arrive through the environment in any real deployment; the
/// YAML fields exist for development setups only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte symmetric key for args/env at rest
    pub encryption_key: String,

    /// Secret for HS256 bearer-token signing and verification
    pub jwt_secret: String,

    /// Token lifetime in seconds when this process issues tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_s: u64,
}

impl Validatable for SecurityConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.encryption_key, "encryption_key", self.domain_name())?;
        validate_required_string(&self.jwt_secret, "jwt_secret", self.domain_name())?;
        if self.jwt_secret.len() < 16 {
            return Err(self.validation_error("jwt_secret must be at least 16 characters"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "security"
    }
}

fn default_token_ttl() -> u64 {
    86_400
}
