//! HS256 bearer tokens
//!
//! Minimal JWT: base64url(header).base64url(claims).base64url(tag) with a
//! fixed `{"alg":"HS256","typ":"JWT"}` header. Verification checks the tag
//! with `Mac::verify_slice` and then the `exp` claim.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use switchboard_interfaces::{AuthError, AuthenticatedUser};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id
    pub sub: Uuid,
    pub email: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// Signs and verifies bearer tokens with a shared secret
pub struct TokenService {
    secret: Vec<u8>,
    ttl_s: u64,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_s: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_s,
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).expect("HMAC key length is unrestricted")
    }

    /// Issue a token for a user
    pub fn issue(&self, user: &AuthenticatedUser) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            exp: Utc::now().timestamp() + self.ttl_s as i64,
        };
        let payload = serde_json::to_string(&claims).map_err(|e| AuthError::InvalidToken {
            reason: format!("claims serialization failed: {}", e),
        })?;

        let signing_input = format!("{}.{}", B64URL.encode(HEADER), B64URL.encode(payload));
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, B64URL.encode(tag)))
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (header, payload, tag) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(t), None) => (h, p, t),
            _ => {
                return Err(AuthError::InvalidToken {
                    reason: "token must have exactly three segments".to_string(),
                })
            }
        };

        let tag_bytes = B64URL.decode(tag).map_err(|_| AuthError::InvalidToken {
            reason: "signature segment is not base64url".to_string(),
        })?;

        let mut mac = self.mac();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        mac.verify_slice(&tag_bytes).map_err(|_| AuthError::InvalidToken {
            reason: "signature mismatch".to_string(),
        })?;

        let payload_bytes = B64URL.decode(payload).map_err(|_| AuthError::InvalidToken {
            reason: "claims segment is not base64url".to_string(),
        })?;
        let claims: Claims =
            serde_json::from_slice(&payload_bytes).map_err(|e| AuthError::InvalidToken {
                reason: format!("claims are not valid JSON: {}", e),
            })?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            email: "dev@example.com".into(),
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let service = TokenService::new(b"0123456789abcdef".to_vec(), 3600);
        let u = user();
        let token = service.issue(&u).unwrap();
        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.email, u.email);
    }

    #[test]
    fn rejects_wrong_secret() {
        let a = TokenService::new(b"0123456789abcdef".to_vec(), 3600);
        let b = TokenService::new(b"fedcba9876543210".to_vec(), 3600);
        let token = a.issue(&user()).unwrap();
        assert!(matches!(b.verify(&token), Err(AuthError::InvalidToken { .. })));
    }

    #[test]
    fn rejects_expired_token() {
        let service = TokenService::new(b"0123456789abcdef".to_vec(), 0);
        let token = service.issue(&user()).unwrap();
        assert!(matches!(service.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_garbage() {
        let service = TokenService::new(b"0123456789abcdef".to_vec(), 3600);
        assert!(service.verify("nonsense").is_err());
        assert!(service.verify("a.b.c").is_err());
        assert!(service.verify("a.b.c.d").is_err());
    }

    #[test]
    fn rejects_tampered_claims() {
        let service = TokenService::new(b"0123456789abcdef".to_vec(), 3600);
        let token = service.issue(&user()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = B64URL.encode(r#"{"sub":"00000000-0000-0000-0000-000000000000","email":"x","exp":9999999999}"#);
        parts[1] = &forged;
        assert!(service.verify(&parts.join(".")).is_err());
    }
}
