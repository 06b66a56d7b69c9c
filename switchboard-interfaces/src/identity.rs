//! Identity resolution contract
//!
//! The HTTP layer extracts a bearer credential and asks an implementation to
//! turn it into a user. Whether authentication is *required* is decided per
//! project by the caller, not here.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AuthError;

/// An authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
}

/// Resolves an optional bearer credential into a user
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means no credential was presented; an invalid credential
    /// is an error even when authentication is optional.
    async fn resolve(&self, bearer: Option<&str>) -> Result<Option<AuthenticatedUser>, AuthError>;
}
