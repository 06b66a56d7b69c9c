//! Request authentication and network gating
//!
//! Projects decide per endpoint whether identity is required
//! (`sse_auth_required` / `message_auth_required`) and may pin an IP
//! allowlist. Bearer tokens are verified by the configured
//! [`IdentityResolver`]; an invalid token is rejected even when
//! authentication is optional.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use http::StatusCode;
use tracing::{debug, warn};

use switchboard_interfaces::{AuthError, AuthenticatedUser, IdentityResolver, Project};
use switchboard_security::TokenService;

/// HS256-token implementation of [`IdentityResolver`]
pub struct TokenIdentityResolver {
    tokens: TokenService,
}

impl TokenIdentityResolver {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityResolver for TokenIdentityResolver {
    async fn resolve(&self, bearer: Option<&str>) -> Result<Option<AuthenticatedUser>, AuthError> {
        let Some(token) = bearer else {
            return Ok(None);
        };
        let claims = self.tokens.verify(token)?;
        Ok(Some(AuthenticatedUser {
            id: claims.sub,
            email: claims.email,
        }))
    }
}

/// Extract the bearer credential from `Authorization: Bearer <token>`
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Best-effort client address: `X-Forwarded-For` first, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or(peer)
}

/// Enforce a project's auth policy for one request
///
/// `required` selects between the project's SSE and message flags. Returns
/// the resolved user (if any) or the HTTP rejection to send.
pub async fn authorize(
    identity: &Arc<dyn IdentityResolver>,
    project: &Project,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    required: bool,
) -> Result<Option<AuthenticatedUser>, (StatusCode, String)> {
    if let Some(ranges) = &project.allowed_ip_ranges {
        if !ranges.is_empty() {
            let ip = client_ip(headers, peer);
            let allowed = ip.map(|ip| ip_in_ranges(ranges, ip)).unwrap_or(false);
            if !allowed {
                warn!(project = %project.slug, ?ip, "client address outside allowed ranges");
                return Err((StatusCode::FORBIDDEN, "Client address not allowed".to_string()));
            }
        }
    }

    let bearer = bearer_from_headers(headers);
    let user = match identity.resolve(bearer.as_deref()).await {
        Ok(user) => user,
        Err(AuthError::Expired) => {
            return Err((StatusCode::UNAUTHORIZED, "Token expired".to_string()));
        }
        Err(e) => {
            return Err((StatusCode::UNAUTHORIZED, e.to_string()));
        }
    };

    if required && user.is_none() {
        return Err((StatusCode::UNAUTHORIZED, "Authentication required".to_string()));
    }

    if let Some(user) = &user {
        debug!(project = %project.slug, user = %user.email, "authenticated request");
    }
    Ok(user)
}

/// Whether `ip` falls inside any of the allowlist entries
///
/// Entries are `a.b.c.d/len` IPv4 networks or bare v4/v6 addresses.
/// Malformed entries are skipped.
pub fn ip_in_ranges(ranges: &[String], ip: IpAddr) -> bool {
    ranges.iter().any(|range| ip_in_range(range, ip))
}

fn ip_in_range(range: &str, ip: IpAddr) -> bool {
    match range.split_once('/') {
        None => range.parse::<IpAddr>().map(|allowed| allowed == ip).unwrap_or(false),
        Some((network, len)) => {
            let (Ok(network), Ok(len)) = (network.parse::<IpAddr>(), len.parse::<u8>()) else {
                return false;
            };
            match (network, ip) {
                (IpAddr::V4(network), IpAddr::V4(ip)) => {
                    if len > 32 {
                        return false;
                    }
                    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
                    u32::from(network) & mask == u32::from(ip) & mask
                }
                (IpAddr::V6(network), IpAddr::V6(ip)) => {
                    if len > 128 {
                        return false;
                    }
                    let mask = if len == 0 { 0 } else { u128::MAX << (128 - len) };
                    u128::from(network) & mask == u128::from(ip) & mask
                }
                _ => false,
            }
        }
    }
}
