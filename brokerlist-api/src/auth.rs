//! Admin authentication.
//!
//! The revalidation endpoint is protected by one shared secret sent as
//! `Authorization: Bearer <secret>`. Without a configured secret every admin
//! request is rejected.

use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{ApiError, ApiResult};

/// Type-safe admin secret that prevents accidental logging.
#[derive(Clone)]
pub struct AdminToken(SecretString);

impl AdminToken {
    /// Returns `None` for an empty secret.
    pub fn new(secret: SecretString) -> Option<Self> {
        if secret.expose_secret().trim().is_empty() {
            return None;
        }
        Some(Self(secret))
    }

    /// Compare `candidate` against the secret.
    ///
    /// Both sides are hashed first so the comparison runs over equal-length
    /// digests and does not short-circuit on the first differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = Sha256::digest(self.0.expose_secret().as_bytes());
        let actual = Sha256::digest(candidate.as_bytes());
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken([REDACTED])")
    }
}

/// Extract the bearer token from request headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Authorize an admin request.
pub fn authorize_admin(token: Option<&AdminToken>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(token) = token else {
        tracing::warn!("Admin request rejected: no revalidation secret configured");
        return Err(ApiError::unauthorized());
    };
    match bearer_token(headers) {
        Some(candidate) if token.matches(candidate) => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token(secret: &str) -> Option<AdminToken> {
        AdminToken::new(SecretString::from(secret))
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(header::AUTHORIZATION, v);
        }
        headers
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(token("").is_none());
        assert!(token("   ").is_none());
    }

    #[test]
    fn test_matches() {
        let admin = token("s3cret").expect("token");
        assert!(admin.matches("s3cret"));
        assert!(!admin.matches("s3cret "));
        assert!(!admin.matches(""));
    }

    #[test]
    fn test_authorize_admin() {
        let admin = token("s3cret");
        assert!(authorize_admin(admin.as_ref(), &headers("Bearer s3cret")).is_ok());
        assert!(authorize_admin(admin.as_ref(), &headers("Bearer wrong")).is_err());
        assert!(authorize_admin(admin.as_ref(), &headers("Basic s3cret")).is_err());
        assert!(authorize_admin(admin.as_ref(), &HeaderMap::new()).is_err());
        assert!(authorize_admin(None, &headers("Bearer s3cret")).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let admin = token("s3cret").expect("token");
        assert!(!format!("{:?}", admin).contains("s3cret"));
    }
}
