//! Bearer-token verification.
//!
//! Tokens are issued elsewhere; this server only checks them. A token is an
//! HS256 JWT whose `sub` (or legacy `id`) claim carries the user identifier.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use matchchat_proto::message::UserId;
use serde::Deserialize;

/// Reasons a request could not be tied to a user.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was supplied.
    #[error("missing bearer token")]
    MissingCredentials,

    /// The token failed signature or expiry checks.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// The token verified but names no user.
    #[error("token has no subject")]
    MissingSubject,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Verifies bearer tokens against a shared secret.
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies a raw token and returns the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for bad signatures, expired or
    /// malformed tokens, and [`AuthError::MissingSubject`] if no usable user id
    /// is present.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        data.claims
            .sub
            .or(data.claims.id)
            .map(UserId::new)
            .filter(|user| !user.is_blank())
            .ok_or(AuthError::MissingSubject)
    }

    /// Verifies the `Authorization: Bearer <token>` header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] if the header is absent or
    /// not a bearer credential, otherwise see [`Authenticator::verify`].
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<UserId, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
        self.verify(token)
    }
}

/// Extracts the token from an `Authorization: Bearer` header, if present.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
