//! JWT token issuing and verification.
//!
//! Access and refresh tokens are both HS256 JWTs carrying the identity
//! payload, signed with *different* secrets and given different lifetimes.
//! Refresh tokens also carry a `jti` so the server can rotate them.

use std::fmt;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info};

use super::AuthError;
use crate::models::auth::{IdentityPayload, TokenClaims, TokenPair};
use crate::uuid::uuidv7;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

/// Mints and verifies access/refresh token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_secret: access_secret.to_vec(),
            refresh_secret: refresh_secret.to_vec(),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }

    /// Override both token lifetimes.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint a new access/refresh pair for `payload`.
    pub fn generate_tokens(&self, payload: &IdentityPayload) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let expiry = |ttl: Duration| {
            now.checked_add_signed(ttl)
                .ok_or_else(|| AuthError::Internal("token lifetime out of range".into()))
        };

        let access_claims = TokenClaims {
            user: payload.clone(),
            iat: now.timestamp(),
            exp: expiry(self.access_ttl)?.timestamp(),
            jti: None,
        };

        let refresh_jti = uuidv7().to_string();
        let refresh_expires_at = expiry(self.refresh_ttl)?;
        let refresh_claims = TokenClaims {
            user: payload.clone(),
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
            jti: Some(refresh_jti.clone()),
        };

        Ok(TokenPair {
            access_token: sign(&access_claims, &self.access_secret)?,
            refresh_token: sign(&refresh_claims, &self.refresh_secret)?,
            refresh_jti,
            refresh_expires_at,
        })
    }

    /// Verify an access token. Invalid or expired tokens yield `None`.
    pub fn verify_access_token(&self, token: &str) -> Option<TokenClaims> {
        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&self.access_secret),
            &strict_validation(),
        )
        .map_err(|e| debug!("access token rejected: {e}"))
        .ok()
        .map(|data| data.claims)
    }

    /// Verify a refresh token, distinguishing expiry from other failures.
    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&self.refresh_secret),
            &strict_validation(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenError("refresh token expired".into()),
            _ => AuthError::TokenError("invalid refresh token".into()),
        })?
        .claims;

        if claims.jti.is_none() {
            return Err(AuthError::TokenError("refresh token without jti".into()));
        }
        Ok(claims)
    }
}

fn sign(claims: &TokenClaims, secret: &[u8]) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// HS256 with exact expiry (no leeway).
fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

/// Decode claims *without* checking the signature or expiry.
///
/// Clients use this to read `exp` and the cached user view from a token they
/// hold. The result must never be used for authorization.
pub fn peek_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Resolve a signing secret: first non-empty env var in `env_vars` →
/// persisted file `file_name` → freshly generated (and persisted) secret.
pub fn resolve_secret(env_vars: &[&str], file_name: &str) -> String {
    for var in env_vars {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new signing secret");
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aio-toolkit")
        .join(file_name)
}
