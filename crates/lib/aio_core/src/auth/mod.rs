//! Authentication and session logic.
//!
//! Provides password hashing, token issuing, payload validation and referral
//! codes, shared by `aio_api` (server) and `aio_client` (claims peeking).

pub mod jwt;
pub mod password;
pub mod referral;
pub mod validation;

use thiserror::Error;

use crate::models::auth::AccountStatus;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or password. Never says which.
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Account is {0}")]
    AccountInactive(AccountStatus),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Suspicious registration")]
    FraudSignal,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
