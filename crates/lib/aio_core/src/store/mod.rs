//! User-record store.
//!
//! The gateway only talks to [`UserStore`]; `PgUserStore` backs production and
//! `MemoryUserStore` backs tests and `--in-memory` runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::AuthError;
use crate::models::auth::{NewUser, StoredUser, UserUpdate};

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

/// How many fresh referral codes `create` tries before giving up.
pub const REFERRAL_CODE_ATTEMPTS: usize = 5;

/// Persistence for users, role assignments and the refresh token ledger.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by (normalized) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, AuthError>;

    /// Look up a user by id. Malformed ids are simply not found.
    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, AuthError>;

    /// Whether any account was registered from this device fingerprint.
    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, AuthError>;

    /// Create the user row and its role assignment atomically, allocating a
    /// unique referral code. A taken email yields `AuthError::Conflict` and
    /// leaves nothing behind.
    async fn create(&self, user: NewUser) -> Result<StoredUser, AuthError>;

    /// Apply a sparse profile update. Returns `None` if the user is unknown.
    async fn update_by_id(
        &self,
        id: &str,
        update: &UserUpdate,
    ) -> Result<Option<StoredUser>, AuthError>;

    /// Record a newly issued refresh token.
    async fn record_refresh_token(
        &self,
        jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Spend the live refresh token `old_jti` owned by `user_id` and record
    /// `new_jti` in its place, as one atomic step. Returns `false` and writes
    /// nothing if `old_jti` is already revoked, expired, unknown or owned by
    /// someone else. An error also leaves `old_jti` live.
    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Revoke a refresh token if it is still live. Unknown ids are ignored.
    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), AuthError>;
}
