//! In-memory user store.
//!
//! Every mutation happens under one write lock, which gives `create` the same
//! all-or-nothing behaviour as the PostgreSQL transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{REFERRAL_CODE_ATTEMPTS, UserStore};
use crate::auth::AuthError;
use crate::auth::referral::generate_referral_code;
use crate::models::auth::{
    AccountStatus, IdentityPayload, NewUser, RefreshTokenRecord, StoredUser, UserUpdate,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, StoredUser>,
    /// Role assignments keyed by user id, mirroring `user_roles`.
    roles: HashMap<String, Vec<String>>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// `UserStore` held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change an account's status. Returns `false` for unknown ids.
    pub async fn set_status(&self, id: &str, status: AccountStatus) -> bool {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(id) {
            Some(user) => {
                user.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Total role assignments across all users.
    pub async fn role_assignment_count(&self) -> usize {
        self.inner.read().await.roles.values().map(Vec::len).sum()
    }

    /// Ledger entries that are neither revoked nor expired.
    pub async fn live_refresh_token_count(&self) -> usize {
        let now = Utc::now();
        self.inner
            .read()
            .await
            .refresh_tokens
            .values()
            .filter(|record| record.is_live_at(now))
            .count()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.identity.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, AuthError> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .any(|user| user.fingerprint.as_deref() == Some(fingerprint)))
    }

    async fn create(&self, user: NewUser) -> Result<StoredUser, AuthError> {
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|u| u.identity.email == user.email) {
            return Err(AuthError::Conflict("email already registered".into()));
        }

        let referral_code = (0..REFERRAL_CODE_ATTEMPTS)
            .map(|_| generate_referral_code())
            .find(|code| {
                !inner
                    .users
                    .values()
                    .any(|u| u.identity.referral_code.as_ref() == Some(code))
            })
            .ok_or_else(|| AuthError::Internal("could not allocate a unique referral code".into()))?;

        let id = Uuid::new_v4().to_string();
        let stored = StoredUser {
            identity: IdentityPayload {
                id: id.clone(),
                name: user.name,
                email: user.email,
                role: user.role.clone(),
                avatar: None,
                phone: None,
                points: Some(0),
                referral_code: Some(referral_code),
            },
            password_hash: user.password_hash,
            status: AccountStatus::Active,
            fingerprint: user.fingerprint,
            created_at: Utc::now(),
        };

        inner.users.insert(id.clone(), stored.clone());
        inner.roles.insert(id, vec![user.role]);
        Ok(stored)
    }

    async fn update_by_id(
        &self,
        id: &str,
        update: &UserUpdate,
    ) -> Result<Option<StoredUser>, AuthError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(id).map(|user| {
            update.apply_to(&mut user.identity);
            user.clone()
        }))
    }

    async fn record_refresh_token(
        &self,
        jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        inner.refresh_tokens.insert(
            jti.to_string(),
            RefreshTokenRecord {
                jti: jti.to_string(),
                user_id: user_id.to_string(),
                expires_at,
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let Some(record) = inner
            .refresh_tokens
            .get_mut(old_jti)
            .filter(|record| record.is_live_at(now) && record.user_id == user_id)
        else {
            return Ok(false);
        };
        record.revoked_at = Some(now);
        inner.refresh_tokens.insert(
            new_jti.to_string(),
            RefreshTokenRecord {
                jti: new_jti.to_string(),
                user_id: user_id.to_string(),
                expires_at,
                revoked_at: None,
            },
        );
        Ok(true)
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.refresh_tokens.get_mut(jti)
            && record.revoked_at.is_none()
        {
            record.revoked_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::auth::DEFAULT_ROLE;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Citra".into(),
            email: email.into(),
            password_hash: "$2b$10$hash".into(),
            fingerprint: Some("fp-1".into()),
            role: DEFAULT_ROLE.into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_role_and_referral_code() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("citra@example.com")).await.unwrap();

        assert_eq!(user.identity.role, DEFAULT_ROLE);
        assert_eq!(user.identity.referral_code.as_ref().map(String::len), Some(8));
        assert_eq!(user.status, AccountStatus::Active);
        assert_eq!(store.role_assignment_count().await, 1);

        let found = store.find_by_email("citra@example.com").await.unwrap().unwrap();
        assert_eq!(found.identity.id, user.identity.id);
        assert!(store.find_by_id(&user.identity.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_email_leaves_no_partial_rows() {
        let store = MemoryUserStore::new();
        store.create(new_user("dup@example.com")).await.unwrap();

        let err = store.create(new_user("dup@example.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
        assert_eq!(store.user_count().await, 1);
        assert_eq!(store.role_assignment_count().await, 1);
    }

    #[tokio::test]
    async fn fingerprint_lookup() {
        let store = MemoryUserStore::new();
        assert!(!store.fingerprint_exists("fp-1").await.unwrap());
        store.create(new_user("fp@example.com")).await.unwrap();
        assert!(store.fingerprint_exists("fp-1").await.unwrap());
    }

    #[tokio::test]
    async fn update_writes_only_set_fields() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("upd@example.com")).await.unwrap();
        let update = UserUpdate {
            phone: Some("0813".into()),
            ..Default::default()
        };

        let updated = store
            .update_by_id(&user.identity.id, &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.identity.phone.as_deref(), Some("0813"));
        assert_eq!(updated.identity.name, "Citra");

        assert!(store.update_by_id("missing", &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotation_spends_old_token_and_records_new_one() {
        let store = MemoryUserStore::new();
        let expires = Utc::now() + Duration::days(7);
        store.record_refresh_token("jti-1", "user-1", expires).await.unwrap();

        assert!(store.rotate_refresh_token("jti-1", "jti-2", "user-1", expires).await.unwrap());
        assert_eq!(store.live_refresh_token_count().await, 1);

        // The spent token cannot be rotated again; the new one can.
        assert!(!store.rotate_refresh_token("jti-1", "jti-3", "user-1", expires).await.unwrap());
        assert!(store.rotate_refresh_token("jti-2", "jti-3", "user-1", expires).await.unwrap());
        assert!(!store.rotate_refresh_token("unknown", "jti-4", "user-1", expires).await.unwrap());
        assert_eq!(store.live_refresh_token_count().await, 1);
    }

    #[tokio::test]
    async fn rotation_rejects_foreign_expired_and_revoked_tokens() {
        let store = MemoryUserStore::new();
        let later = Utc::now() + Duration::days(1);
        store
            .record_refresh_token("old", "user-1", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        store.record_refresh_token("gone", "user-1", later).await.unwrap();
        store.record_refresh_token("theirs", "user-2", later).await.unwrap();
        store.revoke_refresh_token("gone").await.unwrap();
        store.revoke_refresh_token("never-issued").await.unwrap();

        assert!(!store.rotate_refresh_token("old", "n1", "user-1", later).await.unwrap());
        assert!(!store.rotate_refresh_token("gone", "n2", "user-1", later).await.unwrap());
        assert!(!store.rotate_refresh_token("theirs", "n3", "user-1", later).await.unwrap());

        // Only "theirs" is live and it was left untouched.
        assert_eq!(store.live_refresh_token_count().await, 1);
    }

    #[tokio::test]
    async fn set_status_changes_account() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("st@example.com")).await.unwrap();
        assert!(store.set_status(&user.identity.id, AccountStatus::Blocked).await);
        assert!(!store.set_status("missing", AccountStatus::Blocked).await);
        let found = store.find_by_id(&user.identity.id).await.unwrap().unwrap();
        assert_eq!(found.status, AccountStatus::Blocked);
    }
}
