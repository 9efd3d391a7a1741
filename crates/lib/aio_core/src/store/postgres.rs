//! PostgreSQL user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{REFERRAL_CODE_ATTEMPTS, UserStore};
use crate::auth::AuthError;
use crate::auth::referral::generate_referral_code;
use crate::models::auth::{AccountStatus, IdentityPayload, NewUser, StoredUser, UserUpdate};

const EMAIL_CONSTRAINT: &str = "users_email_key";
const REFERRAL_CONSTRAINT: &str = "users_referral_code_key";

/// Columns selected for every user lookup. The role is the first assigned
/// role, falling back to the default.
const USER_COLUMNS: &str = "u.id::text AS id, u.name, u.email, u.password_hash, u.avatar, \
     u.phone, u.points, u.referral_code, u.fingerprint, u.status, \
     COALESCE((SELECT r.role FROM user_roles r WHERE r.user_id = u.id ORDER BY r.role LIMIT 1), 'user') AS role, \
     u.created_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    avatar: Option<String>,
    phone: Option<String>,
    points: i64,
    referral_code: String,
    fingerprint: Option<String>,
    status: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for StoredUser {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let status: AccountStatus = row.status.parse().map_err(AuthError::Internal)?;
        Ok(StoredUser {
            identity: IdentityPayload {
                id: row.id,
                name: row.name,
                email: row.email,
                role: row.role,
                avatar: row.avatar,
                phone: row.phone,
                points: Some(row.points),
                referral_code: Some(row.referral_code),
            },
            password_hash: row.password_hash,
            status,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
        })
    }
}

/// `UserStore` backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Account status updates are an admin concern; exposed for tooling.
    pub async fn set_status(&self, id: &str, status: AccountStatus) -> Result<bool, AuthError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };
        let result =
            sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredUser::try_from).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, AuthError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredUser::try_from).transpose()
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, AuthError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE fingerprint = $1)",
        )
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, user: NewUser) -> Result<StoredUser, AuthError> {
        for attempt in 1..=REFERRAL_CODE_ATTEMPTS {
            let referral_code = generate_referral_code();
            // Dropping `tx` without commit rolls back.
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO users (name, email, password_hash, fingerprint, referral_code) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.fingerprint)
            .bind(&referral_code)
            .fetch_one(&mut *tx)
            .await;

            let user_id = match inserted {
                Ok(id) => id,
                Err(sqlx::Error::Database(db)) if db.constraint() == Some(REFERRAL_CONSTRAINT) => {
                    debug!(attempt, "referral code collision, retrying");
                    continue;
                }
                Err(sqlx::Error::Database(db)) if db.constraint() == Some(EMAIL_CONSTRAINT) => {
                    return Err(AuthError::Conflict("email already registered".into()));
                }
                Err(e) => return Err(e.into()),
            };

            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(user_id)
                .bind(&user.role)
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"
            ))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            return StoredUser::try_from(row);
        }
        Err(AuthError::Internal(
            "could not allocate a unique referral code".into(),
        ))
    }

    async fn update_by_id(
        &self,
        id: &str,
        update: &UserUpdate,
    ) -> Result<Option<StoredUser>, AuthError> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let assignments = update.assignments();
        if assignments.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        for (column, value) in assignments {
            set.push(column)
                .push_unseparated(" = ")
                .push_bind_unseparated(value.to_string());
        }
        set.push("updated_at = now()");
        qb.push(" WHERE id = ").push_bind(uuid);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn record_refresh_token(
        &self,
        jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, expires_at) VALUES ($1::uuid, $2::uuid, $3)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let (Ok(old_jti), Ok(owner)) = (Uuid::parse_str(old_jti), Uuid::parse_str(user_id)) else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        let spent = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL AND expires_at > now()",
        )
        .bind(old_jti)
        .bind(owner)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if spent == 0 {
            // Dropping `tx` rolls back.
            return Ok(false);
        }

        sqlx::query("INSERT INTO refresh_tokens (id, user_id, expires_at) VALUES ($1::uuid, $2, $3)")
            .bind(new_jti)
            .bind(owner)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), AuthError> {
        let Ok(jti) = Uuid::parse_str(jti) else {
            return Ok(());
        };
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
