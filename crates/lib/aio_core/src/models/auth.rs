//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! shapes in `aio_api::models`. The identity payload is the exception: it is
//! embedded verbatim in tokens and returned to clients, so it carries the
//! camelCase wire names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to every new account.
pub const DEFAULT_ROLE: &str = "user";

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Deactivated,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::Blocked => "blocked",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "deactivated" => Ok(AccountStatus::Deactivated),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

/// User identity payload: the claims embedded in both tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPayload {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

/// JWT claims: the identity payload plus registered timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub user: IdentityPayload,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Token id. Present on refresh tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    /// Whether `exp` is at or before `now` (unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// `jti` of the refresh token, recorded in the refresh ledger.
    pub refresh_jti: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// User record as held by the user store.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub identity: IdentityPayload,
    pub password_hash: String,
    pub status: AccountStatus,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user. The password is already hashed; the store
/// allocates the id and the referral code.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub fingerprint: Option<String>,
    pub role: String,
}

/// Refresh token ledger entry.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Not revoked and not yet expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Sparse profile update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
}

impl UserUpdate {
    /// Updatable columns, in the order `assignments` yields them.
    pub const COLUMNS: [&'static str; 3] = ["name", "avatar", "phone"];

    /// `(column, value)` pairs for every field that is set.
    pub fn assignments(&self) -> Vec<(&'static str, &str)> {
        let values = [&self.name, &self.avatar, &self.phone];
        Self::COLUMNS
            .iter()
            .zip(values)
            .filter_map(|(col, v)| v.as_deref().map(|v| (*col, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    /// Apply the set fields onto an identity payload.
    pub fn apply_to(&self, identity: &mut IdentityPayload) {
        if let Some(name) = &self.name {
            identity.name = name.clone();
        }
        if let Some(avatar) = &self.avatar {
            identity.avatar = Some(avatar.clone());
        }
        if let Some(phone) = &self.phone {
            identity.phone = Some(phone.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> IdentityPayload {
        IdentityPayload {
            id: "u-1".into(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            role: DEFAULT_ROLE.into(),
            avatar: None,
            phone: None,
            points: Some(0),
            referral_code: Some("ABCD1234".into()),
        }
    }

    #[test]
    fn identity_serializes_camel_case() {
        let json = serde_json::to_value(identity()).unwrap();
        assert_eq!(json["referralCode"], "ABCD1234");
        assert!(json.get("avatar").is_none());
    }

    #[test]
    fn claims_flatten_identity() {
        let claims = TokenClaims {
            user: identity(),
            iat: 10,
            exp: 20,
            jti: None,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["email"], "ana@example.com");
        assert_eq!(json["exp"], 20);
        assert!(json.get("jti").is_none());

        let back: TokenClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back.user, identity());
    }

    #[test]
    fn account_status_parses() {
        assert_eq!("blocked".parse::<AccountStatus>(), Ok(AccountStatus::Blocked));
        assert!("frozen".parse::<AccountStatus>().is_err());
        assert!(AccountStatus::Active.is_active());
        assert!(!AccountStatus::Deactivated.is_active());
    }

    #[test]
    fn update_assignments_skip_unset_fields() {
        let update = UserUpdate {
            name: None,
            avatar: Some("a.png".into()),
            phone: Some("0812".into()),
        };
        assert_eq!(update.assignments(), vec![("avatar", "a.png"), ("phone", "0812")]);
        assert!(UserUpdate::default().is_empty());

        let mut id = identity();
        update.apply_to(&mut id);
        assert_eq!(id.name, "Ana");
        assert_eq!(id.avatar.as_deref(), Some("a.png"));
    }
}
