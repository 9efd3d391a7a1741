//! Authentication service: the login/register/refresh/logout flows.
//!
//! Handlers stay thin: they extract the request, call into this module, and
//! turn the outcome into cookies plus a JSON body.

use std::sync::LazyLock;

use aio_core::auth::jwt::TokenIssuer;
use aio_core::auth::{AuthError, password, validation};
use aio_core::models::auth::{
    DEFAULT_ROLE, IdentityPayload, NewUser, StoredUser, TokenPair, UserUpdate,
};
use aio_core::store::UserStore;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, msg};
use crate::models::{LoginRequest, RegisterRequest, UpdateProfileRequest};

/// Hash compared against when the email is unknown, so both failure paths
/// cost one bcrypt verification.
static TIMING_GUARD_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| password::hash_password("aio-toolkit-timing-guard").ok());

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub tokens: TokenPair,
    pub user: IdentityPayload,
}

/// Issue a token pair for `user` and record the refresh `jti`.
async fn grant(
    store: &dyn UserStore,
    issuer: &TokenIssuer,
    user: IdentityPayload,
) -> AppResult<SessionGrant> {
    let tokens = issuer.generate_tokens(&user)?;
    store
        .record_refresh_token(&tokens.refresh_jti, &user.id, tokens.refresh_expires_at)
        .await?;
    Ok(SessionGrant { tokens, user })
}

fn ensure_active(user: &StoredUser) -> AppResult<()> {
    if user.status.is_active() {
        Ok(())
    } else {
        Err(AuthError::AccountInactive(user.status).into())
    }
}

/// Authenticate with email + password.
///
/// Account status is checked before the password, so an inactive account is
/// rejected with 403 whether or not the password is right. Unknown email and
/// wrong password produce the same error.
pub async fn login(
    store: &dyn UserStore,
    issuer: &TokenIssuer,
    body: &LoginRequest,
) -> AppResult<SessionGrant> {
    validation::validate_login(&body.email, &body.password)?;
    let email = validation::normalize_email(&body.email);

    let Some(user) = store.find_by_email(&email).await? else {
        if let Some(hash) = TIMING_GUARD_HASH.as_deref() {
            let _ = password::verify_password(&body.password, hash);
        }
        debug!(%email, "login for unknown email");
        return Err(AuthError::CredentialError.into());
    };

    ensure_active(&user)?;

    if !password::verify_password(&body.password, &user.password_hash) {
        debug!(user_id = %user.identity.id, "login with wrong password");
        return Err(AuthError::CredentialError.into());
    }

    let granted = grant(store, issuer, user.identity).await?;
    info!(user_id = %granted.user.id, "user logged in");
    Ok(granted)
}

/// Register a new account with the default role and a fresh referral code.
pub async fn register(store: &dyn UserStore, body: &RegisterRequest) -> AppResult<IdentityPayload> {
    validation::validate_registration(
        &body.name,
        &body.email,
        &body.password,
        &body.repeat_password,
    )?;
    let email = validation::normalize_email(&body.email);

    if store.find_by_email(&email).await?.is_some() {
        return Err(AuthError::Conflict("email already registered".into()).into());
    }

    let fingerprint = body
        .fingerprint
        .as_deref()
        .map(str::trim)
        .filter(|fp| !fp.is_empty())
        .map(str::to_string);

    if let Some(fp) = &fingerprint
        && store.fingerprint_exists(fp).await?
    {
        warn!(%email, "registration blocked: device fingerprint already in use");
        return Err(AuthError::FraudSignal.into());
    }

    let password_hash = password::hash_password(&body.password)?;
    let user = store
        .create(NewUser {
            name: body.name.trim().to_string(),
            email,
            password_hash,
            fingerprint,
            role: DEFAULT_ROLE.to_string(),
        })
        .await?;

    info!(user_id = %user.identity.id, "user registered");
    Ok(user.identity)
}

/// Exchange a refresh token for a new pair (single-use rotation).
///
/// The old token is spent and the new one recorded in one store operation,
/// so a failed write leaves the presented cookie usable. Every failure is
/// reported as `SessionExpired` except an account that has since been
/// deactivated or blocked.
pub async fn refresh(
    store: &dyn UserStore,
    issuer: &TokenIssuer,
    refresh_token: Option<&str>,
) -> AppResult<SessionGrant> {
    let token = refresh_token
        .filter(|t| !t.is_empty())
        .ok_or(AppError::SessionExpired)?;

    let claims = issuer.verify_refresh_token(token).map_err(|e| {
        debug!("refresh rejected: {e}");
        AppError::SessionExpired
    })?;
    let jti = claims.jti.as_deref().ok_or(AppError::SessionExpired)?;

    let user = store
        .find_by_id(&claims.user.id)
        .await?
        .ok_or(AppError::SessionExpired)?;
    ensure_active(&user)?;

    let tokens = issuer.generate_tokens(&user.identity)?;
    let rotated = store
        .rotate_refresh_token(
            jti,
            &tokens.refresh_jti,
            &user.identity.id,
            tokens.refresh_expires_at,
        )
        .await?;
    if !rotated {
        warn!(user_id = %claims.user.id, "refresh token reused, revoked or not owned");
        return Err(AppError::SessionExpired);
    }

    debug!(user_id = %user.identity.id, "session refreshed");
    Ok(SessionGrant {
        tokens,
        user: user.identity,
    })
}

/// Revoke the presented refresh token, if any. Never fails.
pub async fn logout(store: &dyn UserStore, issuer: &TokenIssuer, refresh_token: Option<&str>) {
    let Some(claims) = refresh_token.and_then(|t| issuer.verify_refresh_token(t).ok()) else {
        return;
    };
    if let Some(jti) = claims.jti.as_deref()
        && let Err(e) = store.revoke_refresh_token(jti).await
    {
        warn!(user_id = %claims.user.id, "logout could not revoke refresh token: {e}");
        return;
    }
    info!(user_id = %claims.user.id, "user logged out");
}

/// Fetch the current identity from the store (server-side source of truth).
pub async fn current_user(store: &dyn UserStore, user_id: &str) -> AppResult<IdentityPayload> {
    let user = store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(msg::USER_NOT_FOUND.into()))?;
    ensure_active(&user)?;
    Ok(user.identity)
}

/// Apply a profile update for the authenticated user.
pub async fn update_profile(
    store: &dyn UserStore,
    user_id: &str,
    body: &UpdateProfileRequest,
) -> AppResult<IdentityPayload> {
    let update = UserUpdate {
        name: body.name.as_deref().map(str::trim).map(str::to_string),
        avatar: body.avatar.as_deref().map(str::trim).map(str::to_string),
        phone: body.phone.as_deref().map(str::trim).map(str::to_string),
    };

    if update.is_empty() {
        return Err(AppError::Validation(msg::NOTHING_TO_UPDATE.into()));
    }
    if let Some(name) = &update.name
        && name.chars().count() < validation::MIN_NAME_LEN
    {
        return Err(AppError::Validation("Nama minimal 3 karakter.".into()));
    }

    current_user(store, user_id).await?;
    let user = store
        .update_by_id(user_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(msg::USER_NOT_FOUND.into()))?;
    info!(%user_id, "profile updated");
    Ok(user.identity)
}
