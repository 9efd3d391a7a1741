//! Handlers for the authenticated user's own record.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::{AppResult, msg};
use crate::handlers::auth::parse_body;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{UpdateProfileRequest, UserResponse};
use crate::services::auth;

/// `GET /api/auth/me`: the current user, re-read from the store.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let identity = auth::current_user(state.store.as_ref(), user.user_id()).await?;
    Ok(Json(UserResponse {
        success: true,
        message: msg::USER_OK.into(),
        user: Some(identity),
    }))
}

/// `PATCH /api/users/me`: update name, avatar or phone.
pub async fn update_me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let body = parse_body(payload)?;
    let identity = auth::update_profile(state.store.as_ref(), user.user_id(), &body).await?;
    Ok(Json(UserResponse {
        success: true,
        message: msg::PROFILE_OK.into(),
        user: Some(identity),
    }))
}
