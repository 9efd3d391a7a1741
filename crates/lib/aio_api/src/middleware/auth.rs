//! Authentication middleware: Bearer token extraction and JWT verification.

use aio_core::models::auth::TokenClaims;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, msg};

/// Key used to store verified `TokenClaims` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.0.user.id
    }
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the JWT,
/// and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            debug!("no Authorization header");
            AppError::Unauthorized(msg::NOT_AUTHENTICATED.into())
        })?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        debug!("Authorization header without Bearer scheme");
        AppError::Unauthorized(msg::NOT_AUTHENTICATED.into())
    })?;

    let claims = state
        .issuer
        .verify_access_token(token)
        .ok_or_else(|| AppError::Unauthorized(msg::NOT_AUTHENTICATED.into()))?;

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}
