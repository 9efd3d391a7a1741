//! Authentication request handlers.
//!
//! Every handler answers with a JSON body carrying `success` and `message`;
//! failures go through `AppError`'s `IntoResponse`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult, msg};
use crate::models::{
    LoginRequest, LoginResponse, MessageResponse, RefreshResponse, RegisterRequest, UserResponse,
};
use crate::services::auth;
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

/// Unwrap a JSON body, turning extractor rejections into a validation error.
pub(crate) fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(body)| body).map_err(|e| {
        debug!("rejected request body: {e}");
        AppError::Validation(msg::MALFORMED_REQUEST.into())
    })
}

fn presented_refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE).map(|c| c.value().to_string())
}

/// `POST /api/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let body = parse_body(payload)?;
    let granted = auth::login(state.store.as_ref(), &state.issuer, &body).await?;

    let jar = jar.add(refresh_cookie(
        &granted.tokens.refresh_token,
        state.config.refresh_ttl(),
        state.config.secure_cookies,
    ));
    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            message: msg::LOGIN_OK.into(),
            access_token: Some(granted.tokens.access_token),
            user: Some(granted.user),
        }),
    ))
}

/// `POST /api/auth/register`: create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let body = parse_body(payload)?;
    let user = auth::register(state.store.as_ref(), &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            message: msg::REGISTER_OK.into(),
            user: Some(user),
        }),
    ))
}

/// `POST /api/auth/refresh`: rotate the refresh cookie and mint a new access
/// token. Any failure other than an internal one clears the cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), (CookieJar, AppError)> {
    let presented = presented_refresh_token(&jar);
    let secure = state.config.secure_cookies;

    match auth::refresh(state.store.as_ref(), &state.issuer, presented.as_deref()).await {
        Ok(granted) => {
            let jar = jar.add(refresh_cookie(
                &granted.tokens.refresh_token,
                state.config.refresh_ttl(),
                secure,
            ));
            Ok((
                jar,
                Json(RefreshResponse {
                    success: true,
                    message: msg::REFRESH_OK.into(),
                    access_token: Some(granted.tokens.access_token),
                }),
            ))
        }
        Err(e @ AppError::Internal(_)) => Err((jar, e)),
        Err(e) => Err((jar.add(clear_refresh_cookie(secure)), e)),
    }
}

/// `POST /api/auth/logout`: clear the refresh cookie. Always succeeds.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let presented = presented_refresh_token(&jar);
    auth::logout(state.store.as_ref(), &state.issuer, presented.as_deref()).await;

    (
        jar.add(clear_refresh_cookie(state.config.secure_cookies)),
        Json(MessageResponse {
            success: true,
            message: msg::LOGOUT_OK.into(),
        }),
    )
}
