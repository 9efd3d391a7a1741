//! Application error types.

use aio_core::auth::AuthError;
use aio_core::models::auth::AccountStatus;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// User-facing messages.
pub mod msg {
    pub const INVALID_CREDENTIALS: &str = "Email atau kata sandi salah.";
    pub const ACCOUNT_DEACTIVATED: &str = "Akun Anda telah dinonaktifkan.";
    pub const ACCOUNT_BLOCKED: &str = "Akun Anda telah diblokir.";
    pub const EMAIL_TAKEN: &str = "Email sudah terdaftar.";
    pub const SUSPICIOUS_ACTIVITY: &str =
        "Aktivitas mencurigakan terdeteksi. Silakan hubungi dukungan.";
    pub const SESSION_EXPIRED: &str = "Sesi telah berakhir. Silakan login kembali.";
    pub const NOT_AUTHENTICATED: &str = "Tidak terautentikasi.";
    pub const MALFORMED_REQUEST: &str = "Permintaan tidak valid.";
    pub const USER_NOT_FOUND: &str = "Pengguna tidak ditemukan.";
    pub const NOTHING_TO_UPDATE: &str = "Tidak ada data yang diperbarui.";
    pub const INTERNAL: &str = "Terjadi kesalahan pada server.";

    pub const LOGIN_OK: &str = "Login berhasil.";
    pub const REGISTER_OK: &str = "Registrasi berhasil.";
    pub const REFRESH_OK: &str = "Token berhasil diperbarui.";
    pub const LOGOUT_OK: &str = "Logout berhasil.";
    pub const PROFILE_OK: &str = "Profil berhasil diperbarui.";
    pub const USER_OK: &str = "Data pengguna ditemukan.";
}

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong email or password.
    #[error("Authentication failed")]
    Authentication,

    #[error("Account is {0}")]
    AccountStatus(AccountStatus),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Fraud signal")]
    FraudSignal,

    /// Refresh token missing, invalid, expired or already used.
    #[error("Session expired")]
    SessionExpired,

    /// Missing or invalid bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication | AppError::SessionExpired | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccountStatus(_) | AppError::FraudSignal => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn parts(&self) -> (&'static str, &str) {
        match self {
            AppError::Validation(m) => ("validation_error", m.as_str()),
            AppError::Authentication => ("authentication_error", msg::INVALID_CREDENTIALS),
            AppError::AccountStatus(AccountStatus::Blocked) => {
                ("account_status_error", msg::ACCOUNT_BLOCKED)
            }
            AppError::AccountStatus(_) => ("account_status_error", msg::ACCOUNT_DEACTIVATED),
            AppError::Conflict(m) => ("conflict", m.as_str()),
            AppError::FraudSignal => ("fraud_signal", msg::SUSPICIOUS_ACTIVITY),
            AppError::SessionExpired => ("session_expired", msg::SESSION_EXPIRED),
            AppError::Unauthorized(m) => ("unauthorized", m.as_str()),
            AppError::NotFound(m) => ("not_found", m.as_str()),
            AppError::Internal(_) => ("internal_error", msg::INTERNAL),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            error!(%detail, "request failed");
        }
        let status = self.status();
        let (error, message) = self.parts();
        let body = Json(ErrorResponse {
            success: false,
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::Authentication,
            AuthError::AccountInactive(status) => AppError::AccountStatus(status),
            AuthError::Conflict(_) => AppError::Conflict(msg::EMAIL_TAKEN.into()),
            AuthError::FraudSignal => AppError::FraudSignal,
            AuthError::TokenError(_) => AppError::SessionExpired,
            AuthError::ValidationError(m) => AppError::Validation(m),
            AuthError::DbError(e) => AppError::from(e),
            AuthError::Internal(m) => AppError::Internal(m),
        }
    }
}
