//! Client error types.

use thiserror::Error;

/// Convenience alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable session: no token, or the silent refresh failed.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The server answered with `success: false`.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request path resolved to a host other than the API.
    #[error("Refusing request to foreign origin: {0}")]
    ForeignOrigin(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Token store error: {0}")]
    Store(#[from] std::io::Error),
}
