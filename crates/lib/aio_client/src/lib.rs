//! # aio_client
//!
//! Client-side session management for the All-in-One Toolkit API: holds the
//! access token, refreshes it silently through the httpOnly refresh cookie,
//! and wraps authenticated requests.

pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{AuthState, RegisterForm, SessionManager};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
