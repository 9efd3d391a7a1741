//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::{ClientError, ClientResult};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the API lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve an API path such as `/api/auth/me` against the base URL.
    ///
    /// Paths that resolve to another origin (`http://other/x`, `//other/x`)
    /// are refused so the bearer token never leaves the API host.
    pub fn endpoint(&self, path: &str) -> ClientResult<Url> {
        let url = self.base_url.join(path)?;
        if url.origin() != self.base_url.origin() {
            return Err(ClientError::ForeignOrigin(url.to_string()));
        }
        Ok(url)
    }
}
