//! API server configuration.

use aio_core::auth::jwt::{
    DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_DAYS, TokenIssuer, resolve_secret,
};
use chrono::Duration;
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Access token signing secret.
    pub access_secret: String,
    /// Refresh token signing secret. Must differ from `access_secret`.
    pub refresh_secret: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token (and cookie) lifetime in days.
    pub refresh_ttl_days: i64,
    /// Mark the refresh cookie `Secure`. On in production.
    pub secure_cookies: bool,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                  | Default                                  |
    /// |---------------------------|------------------------------------------|
    /// | `BIND_ADDR`               | `127.0.0.1:3100`                         |
    /// | `DATABASE_URL`            | `postgres://localhost:5432/aio_toolkit`  |
    /// | `JWT_ACCESS_SECRET`       | generated & persisted to file            |
    /// | `JWT_REFRESH_SECRET`      | generated & persisted to file            |
    /// | `ACCESS_TOKEN_TTL_SECS`   | `900`                                    |
    /// | `REFRESH_TOKEN_TTL_DAYS`  | `7`                                      |
    /// | `APP_ENV`                 | `development` (`production` ⇒ Secure)   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/aio_toolkit".into()),
            access_secret: resolve_secret(&["JWT_ACCESS_SECRET", "JWT_SECRET"], "access-secret"),
            refresh_secret: resolve_secret(&["JWT_REFRESH_SECRET"], "refresh-secret"),
            access_ttl_secs: env_ttl(
                "ACCESS_TOKEN_TTL_SECS",
                DEFAULT_ACCESS_TTL_SECS,
                Duration::try_seconds,
            ),
            refresh_ttl_days: env_ttl(
                "REFRESH_TOKEN_TTL_DAYS",
                DEFAULT_REFRESH_TTL_DAYS,
                Duration::try_days,
            ),
            secure_cookies: std::env::var("APP_ENV").is_ok_and(|env| env == "production"),
        }
    }

    /// Development defaults with fixed secrets. Used by tests.
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_days: DEFAULT_REFRESH_TTL_DAYS,
            secure_cookies: false,
        }
    }

    /// Out-of-range values fall back to the default lifetime.
    pub fn access_ttl(&self) -> Duration {
        Duration::try_seconds(self.access_ttl_secs)
            .filter(|ttl| *ttl > Duration::zero())
            .unwrap_or(Duration::seconds(DEFAULT_ACCESS_TTL_SECS))
    }

    /// Out-of-range values fall back to the default lifetime.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::try_days(self.refresh_ttl_days)
            .filter(|ttl| *ttl > Duration::zero())
            .unwrap_or(Duration::days(DEFAULT_REFRESH_TTL_DAYS))
    }

    /// Build the token issuer described by this configuration.
    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(self.access_secret.as_bytes(), self.refresh_secret.as_bytes())
            .with_ttls(self.access_ttl(), self.refresh_ttl())
    }
}

fn env_ttl(var: &str, default: i64, to_duration: fn(i64) -> Option<Duration>) -> i64 {
    parse_ttl(var, std::env::var(var).ok().as_deref(), default, to_duration)
}

/// A positive lifetime that `to_duration` can represent, else `default`.
fn parse_ttl(
    var: &str,
    raw: Option<&str>,
    default: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> i64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 && to_duration(value).is_some() => value,
        _ => {
            warn!(%var, value = %raw, default, "invalid TTL, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_uses_configured_ttls() {
        let mut config = ApiConfig::for_testing();
        config.access_ttl_secs = 60;
        config.refresh_ttl_days = 2;
        let issuer = config.token_issuer();
        assert_eq!(issuer.access_ttl(), Duration::seconds(60));
        assert_eq!(issuer.refresh_ttl(), Duration::days(2));
    }

    #[test]
    fn ttl_parsing_rejects_out_of_range_values() {
        let parse = |raw| parse_ttl("ACCESS_TOKEN_TTL_SECS", raw, 900, Duration::try_seconds);
        assert_eq!(parse(None), 900);
        assert_eq!(parse(Some("60")), 60);
        assert_eq!(parse(Some("99999999999999999")), 900);
        assert_eq!(parse(Some("-5")), 900);
        assert_eq!(parse(Some("soon")), 900);
        assert_eq!(
            parse_ttl("REFRESH_TOKEN_TTL_DAYS", Some("999999999999"), 7, Duration::try_days),
            7
        );
    }

    #[test]
    fn huge_ttls_fall_back_instead_of_panicking() {
        let mut config = ApiConfig::for_testing();
        config.access_ttl_secs = i64::MAX;
        config.refresh_ttl_days = i64::MAX;
        let issuer = config.token_issuer();
        assert_eq!(issuer.access_ttl(), Duration::seconds(DEFAULT_ACCESS_TTL_SECS));
        assert_eq!(issuer.refresh_ttl(), Duration::days(DEFAULT_REFRESH_TTL_DAYS));
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", ApiConfig::for_testing());
        assert!(!rendered.contains("test-access-secret"));
        assert!(!rendered.contains("test-refresh-secret"));
    }
}
