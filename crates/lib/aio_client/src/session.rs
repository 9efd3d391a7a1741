//! Client session state, silent refresh and authenticated requests.
//!
//! The access token lives in a [`TokenStore`]; the refresh token lives in the
//! reqwest cookie jar and is only ever sent back to the refresh endpoint.
//! The decoded user view is a cache: the server re-validates every request.
//!
//! At most one refresh runs at a time. Callers that find the token expired
//! while a refresh is in flight wait for it and reuse its outcome instead of
//! starting another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use aio_core::auth::jwt::peek_claims;
use aio_core::models::auth::IdentityPayload;
use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::store::TokenStore;

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const REFRESH_PATH: &str = "/api/auth/refresh";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/auth/me";

/// Tri-state authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Not resolved yet; callers must not redirect on this.
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Registration form, mirroring the register endpoint body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub repeat_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    access_token: Option<String>,
    user: Option<IdentityPayload>,
}

#[derive(Debug, Clone)]
struct View {
    state: AuthState,
    user: Option<IdentityPayload>,
}

/// How a completed refresh ended, as seen by callers that waited on it.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    Failed,
}

/// Outcome of the most recent refresh.
#[derive(Debug, Default)]
struct RefreshSlot {
    last: Option<RefreshOutcome>,
}

/// Client-side session orchestration over one cookie jar.
pub struct SessionManager {
    http: Client,
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    view: RwLock<View>,
    refresh_slot: Mutex<RefreshSlot>,
    /// Bumped (under `refresh_slot`) each time a refresh completes.
    refresh_generation: AtomicU64,
}

/// Whether `token` is unreadable or its `exp` is at or before now.
fn token_expired(token: &str) -> bool {
    peek_claims(token).is_none_or(|claims| claims.is_expired_at(Utc::now().timestamp()))
}

impl SessionManager {
    /// Build a manager with its own cookie jar.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            store,
            view: RwLock::new(View {
                state: AuthState::Unknown,
                user: None,
            }),
            refresh_slot: Mutex::new(RefreshSlot::default()),
            refresh_generation: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> AuthState {
        self.view.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// `None` while the state is still unknown.
    pub fn is_authenticated(&self) -> Option<bool> {
        match self.state() {
            AuthState::Unknown => None,
            AuthState::Authenticated => Some(true),
            AuthState::Unauthenticated => Some(false),
        }
    }

    /// The cached user decoded from the current access token.
    pub fn user(&self) -> Option<IdentityPayload> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    fn set_view(&self, state: AuthState, user: Option<IdentityPayload>) {
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = View { state, user };
    }

    /// Store `token` and derive the user view from it.
    fn adopt(&self, token: &str) -> ClientResult<IdentityPayload> {
        let claims = peek_claims(token).ok_or(ClientError::NotAuthenticated)?;
        self.store.save(token)?;
        self.set_view(AuthState::Authenticated, Some(claims.user.clone()));
        Ok(claims.user)
    }

    fn drop_local_session(&self) {
        if let Err(e) = self.store.clear() {
            warn!("could not clear token store: {e}");
        }
        self.set_view(AuthState::Unauthenticated, None);
    }

    /// Resolve the unknown state on startup.
    ///
    /// A live token is decoded locally with no network call; an expired one
    /// gets one silent refresh; no token means unauthenticated immediately.
    pub async fn initialize(&self) -> AuthState {
        let seen = self.refresh_generation.load(Ordering::SeqCst);
        match self.store.load() {
            None => {
                debug!("no stored token");
                self.set_view(AuthState::Unauthenticated, None);
            }
            Some(token) if !token_expired(&token) => {
                if self.adopt(&token).is_err() {
                    self.drop_local_session();
                }
            }
            Some(_) => {
                debug!("stored token expired, refreshing");
                // Failure already moved the view to unauthenticated.
                let _ = self.refresh_after(seen).await;
            }
        }
        self.state()
    }

    /// Refresh now, regardless of the current token's expiry.
    pub async fn refresh(&self) -> ClientResult<String> {
        let seen = self.refresh_generation.load(Ordering::SeqCst);
        self.refresh_after(seen).await
    }

    /// Single-flight refresh. `seen` is the generation the caller observed
    /// before deciding its token was stale; if a refresh completed since, its
    /// outcome is reused.
    async fn refresh_after(&self, seen: u64) -> ClientResult<String> {
        let mut slot = self.refresh_slot.lock().await;

        if self.refresh_generation.load(Ordering::SeqCst) != seen
            && let Some(outcome) = &slot.last
        {
            debug!("reusing result of concurrent refresh");
            return match outcome {
                RefreshOutcome::Refreshed(token) => Ok(token.clone()),
                RefreshOutcome::Failed => Err(ClientError::NotAuthenticated),
            };
        }

        let outcome = self.request_refresh().await;
        slot.last = Some(match &outcome {
            Ok(token) => RefreshOutcome::Refreshed(token.clone()),
            Err(_) => RefreshOutcome::Failed,
        });
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Ok(token) => Ok(token),
            Err(e) => {
                info!("silent refresh failed, logging out: {e}");
                self.logout().await;
                Err(ClientError::NotAuthenticated)
            }
        }
    }

    async fn request_refresh(&self) -> ClientResult<String> {
        let resp = self
            .http
            .post(self.config.endpoint(REFRESH_PATH)?)
            .send()
            .await?;
        let status = resp.status();
        let body: AuthBody = resp.json().await?;

        match body.access_token {
            Some(token) if status.is_success() && body.success => {
                self.adopt(&token)?;
                debug!("access token refreshed");
                Ok(token)
            }
            _ => Err(ClientError::Rejected {
                status: status.as_u16(),
                message: body.message,
            }),
        }
    }

    /// A token that is not expired by the local clock, refreshing if needed.
    async fn valid_access_token(&self) -> ClientResult<String> {
        let seen = self.refresh_generation.load(Ordering::SeqCst);
        match self.store.load() {
            None => {
                self.set_view(AuthState::Unauthenticated, None);
                Err(ClientError::NotAuthenticated)
            }
            Some(token) if !token_expired(&token) => Ok(token),
            Some(_) => self.refresh_after(seen).await,
        }
    }

    /// Send an authenticated request to `path`.
    ///
    /// An expired token is refreshed once before sending; if that fails the
    /// session is logged out and `NotAuthenticated` is returned without
    /// sending. A 401 from the server also logs out, and the response is
    /// returned to the caller.
    pub async fn fetch_with_auth(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ClientResult<Response> {
        let url = self.config.endpoint(path)?;
        let token = self.valid_access_token().await?;

        let mut request = self.http.request(method, url).bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(%path, "server rejected access token, logging out");
            self.logout().await;
        }
        Ok(resp)
    }

    /// Log in and start a session. A rejected login leaves the session
    /// unauthenticated.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<IdentityPayload> {
        let resp = self
            .http
            .post(self.config.endpoint(LOGIN_PATH)?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        let body: AuthBody = resp.json().await?;

        match body.access_token {
            Some(token) if status.is_success() && body.success => {
                let user = self.adopt(&token)?;
                info!(user_id = %user.id, "logged in");
                Ok(user)
            }
            _ => {
                self.drop_local_session();
                Err(ClientError::Rejected {
                    status: status.as_u16(),
                    message: body.message,
                })
            }
        }
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, form: &RegisterForm) -> ClientResult<IdentityPayload> {
        let resp = self
            .http
            .post(self.config.endpoint(REGISTER_PATH)?)
            .json(form)
            .send()
            .await?;
        let status = resp.status();
        let body: AuthBody = resp.json().await?;

        match body.user {
            Some(user) if status.is_success() && body.success => Ok(user),
            _ => Err(ClientError::Rejected {
                status: status.as_u16(),
                message: body.message,
            }),
        }
    }

    /// The current user as the server sees it.
    pub async fn current_user(&self) -> ClientResult<IdentityPayload> {
        let resp = self.fetch_with_auth(Method::GET, ME_PATH, None).await?;
        let status = resp.status();
        let body: AuthBody = resp.json().await?;
        match body.user {
            Some(user) if status.is_success() && body.success => Ok(user),
            _ => Err(ClientError::Rejected {
                status: status.as_u16(),
                message: body.message,
            }),
        }
    }

    /// End the session. Local state is always cleared; the server call that
    /// clears the refresh cookie is best-effort.
    pub async fn logout(&self) {
        self.drop_local_session();

        let url = match self.config.endpoint(LOGOUT_PATH) {
            Ok(url) => url,
            Err(e) => {
                warn!("logout endpoint unavailable: {e}");
                return;
            }
        };
        match self.http.post(url).send().await {
            Ok(resp) => debug!(status = %resp.status(), "logout acknowledged"),
            Err(e) => warn!("logout request failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use aio_core::auth::jwt::TokenIssuer;
    use chrono::Duration;

    use super::*;
    use crate::store::MemoryTokenStore;

    /// Nothing listens on the discard port.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn identity() -> IdentityPayload {
        IdentityPayload {
            id: "u-9".into(),
            name: "Eka".into(),
            email: "eka@example.com".into(),
            role: "user".into(),
            avatar: None,
            phone: None,
            points: Some(5),
            referral_code: None,
        }
    }

    fn token(ttl: Duration) -> String {
        TokenIssuer::new(b"a", b"r")
            .with_ttls(ttl, Duration::days(1))
            .generate_tokens(&identity())
            .unwrap()
            .access_token
    }

    fn manager(store: Arc<MemoryTokenStore>) -> SessionManager {
        let config = ClientConfig::new(UNREACHABLE)
            .unwrap()
            .with_timeout(std::time::Duration::from_secs(2));
        SessionManager::new(config, store).unwrap()
    }

    #[test]
    fn expiry_check_reads_exp() {
        assert!(!token_expired(&token(Duration::minutes(5))));
        assert!(token_expired(&token(Duration::seconds(-1))));
        assert!(token_expired("garbage"));
    }

    #[tokio::test]
    async fn starts_unknown() {
        let session = manager(Arc::new(MemoryTokenStore::new()));
        assert_eq!(session.state(), AuthState::Unknown);
        assert_eq!(session.is_authenticated(), None);
    }

    #[tokio::test]
    async fn initialize_without_token_is_unauthenticated() {
        let session = manager(Arc::new(MemoryTokenStore::new()));
        assert_eq!(session.initialize().await, AuthState::Unauthenticated);
        assert_eq!(session.is_authenticated(), Some(false));
    }

    #[tokio::test]
    async fn initialize_with_live_token_decodes_user_locally() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save(&token(Duration::minutes(5))).unwrap();
        let session = manager(store);

        assert_eq!(session.initialize().await, AuthState::Authenticated);
        assert_eq!(session.user(), Some(identity()));
    }

    #[tokio::test]
    async fn initialize_with_expired_token_and_no_server_logs_out() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save(&token(Duration::seconds(-1))).unwrap();
        let session = manager(store.clone());

        assert_eq!(session.initialize().await, AuthState::Unauthenticated);
        assert!(store.load().is_none());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn fetch_without_token_is_not_authenticated() {
        let session = manager(Arc::new(MemoryTokenStore::new()));
        let err = session
            .fetch_with_auth(Method::GET, "/api/auth/me", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn fetch_refuses_foreign_origin() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save(&token(Duration::minutes(5))).unwrap();
        let session = manager(store.clone());

        for path in ["http://evil.example/steal", "//evil.example/steal"] {
            let err = session
                .fetch_with_auth(Method::GET, path, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ClientError::ForeignOrigin(_)));
        }
        assert!(store.load().is_some());
    }

    #[tokio::test]
    async fn logout_succeeds_when_server_is_unreachable() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save(&token(Duration::minutes(5))).unwrap();
        let session = manager(store.clone());
        session.initialize().await;

        session.logout().await;
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(store.load().is_none());
    }
}
