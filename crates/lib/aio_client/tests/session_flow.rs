//! Session manager against a live server over a loopback socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aio_api::AppState;
use aio_api::config::ApiConfig;
use aio_client::{AuthState, ClientConfig, ClientError, MemoryTokenStore, SessionManager, TokenStore};
use aio_core::auth::jwt::TokenIssuer;
use aio_core::auth::password::hash_password;
use aio_core::models::auth::{DEFAULT_ROLE, IdentityPayload, NewUser};
use aio_core::store::{MemoryUserStore, UserStore};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Duration;
use reqwest::{Method, StatusCode};

const EMAIL: &str = "sari@example.com";
const PASSWORD: &str = "rahasia123";

struct Server {
    base_url: String,
    refreshes: Arc<AtomicUsize>,
    config: ApiConfig,
}

async fn count_refreshes(
    State(counter): State<Arc<AtomicUsize>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/auth/refresh" {
        counter.fetch_add(1, Ordering::SeqCst);
    }
    next.run(req).await
}

impl Server {
    async fn start() -> Self {
        let store = Arc::new(MemoryUserStore::new());
        store
            .create(NewUser {
                name: "Sari".into(),
                email: EMAIL.into(),
                password_hash: hash_password(PASSWORD).unwrap(),
                fingerprint: None,
                role: DEFAULT_ROLE.into(),
            })
            .await
            .unwrap();

        let config = ApiConfig::for_testing();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let app = aio_api::router(AppState::new(store, config.clone())).layer(
            axum::middleware::from_fn_with_state(refreshes.clone(), count_refreshes),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            refreshes,
            config,
        }
    }

    fn session(&self, store: Arc<MemoryTokenStore>) -> SessionManager {
        SessionManager::new(ClientConfig::new(&self.base_url).unwrap(), store).unwrap()
    }

    fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// An access token for `user` that expired one second ago, signed with
    /// the server's secret.
    fn expired_token(&self, user: &IdentityPayload) -> String {
        self.config
            .token_issuer()
            .with_ttls(Duration::seconds(-1), self.config.refresh_ttl())
            .generate_tokens(user)
            .unwrap()
            .access_token
    }
}

#[tokio::test]
async fn login_then_me() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());

    let user = session.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.email, EMAIL);
    assert_eq!(session.state(), AuthState::Authenticated);
    assert!(store.load().is_some());

    let me = session.current_user().await.unwrap();
    assert_eq!(me.id, user.id);
    assert_eq!(server.refresh_count(), 0);
}

#[tokio::test]
async fn wrong_password_is_rejected_and_unauthenticated() {
    let server = Server::start().await;
    let session = server.session(Arc::new(MemoryTokenStore::new()));

    let err = session.login(EMAIL, "salah-sekali").await.unwrap_err();
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Email atau kata sandi salah.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn expired_token_refreshes_once_before_request() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());
    let user = session.login(EMAIL, PASSWORD).await.unwrap();

    let stale = server.expired_token(&user);
    store.save(&stale).unwrap();

    let resp = session
        .fetch_with_auth(Method::GET, "/api/auth/me", None)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.refresh_count(), 1);

    let fresh = store.load().unwrap();
    assert_ne!(fresh, stale);
    assert_eq!(session.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = Arc::new(server.session(store.clone()));
    let user = session.login(EMAIL, PASSWORD).await.unwrap();
    store.save(&server.expired_token(&user)).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .fetch_with_auth(Method::GET, "/api/auth/me", None)
                    .await
                    .map(|resp| resp.status())
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), StatusCode::OK);
    }
    assert_eq!(server.refresh_count(), 1);
}

#[tokio::test]
async fn failed_refresh_logs_out_without_sending() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    // Token from a login on another client: this jar has no refresh cookie.
    let other = server.session(Arc::new(MemoryTokenStore::new()));
    let user = other.login(EMAIL, PASSWORD).await.unwrap();
    store.save(&server.expired_token(&user)).unwrap();

    let session = server.session(store.clone());
    let err = session
        .fetch_with_auth(Method::GET, "/api/auth/me", None)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NotAuthenticated));
    assert_eq!(session.state(), AuthState::Unauthenticated);
    assert!(store.load().is_none());
    assert_eq!(server.refresh_count(), 1);
}

#[tokio::test]
async fn server_401_logs_out_and_returns_response() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());
    let user = session.login(EMAIL, PASSWORD).await.unwrap();

    // Unexpired by the local clock, but signed with a key the server rejects.
    let forged = TokenIssuer::new(b"not-the-secret", b"nor-this")
        .generate_tokens(&user)
        .unwrap()
        .access_token;
    store.save(&forged).unwrap();

    let resp = session
        .fetch_with_auth(Method::GET, "/api/auth/me", None)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(session.state(), AuthState::Unauthenticated);
    assert!(store.load().is_none());
    assert_eq!(server.refresh_count(), 0);
}

#[tokio::test]
async fn initialize_with_expired_token_recovers_via_cookie() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());
    let user = session.login(EMAIL, PASSWORD).await.unwrap();
    store.save(&server.expired_token(&user)).unwrap();

    assert_eq!(session.initialize().await, AuthState::Authenticated);
    assert_eq!(session.user().map(|u| u.id), Some(user.id));
    assert_eq!(server.refresh_count(), 1);
}

#[tokio::test]
async fn logout_invalidates_refresh_cookie() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());
    session.login(EMAIL, PASSWORD).await.unwrap();

    session.logout().await;
    assert_eq!(session.state(), AuthState::Unauthenticated);
    assert!(store.load().is_none());

    let err = session.refresh().await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
}

#[tokio::test]
async fn register_does_not_start_a_session() {
    let server = Server::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = server.session(store.clone());

    let user = session
        .register(&aio_client::RegisterForm {
            name: "Budi".into(),
            email: "budi@example.com".into(),
            password: "kata-sandi-1".into(),
            repeat_password: "kata-sandi-1".into(),
            fingerprint: None,
        })
        .await
        .unwrap();

    assert_eq!(user.email, "budi@example.com");
    assert!(user.referral_code.is_some());
    assert!(store.load().is_none());
}
