//! Session manager: builds and owns every session component
//!
//! ```text
//! SessionManager
//!   ├── TokenStore            (Arc, shared)
//!   ├── HttpTransport         (terminal stage)
//!   ├── RefreshCoordinator    (raw transport, never the pipeline)
//!   ├── ApiClient             (RefreshOnUnauthorized -> BearerAuth -> transport)
//!   ├── SessionBootstrapper
//!   └── IdentityService
//! ```
//!
//! Each component is constructed once. Dropping the manager drops them all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use identity_auth::{DEFAULT_MAX_PROBE_RETRIES, DEFAULT_RETRY_DELAY_MS, DurableStorage, TokenStore};

use crate::bootstrap::{ProbePolicy, SessionBootstrapper, SessionState};
use crate::identity::IdentityService;
use crate::pipeline::ApiClient;
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryOptions;
use crate::transport::{HttpTransport, Transport};

/// Connection and retry settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API base URL, e.g. `https://localhost:7016/api`
    pub base_url: String,
    pub timeout: Duration,
    /// Probe attempts during a session check; also used for retried GETs
    pub max_probe_retries: u32,
    pub retry_delay: Duration,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            max_probe_retries: DEFAULT_MAX_PROBE_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            max_attempts: self.max_probe_retries,
            retry_delay: self.retry_delay,
        }
    }

    fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            attempts: self.max_probe_retries,
            delay: self.retry_delay,
        }
    }
}

/// Owner of one client session.
pub struct SessionManager {
    tokens: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    client: Arc<ApiClient>,
    session: Arc<SessionBootstrapper>,
    identity: IdentityService,
}

impl SessionManager {
    /// Build a session talking HTTP to `config.base_url`.
    pub fn new(config: &SessionConfig, storage: Arc<dyn DurableStorage>) -> Self {
        let transport = Arc::new(HttpTransport::new(
            reqwest::Client::new(),
            config.base_url.clone(),
            config.timeout,
        ));
        Self::with_transport(config, storage, transport)
    }

    /// Build a session over any terminal transport.
    pub fn with_transport(
        config: &SessionConfig,
        storage: Arc<dyn DurableStorage>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(storage));
        let coordinator = Arc::new(RefreshCoordinator::new(tokens.clone(), transport.clone()));
        let client = Arc::new(ApiClient::authenticated(coordinator.clone(), transport));
        let session = Arc::new(SessionBootstrapper::new(
            client.clone(),
            coordinator.clone(),
            config.probe_policy(),
        ));
        let identity = IdentityService::new(
            client.clone(),
            tokens.clone(),
            session.clone(),
            config.retry_options(),
        );
        Self {
            tokens,
            coordinator,
            client,
            session,
            identity,
        }
    }

    /// Run the startup session check.
    pub async fn start(&self) -> SessionState {
        self.session.determine_session().await
    }

    pub fn state(&self) -> SessionState {
        self.session.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, json_ok, status};
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use identity_auth::{FileStorage, MemoryStorage, REFRESH_PATH, USER_PATH};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn shared_components_are_built_once() {
        let manager = SessionManager::with_transport(
            &SessionConfig::new("http://unused"),
            Arc::new(MemoryStorage::new()),
            Arc::new(ScriptedTransport::new(|_| status(401, ""))),
        );
        assert!(Arc::ptr_eq(manager.coordinator().tokens(), manager.tokens()));
        assert_eq!(manager.state(), SessionState::Unknown);

        let state = manager.start().await;
        assert_eq!(state.is_authenticated(), Some(false));
        assert_eq!(manager.state(), state);
    }

    #[tokio::test]
    async fn probe_uses_configured_attempts() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(502, "")));
        let mut config = SessionConfig::new("http://unused");
        config.max_probe_retries = 2;
        config.retry_delay = Duration::from_millis(1);
        let manager =
            SessionManager::with_transport(&config, Arc::new(MemoryStorage::new()), transport.clone());

        manager.start().await;
        assert_eq!(transport.calls_to(USER_PATH), 2);
    }

    #[tokio::test]
    async fn remembered_session_survives_restart_over_http() {
        let refreshes = Arc::new(AtomicU32::new(0));
        let counter = refreshes.clone();
        let app = Router::new()
            .route(
                "/api/identity/login",
                post(|| async { axum::Json(json!({ "accessToken": "at_1", "refreshToken": "rt_1" })) }),
            )
            .route(
                "/api/identity/refresh",
                post(move |axum::Json(body): axum::Json<serde_json::Value>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if body["refreshToken"] == "rt_1" {
                            Ok(axum::Json(json!({ "accessToken": "at_2" })))
                        } else {
                            Err(StatusCode::UNAUTHORIZED)
                        }
                    }
                }),
            )
            .route(
                "/api/identity/user",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer at_1" | "Bearer at_2") => {
                            Ok(axum::Json(json!({ "email": "a@example.com" })))
                        }
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = SessionConfig::new(format!("http://{addr}/api"));

        {
            let manager = SessionManager::new(&config, Arc::new(FileStorage::open(path.clone()).unwrap()));
            let login = manager.identity().login("a@example.com", "hunter2", true).await;
            assert!(login.success);
            assert_eq!(manager.state().is_authenticated(), Some(true));
        }

        let restarted = SessionManager::new(&config, Arc::new(FileStorage::open(path).unwrap()));
        assert!(!restarted.tokens().has_access_token());
        assert!(restarted.tokens().has_refresh_token());

        let state = restarted.start().await;
        assert_eq!(
            state.profile().and_then(|p| p.email.as_deref()),
            Some("a@example.com")
        );
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_server_exhausts_probe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = SessionConfig::new(format!("http://{addr}/api"));
        config.retry_delay = Duration::from_millis(1);
        let manager = SessionManager::new(&config, Arc::new(MemoryStorage::new()));

        let state = manager.start().await;
        let SessionState::Unauthenticated(reason) = state else {
            panic!("expected unauthenticated, got {state:?}");
        };
        assert_eq!(
            reason.messages(),
            vec![
                identity_auth::MAX_RETRIES_MESSAGE,
                identity_auth::UNEXPECTED_ERROR_MESSAGE
            ]
        );
    }

    #[tokio::test]
    async fn refresh_path_is_relative_to_base_url() {
        let transport = Arc::new(ScriptedTransport::new(|r| {
            if r.path == REFRESH_PATH {
                json_ok(json!({ "accessToken": "at_2" }))
            } else {
                json_ok(json!({ "email": "a@example.com" }))
            }
        }));
        let storage = MemoryStorage::new();
        identity_auth::DurableStorage::set(&storage, identity_auth::REFRESH_TOKEN_KEY, "rt_1")
            .unwrap();
        let manager = SessionManager::with_transport(
            &SessionConfig::new("http://unused"),
            Arc::new(storage),
            transport.clone(),
        );

        assert_eq!(manager.start().await.is_authenticated(), Some(true));
        assert_eq!(transport.requests()[0].path, REFRESH_PATH);
    }
}
