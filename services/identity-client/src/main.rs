//! Identity API client
//!
//! Single-binary CLI that:
//! 1. Loads configuration and the remembered session from disk
//! 2. Executes one account or application command; `status` runs the
//!    session check (refresh, then probe with retries)
//! 3. Login, register and logout re-check the session themselves
//! 4. Prints the result envelope as JSON (and metrics with `--metrics`)

mod cli;
mod config;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_auth::FileStorage;
use identity_session::SessionManager;

use crate::cli::{Cli, Command, print_outcome, session_outcome};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr; stdout carries the result envelope.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse(&args)?;

    // Install before the session is built so its counters are captured
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        storage_path = %config.session.storage_path.display(),
        command = cli.command.name(),
        "configuration loaded"
    );

    let success = run(cli.command, &config).await?;
    metrics::record_command(cli.command.name(), success);

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Build the session, run one command, print its envelope.
async fn run(command: Command, config: &Config) -> Result<bool> {
    let storage = FileStorage::open(config.session.storage_path.clone()).with_context(|| {
        format!(
            "failed to open session storage {}",
            config.session.storage_path.display()
        )
    })?;
    info!(path = %storage.path().display(), "session storage opened");
    let manager = SessionManager::new(&config.session_config(), Arc::new(storage));

    // Login, register and logout run their own session check afterwards;
    // settings and weather refresh lazily through the pipeline.
    let identity = manager.identity();
    match command {
        Command::Status => {
            let state = manager.start().await;
            info!(state = state.label(), "session check complete");
            print_outcome(&session_outcome(&state))
        }
        Command::Login { remember } => {
            let (email, password) = account(config)?;
            print_outcome(&identity.login(email, password, remember).await)
        }
        Command::Register => {
            let (email, password) = account(config)?;
            print_outcome(&identity.register(email, password).await)
        }
        Command::Logout => print_outcome(&identity.logout().await),
        Command::Settings => print_outcome(&identity.app_settings().await),
        Command::Weather => print_outcome(&identity.weather_forecast().await),
    }
}

fn account(config: &Config) -> Result<(&str, &str)> {
    let account = config
        .account
        .as_ref()
        .context("[account] section is required for this command")?;
    let password = account
        .password
        .as_ref()
        .context("no password: set IDENTITY_PASSWORD or account.password_file")?;
    Ok((account.email.as_str(), password.expose().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use common::Secret;
    use identity_auth::{DurableStorage, REFRESH_TOKEN_KEY};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Identity server accepting `user@example.com` / `hunter2`. Also returns
    /// the number of user-info requests it has answered.
    async fn start_identity_server() -> (String, tokio::task::JoinHandle<()>, Arc<AtomicU32>) {
        let user_calls = Arc::new(AtomicU32::new(0));
        let counter = user_calls.clone();
        let app = Router::new()
            .route(
                "/api/identity/login",
                post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                    if body["password"] == "hunter2" {
                        Ok(axum::Json(json!({ "accessToken": "at_1", "refreshToken": "rt_1" })))
                    } else {
                        Err((
                            StatusCode::BAD_REQUEST,
                            axum::Json(json!({ "title": "Invalid credentials" })),
                        ))
                    }
                }),
            )
            .route(
                "/api/identity/refresh",
                post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                    if body["refreshToken"] == "rt_1" {
                        Ok(axum::Json(json!({ "accessToken": "at_2", "refreshToken": "rt_2" })))
                    } else {
                        Err(StatusCode::UNAUTHORIZED)
                    }
                }),
            )
            .route("/api/identity/logout", post(|| async { StatusCode::OK }))
            .route(
                "/api/identity/user",
                get(move |headers: HeaderMap| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                            Some("Bearer at_1" | "Bearer at_2") => {
                                Ok(axum::Json(json!({ "email": "user@example.com" })))
                            }
                            _ => Err(StatusCode::UNAUTHORIZED),
                        }
                    }
                }),
            )
            .route(
                "/api/appsettings",
                get(|| async { axum::Json(json!({ "region": "eu", "regions": { "eu": "Europe" } })) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api"), handle, user_calls)
    }

    fn test_config(base_url: &str, dir: &tempfile::TempDir, password: Option<&str>) -> Config {
        let toml = format!(
            r#"
[api]
base_url = "{base_url}"

[session]
storage_path = "{}"
retry_delay_ms = 1

[account]
email = "user@example.com"
"#,
            dir.path().join("session.json").display()
        );
        let mut config: Config = toml::from_str(&toml).unwrap();
        if let Some(account) = config.account.as_mut() {
            account.password = password.map(Secret::from);
        }
        config
    }

    #[tokio::test]
    async fn status_without_session_fails() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, None);

        assert!(!run(Command::Status, &config).await.unwrap());
        assert!(
            !dir.path().join("session.json").exists(),
            "cold start must not create the session file"
        );
    }

    #[tokio::test]
    async fn remembered_login_survives_restart() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, Some("hunter2"));

        assert!(run(Command::Login { remember: true }, &config).await.unwrap());
        let storage = FileStorage::open(config.session.storage_path.clone()).unwrap();
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("rt_1"));

        // New process: only the refresh credential is on disk
        assert!(run(Command::Status, &config).await.unwrap());
        let storage = FileStorage::open(config.session.storage_path.clone()).unwrap();
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("rt_2"),
            "rotated refresh credential must replace the persisted one"
        );
    }

    #[tokio::test]
    async fn login_skips_the_startup_check() {
        let (url, _server, user_calls) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, Some("hunter2"));

        assert!(run(Command::Login { remember: false }, &config).await.unwrap());
        assert_eq!(
            user_calls.load(Ordering::SeqCst),
            1,
            "only the check that follows the login should hit the user endpoint"
        );
    }

    #[tokio::test]
    async fn logout_forgets_remembered_session() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, Some("hunter2"));

        run(Command::Login { remember: true }, &config).await.unwrap();
        assert!(run(Command::Logout, &config).await.unwrap());

        let storage = FileStorage::open(config.session.storage_path.clone()).unwrap();
        assert!(storage.get(REFRESH_TOKEN_KEY).unwrap().is_none());
        assert!(!run(Command::Status, &config).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_password_fails_without_persisting() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, Some("wrong"));

        assert!(!run(Command::Login { remember: true }, &config).await.unwrap());
        let storage = FileStorage::open(config.session.storage_path.clone()).unwrap();
        assert!(storage.get(REFRESH_TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn login_without_password_is_an_error() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, None);

        let err = run(Command::Login { remember: false }, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("IDENTITY_PASSWORD"));
    }

    #[tokio::test]
    async fn settings_are_public() {
        let (url, _server, _) = start_identity_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&url, &dir, None);

        assert!(run(Command::Settings, &config).await.unwrap());
    }
}
