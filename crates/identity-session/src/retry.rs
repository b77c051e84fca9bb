//! Fixed-delay retry for transient failures
//!
//! `retry` runs an async operation up to `attempts` times, sleeping a fixed
//! delay between attempts and returning the last error once attempts run
//! out. `send_with_retry` applies it to pipeline requests: only idempotent
//! requests are retried, and only for transient failures. Authorization
//! failures are already handled once by the pipeline and are never retried
//! here.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::classify::{ErrorClassification, classify_error};
use crate::error::{Error, Result};
use crate::pipeline::ApiClient;
use crate::transport::{ApiRequest, ApiResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: identity_auth::DEFAULT_MAX_PROBE_RETRIES,
            delay: Duration::from_millis(identity_auth::DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or
/// attempts are exhausted. `on_retry` is called with the error and the
/// zero-based attempt number before each delay.
pub async fn retry<T, E, F, Fut>(
    options: RetryOptions,
    mut op: F,
    mut should_retry: impl FnMut(&E) -> bool,
    mut on_retry: impl FnMut(&E, u32),
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let attempts = options.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && should_retry(&err) => {
                on_retry(&err, attempt);
                tokio::time::sleep(options.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Send through the pipeline, retrying idempotent requests on transient
/// failures.
pub async fn send_with_retry(
    client: &ApiClient,
    request: ApiRequest,
    options: RetryOptions,
) -> Result<ApiResponse> {
    let options = if request.is_idempotent() {
        options
    } else {
        RetryOptions {
            attempts: 1,
            ..options
        }
    };

    let pending = &request;
    retry(
        options,
        move || client.send(pending.clone()),
        |err: &Error| classify_error(err) == ErrorClassification::Transient,
        |err, attempt| {
            debug!(
                request_id = %request.request_id,
                path = %request.path,
                attempt,
                error = %err,
                "transient failure, retrying"
            );
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshCoordinator;
    use crate::test_support::{ScriptedTransport, json_ok, status};
    use identity_auth::{MemoryStorage, TokenStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn options(attempts: u32) -> RetryOptions {
        RetryOptions {
            attempts,
            delay: Duration::from_millis(1000),
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> ApiClient {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        let coordinator = Arc::new(RefreshCoordinator::new(tokens, transport.clone()));
        ApiClient::authenticated(coordinator, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: std::result::Result<u32, &str> = retry(
            options(5),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("flaky") } else { Ok(n) }
            },
            |_| true,
            |_, _| {},
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_last_error() {
        let mut retried = vec![];
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let started = tokio::time::Instant::now();
        let result: std::result::Result<(), String> = retry(
            options(3),
            move || async move { Err(format!("failure {}", calls.fetch_add(1, Ordering::SeqCst))) },
            |_| true,
            |_, attempt| retried.push(attempt),
        )
        .await;
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(retried, vec![0, 1]);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let _: std::result::Result<(), ()> = retry(
            options(0),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(())
            },
            |_| true,
            |_, _| {},
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_get_is_retried() {
        let transport = Arc::new(ScriptedTransport::new({
            let calls = AtomicU32::new(0);
            move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    status(502, "")
                } else {
                    json_ok(serde_json::json!({ "region": "eu" }))
                }
            }
        }));
        let client = client(transport.clone());

        send_with_retry(&client, ApiRequest::get("/appsettings"), options(5))
            .await
            .unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn post_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(502, "")));
        let client = client(transport.clone());

        let err = send_with_retry(&client, ApiRequest::post("/identity/logout"), options(5))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbuildable_request_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Err(Error::InvalidRequest("invalid bearer credential".into()))
        }));
        let client = client(transport.clone());

        send_with_retry(&client, ApiRequest::get("/appsettings"), options(5))
            .await
            .unwrap_err();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(403, "")));
        let client = client(transport.clone());

        send_with_retry(&client, ApiRequest::get("/weatherforecast"), options(5))
            .await
            .unwrap_err();
        assert_eq!(transport.call_count(), 1);
    }
}
