//! Outbound request model and the terminal HTTP stage
//!
//! `ApiRequest` is a self-contained description of a call (method, path,
//! JSON body, headers, flags) so the pipeline can clone it and re-issue it
//! after a credential refresh. The `Transport` trait is the last stage of
//! the middleware chain; `HttpTransport` executes requests with reqwest.
//!
//! Like axios, a non-2xx response is an error (`Error::Status`) rather than
//! a response, so the 401 handling in the pipeline only inspects errors.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use identity_auth::Credential;

use crate::error::{Error, Result};

/// Boxed future used at dyn-compatible seams (`Arc<dyn Transport>`,
/// `Arc<dyn Middleware>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request issued through the session pipeline.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/identity/user`
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    /// Intentionally unauthenticated call (login, refresh, ...): no bearer
    /// header is attached and a 401 is returned to the caller untouched.
    pub skip_auth_retry: bool,
    /// Set on the re-issued copy after a refresh so a second 401 is final.
    pub retried: bool,
    /// Correlation id for logs
    pub request_id: String,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            skip_auth_retry: false,
            retried: false,
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::InvalidRequest(format!("serializing body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Mark the request as bypassing credential attachment and 401 retry.
    pub fn skip_auth_retry(mut self) -> Self {
        self.skip_auth_retry = true;
        self
    }

    /// Set `Authorization: Bearer <credential>`, marked sensitive so it is
    /// never printed by header debug output.
    pub fn set_bearer(&mut self, credential: &Credential) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|e| Error::InvalidRequest(format!("invalid bearer credential: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Current `Authorization` header value, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether repeating this request cannot change server state twice.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
        )
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Terminal stage of the pipeline: puts a request on the wire.
pub trait Transport: Send + Sync {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<ApiResponse>>;
}

/// reqwest-backed transport against a fixed API base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            let url = self.url(&request.path);
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Http(format!("{} {}: {e}", request.method, request.path))
                }
            })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Error::Http(format!("reading response body: {e}")))?;

            debug!(
                request_id = %request.request_id,
                method = %request.method,
                path = %request.path,
                status = status.as_u16(),
                "request completed"
            );

            if !status.is_success() {
                return Err(Error::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(ApiResponse {
                status: status.as_u16(),
                body,
            })
        })
    }
}
