//! In-memory transport for deterministic unit tests

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{ApiRequest, ApiResponse, BoxFuture, Transport};

type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync;

/// Transport that answers every request with a closure and records what it
/// was sent. Optional delays are applied before answering, which keeps a
/// refresh in flight long enough for concurrent callers to pile up.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    /// `(path, delay)`; a `None` path matches every request
    delays: Vec<(Option<String>, Duration)>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delays: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Delay every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delays.push((None, delay));
        self
    }

    /// Delay responses to one path only.
    pub fn with_delay_on(mut self, path: &str, delay: Duration) -> Self {
        self.delays.push((Some(path.to_string()), delay));
        self
    }

    fn delay_for(&self, request: &ApiRequest) -> Option<Duration> {
        self.delays
            .iter()
            .find(|(path, _)| path.as_deref().is_none_or(|p| p == request.path))
            .map(|(_, delay)| *delay)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for ScriptedTransport {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            if let Some(delay) = self.delay_for(request) {
                tokio::time::sleep(delay).await;
            }
            (self.handler)(request)
        })
    }
}

pub fn json_ok(body: serde_json::Value) -> Result<ApiResponse> {
    Ok(ApiResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status(code: u16, body: &str) -> Result<ApiResponse> {
    Err(Error::Status {
        status: code,
        body: body.to_string(),
    })
}
