//! Authenticated request pipeline
//!
//! An explicit middleware chain fixed when the client is built. Each stage
//! sees the request and a `Next` handle to the rest of the chain, and the
//! chain ends in a `Transport`. The default chain is:
//!
//! ```text
//! RefreshOnUnauthorized -> BearerAuth -> Transport
//! ```
//!
//! `BearerAuth` attaches the access credential (waiting for a refresh when
//! only a refresh credential is held). `RefreshOnUnauthorized` sits outside
//! it so that a request re-issued after a refresh passes through
//! `BearerAuth` again and picks up the new credential.
//!
//! Requests flagged `skip_auth_retry` pass through both stages untouched.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::Result;
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, BoxFuture, Transport};

/// One stage of the request pipeline.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, request: ApiRequest, next: Next<'a>)
    -> BoxFuture<'a, Result<ApiResponse>>;
}

/// The remainder of the chain after the current stage. `Copy`, so a stage
/// can run the rest of the chain more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn run(self, request: ApiRequest) -> BoxFuture<'a, Result<ApiResponse>> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(
                request,
                Next {
                    stages: rest,
                    transport: self.transport,
                },
            ),
            None => {
                let transport = self.transport;
                Box::pin(async move { transport.execute(&request).await })
            }
        }
    }
}

/// Outbound stage: sets `Authorization: Bearer <access>`.
pub struct BearerAuth {
    coordinator: Arc<RefreshCoordinator>,
}

impl BearerAuth {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Middleware for BearerAuth {
    fn handle<'a>(
        &'a self,
        mut request: ApiRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            if !request.skip_auth_retry {
                if let Some(access) = self.coordinator.valid_access_token().await {
                    request.set_bearer(&access)?;
                } else {
                    debug!(request_id = %request.request_id, "no credential available, sending unauthenticated");
                }
            }
            next.run(request).await
        })
    }
}

/// Inbound stage: on 401, refresh once and re-issue the request.
///
/// A request that gets a 401 while a refresh is in flight waits for that
/// refresh instead of starting another. If the credential was already
/// replaced since this request was sent, it is re-issued straight away.
/// The re-issued copy is flagged `retried`, so a second 401 is returned to
/// the caller. When the refresh fails, the original 401 is returned.
pub struct RefreshOnUnauthorized {
    coordinator: Arc<RefreshCoordinator>,
}

impl RefreshOnUnauthorized {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Middleware for RefreshOnUnauthorized {
    fn handle<'a>(
        &'a self,
        request: ApiRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            if request.skip_auth_retry || request.retried {
                return next.run(request).await;
            }

            let generation = self.coordinator.generation();
            let mut retry = request.clone();
            let err = match next.run(request).await {
                Err(err) if err.is_unauthorized() => err,
                other => return other,
            };

            let refreshed = if self.coordinator.generation() != generation {
                debug!(request_id = %retry.request_id, "credential replaced while request was in flight");
                true
            } else {
                info!(request_id = %retry.request_id, path = %retry.path, "access credential rejected, refreshing");
                self.coordinator.refresh().await
            };

            if !refreshed {
                return Err(err);
            }

            retry.retried = true;
            debug!(request_id = %retry.request_id, "re-issuing request after refresh");
            next.run(retry).await
        })
    }
}

/// Client that sends every request through the middleware chain.
pub struct ApiClient {
    stages: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    /// Chain `stages` (outermost first) in front of `transport`.
    pub fn new(stages: Vec<Arc<dyn Middleware>>, transport: Arc<dyn Transport>) -> Self {
        Self { stages, transport }
    }

    /// The default authenticated chain.
    pub fn authenticated(coordinator: Arc<RefreshCoordinator>, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            vec![
                Arc::new(RefreshOnUnauthorized::new(coordinator.clone())),
                Arc::new(BearerAuth::new(coordinator)),
            ],
            transport,
        )
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        Next {
            stages: &self.stages,
            transport: self.transport.as_ref(),
        }
        .run(request)
        .await
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.json()
    }
}
