//! Client-side session management for an identity API
//!
//! Keeps a user signed in across restarts and across access-credential
//! expiry without surfacing either to the application:
//!
//! 1. `SessionManager::start()` runs the session check: a remembered refresh
//!    credential is exchanged first, then the user-info endpoint is probed
//!    (transient failures retried with a fixed delay)
//! 2. Every request goes through `ApiClient`, which attaches the bearer
//!    credential and, on a 401, refreshes once and re-issues the request
//! 3. Concurrent 401s share a single refresh exchange (`RefreshCoordinator`)
//! 4. A failed refresh clears every credential; the session settles
//!    unauthenticated
//! 5. `IdentityService` exposes login, register, logout and the other
//!    account calls as `Outcome` envelopes

pub mod bootstrap;
pub mod classify;
pub mod error;
pub mod identity;
pub mod manager;
pub mod pipeline;
pub mod refresh;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bootstrap::{
    ProbePolicy, SessionAction, SessionBootstrapper, SessionEvent, SessionState,
    UnauthenticatedReason, handle_event,
};
pub use classify::{ErrorClassification, classify_error, classify_status};
pub use error::{Error, Result};
pub use identity::IdentityService;
pub use manager::{SessionConfig, SessionManager};
pub use pipeline::{ApiClient, BearerAuth, Middleware, Next, RefreshOnUnauthorized};
pub use refresh::RefreshCoordinator;
pub use retry::{RetryOptions, retry, send_with_retry};
pub use transport::{ApiRequest, ApiResponse, BoxFuture, HttpTransport, Transport};
