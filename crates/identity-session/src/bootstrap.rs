//! Session bootstrap state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! `SessionBootstrapper::determine_session` executes the I/O implied by each
//! action (refresh, user-info probe, retry delay) and feeds the result back
//! in as the next event.
//!
//! ```text
//! Unknown ──check──> Refreshing ──ok──> Probing{1} ──ok──> Authenticated
//!    │                   └─fail─> Unauthenticated(RefreshFailed)
//!    └──check (access held, or nothing held)──> Probing{1}
//! Probing{n} ──401/403──> Unauthenticated(Unauthorized)
//! Probing{n} ──transient, n < max──> Waiting{n} ──timer──> Probing{n+1}
//! Probing{max} ──transient──> Unauthenticated(MaxRetriesExceeded)
//! ```
//!
//! Only settled states (Authenticated / Unauthenticated) are published to
//! observers; until the first check settles they see `Unknown`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use identity_auth::{MAX_RETRIES_MESSAGE, USER_PATH, UserProfile};

use crate::classify::{ErrorClassification, classify_error};
use crate::pipeline::ApiClient;
use crate::refresh::RefreshCoordinator;
use crate::transport::ApiRequest;

/// Why a check ended unauthenticated.
#[derive(Debug, Clone, PartialEq)]
pub enum UnauthenticatedReason {
    /// The proactive refresh of a refresh-only session failed
    RefreshFailed,
    /// The probe was rejected with 401/403 (after the pipeline's refresh)
    Unauthorized(Vec<String>),
    /// The probe succeeded but its body was not a profile
    InvalidResponse(String),
    /// Every probe attempt failed with a transient error
    MaxRetriesExceeded {
        attempts: u32,
        last_errors: Vec<String>,
    },
}

impl UnauthenticatedReason {
    /// Messages for the result envelope.
    pub fn messages(&self) -> Vec<String> {
        match self {
            UnauthenticatedReason::RefreshFailed => vec!["Session expired".to_string()],
            UnauthenticatedReason::Unauthorized(errors) => errors.clone(),
            UnauthenticatedReason::InvalidResponse(msg) => vec![msg.clone()],
            UnauthenticatedReason::MaxRetriesExceeded { last_errors, .. } => {
                let mut messages = vec![MAX_RETRIES_MESSAGE.to_string()];
                messages.extend(last_errors.iter().cloned());
                messages
            }
        }
    }
}

/// Session states.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No check has completed yet
    Unknown,
    /// Exchanging a remembered refresh credential before probing
    Refreshing,
    /// User-info probe in progress (1-based attempt)
    Probing { attempt: u32 },
    /// Waiting out the fixed delay after a transient probe failure
    Waiting { attempt: u32 },
    Authenticated(UserProfile),
    Unauthenticated(UnauthenticatedReason),
}

impl SessionState {
    /// `Some(true/false)` once settled, `None` while unknown or checking.
    pub fn is_authenticated(&self) -> Option<bool> {
        match self {
            SessionState::Authenticated(_) => Some(true),
            SessionState::Unauthenticated(_) => Some(false),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }

    /// Status label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Refreshing => "refreshing",
            SessionState::Probing { .. } => "probing",
            SessionState::Waiting { .. } => "waiting",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated(_) => "unauthenticated",
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum SessionEvent {
    /// A (re-)check was requested; carries what the token store holds
    CheckRequested { has_access: bool, has_refresh: bool },
    RefreshSucceeded,
    RefreshFailed,
    ProbeSucceeded(UserProfile),
    /// 401/403 after the pipeline's own refresh-and-retry
    ProbeRejected(Vec<String>),
    /// Network error, timeout, 5xx or other retryable failure
    ProbeFailed(Vec<String>),
    /// 2xx with an unusable body, or a request that could not be built
    ProbeInvalid(String),
    /// Retry delay elapsed
    RetryTimer,
}

/// Actions the driver should execute after a state transition.
#[derive(Debug, PartialEq)]
pub enum SessionAction {
    Refresh,
    Probe,
    ScheduleRetry { delay: Duration },
    /// Settled (or ignored event); nothing to do
    None,
}

/// Probe retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: identity_auth::DEFAULT_MAX_PROBE_RETRIES,
            retry_delay: Duration::from_millis(identity_auth::DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: SessionState,
    event: SessionEvent,
    policy: &ProbePolicy,
) -> (SessionState, SessionAction) {
    match (state, event) {
        // --- Check requested from a resting state ---
        (
            SessionState::Unknown | SessionState::Authenticated(_) | SessionState::Unauthenticated(_),
            SessionEvent::CheckRequested {
                has_access: false,
                has_refresh: true,
            },
        ) => (SessionState::Refreshing, SessionAction::Refresh),

        (
            SessionState::Unknown | SessionState::Authenticated(_) | SessionState::Unauthenticated(_),
            SessionEvent::CheckRequested { .. },
        ) => (SessionState::Probing { attempt: 1 }, SessionAction::Probe),

        // --- Refreshing ---
        (SessionState::Refreshing, SessionEvent::RefreshSucceeded) => {
            (SessionState::Probing { attempt: 1 }, SessionAction::Probe)
        }

        (SessionState::Refreshing, SessionEvent::RefreshFailed) => (
            SessionState::Unauthenticated(UnauthenticatedReason::RefreshFailed),
            SessionAction::None,
        ),

        // --- Probing ---
        (SessionState::Probing { .. }, SessionEvent::ProbeSucceeded(profile)) => {
            (SessionState::Authenticated(profile), SessionAction::None)
        }

        (SessionState::Probing { .. }, SessionEvent::ProbeRejected(errors)) => (
            SessionState::Unauthenticated(UnauthenticatedReason::Unauthorized(errors)),
            SessionAction::None,
        ),

        (SessionState::Probing { .. }, SessionEvent::ProbeInvalid(msg)) => (
            SessionState::Unauthenticated(UnauthenticatedReason::InvalidResponse(msg)),
            SessionAction::None,
        ),

        (SessionState::Probing { attempt }, SessionEvent::ProbeFailed(_))
            if attempt < policy.max_attempts =>
        {
            (
                SessionState::Waiting { attempt },
                SessionAction::ScheduleRetry {
                    delay: policy.retry_delay,
                },
            )
        }

        (SessionState::Probing { attempt }, SessionEvent::ProbeFailed(errors)) => (
            SessionState::Unauthenticated(UnauthenticatedReason::MaxRetriesExceeded {
                attempts: attempt,
                last_errors: errors,
            }),
            SessionAction::None,
        ),

        // --- Waiting ---
        (SessionState::Waiting { attempt }, SessionEvent::RetryTimer) => (
            SessionState::Probing {
                attempt: attempt + 1,
            },
            SessionAction::Probe,
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, SessionAction::None),
    }
}

/// Determines and publishes the session's authentication state.
pub struct SessionBootstrapper {
    client: Arc<ApiClient>,
    coordinator: Arc<RefreshCoordinator>,
    policy: ProbePolicy,
    state: watch::Sender<SessionState>,
    /// Serializes checks; a re-check requested mid-check runs after it
    check: Mutex<()>,
}

impl SessionBootstrapper {
    pub fn new(
        client: Arc<ApiClient>,
        coordinator: Arc<RefreshCoordinator>,
        policy: ProbePolicy,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            client,
            coordinator,
            policy,
            state,
            check: Mutex::new(()),
        }
    }

    /// Latest settled state (`Unknown` before the first check completes).
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe settled state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run a full check and publish the settled state.
    pub async fn determine_session(&self) -> SessionState {
        let _check = self.check.lock().await;

        let tokens = self.coordinator.tokens();
        let (mut state, mut action) = handle_event(
            self.current(),
            SessionEvent::CheckRequested {
                has_access: tokens.has_access_token(),
                has_refresh: tokens.has_refresh_token(),
            },
            &self.policy,
        );

        loop {
            debug!(state = state.label(), ?action, "session check step");
            let event = match action {
                SessionAction::Refresh => {
                    if self.coordinator.refresh().await {
                        SessionEvent::RefreshSucceeded
                    } else {
                        SessionEvent::RefreshFailed
                    }
                }
                SessionAction::Probe => self.probe().await,
                SessionAction::ScheduleRetry { delay } => {
                    tokio::time::sleep(delay).await;
                    SessionEvent::RetryTimer
                }
                SessionAction::None => break,
            };
            (state, action) = handle_event(state, event, &self.policy);
        }

        info!(state = state.label(), "session determined");
        self.state.send_replace(state.clone());
        state
    }

    /// One user-info request through the authenticated pipeline.
    async fn probe(&self) -> SessionEvent {
        metrics::counter!("identity_probe_attempts_total").increment(1);
        match self
            .client
            .send_json::<UserProfile>(ApiRequest::get(USER_PATH))
            .await
        {
            Ok(profile) => SessionEvent::ProbeSucceeded(profile),
            Err(e) => match classify_error(&e) {
                ErrorClassification::Unauthorized => {
                    debug!(error = %e, "probe rejected");
                    SessionEvent::ProbeRejected(e.messages())
                }
                ErrorClassification::Malformed => {
                    warn!(error = %e, "probe request or response unusable");
                    SessionEvent::ProbeInvalid(e.to_string())
                }
                ErrorClassification::Transient => {
                    warn!(error = %e, "probe failed");
                    SessionEvent::ProbeFailed(e.messages())
                }
            },
        }
    }
}
