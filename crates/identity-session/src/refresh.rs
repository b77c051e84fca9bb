//! Single-flight credential refresh
//!
//! At most one refresh exchange is on the wire at any time. The first caller
//! to find no refresh in flight becomes the leader and performs the network
//! round trip; callers arriving while it runs register a waiter (one oneshot
//! per caller, kept in FIFO order) and are released together with the
//! leader's outcome. No caller ever starts a second exchange while one is in
//! flight.
//!
//! The in-flight flag and the waiter list live behind one short std mutex
//! that is never held across an `.await`, so a flag check and a waiter
//! registration are atomic with respect to the leader settling.
//!
//! Success updates the token store (access credential, plus the refresh
//! credential when the server rotated it). Any failure clears every
//! credential, including the remembered copy. Both apply only while the
//! refresh credential that was sent is still the current one: if a login or
//! logout replaced it mid-exchange, the result is discarded and callers get
//! whatever access credential the store now holds. Retrying is the caller's
//! job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use identity_auth::{Credential, REFRESH_PATH, RefreshRequest, RefreshResponse, TokenStore};

use crate::error::{Error, Result};
use crate::transport::{ApiRequest, Transport};

#[derive(Default)]
struct Flight {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Coordinates refresh exchanges for one session.
pub struct RefreshCoordinator {
    tokens: Arc<TokenStore>,
    transport: Arc<dyn Transport>,
    flight: Mutex<Flight>,
    /// Bumped after every successful refresh. Lets a request that was sent
    /// with a now-replaced credential retry without another exchange.
    generation: AtomicU64,
}

impl RefreshCoordinator {
    /// `transport` must be the raw terminal stage, not the authenticated
    /// pipeline, so the exchange can never re-enter the 401 handling.
    pub fn new(tokens: Arc<TokenStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            tokens,
            transport,
            flight: Mutex::new(Flight::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Whether an exchange is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// An access credential usable for a request right now.
    ///
    /// Returns the cached credential without suspending. Without one, a
    /// refresh is started (or joined) when a refresh credential exists;
    /// otherwise `None` is returned immediately.
    pub async fn valid_access_token(&self) -> Option<Credential> {
        if let Some(access) = self.tokens.access_token().filter(|t| !t.is_empty()) {
            return Some(access);
        }
        if !self.tokens.has_refresh_token() {
            return None;
        }
        if self.refresh().await {
            self.tokens.access_token()
        } else {
            None
        }
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// Safe to call concurrently: late callers wait for the in-flight
    /// exchange and receive its outcome.
    pub async fn refresh(&self) -> bool {
        let waiter = {
            let mut flight = self.lock();
            if flight.in_flight {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                Some(rx)
            } else {
                flight.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("refresh already in flight, waiting for it to settle");
            metrics::counter!("identity_refresh_total", "outcome" => "joined").increment(1);
            // A dropped sender means the leader was abandoned mid-flight
            return rx.await.unwrap_or(false);
        }

        let mut guard = FlightGuard {
            coordinator: self,
            settled: false,
        };
        let Some(sent) = self.tokens.refresh_token().filter(|t| !t.is_empty()) else {
            warn!("refresh requested without a refresh credential");
            self.tokens.clear_tokens();
            metrics::counter!("identity_refresh_total", "outcome" => "failure").increment(1);
            guard.settle(false);
            return false;
        };

        let refreshed = match self.exchange(&sent).await {
            Ok((access, rotated)) => {
                if rotated.is_some() {
                    debug!("refresh credential rotated");
                }
                if self.tokens.apply_refresh(&sent, access, rotated) {
                    self.generation.fetch_add(1, Ordering::AcqRel);
                    metrics::counter!("identity_refresh_total", "outcome" => "success")
                        .increment(1);
                    info!("access credential refreshed");
                    true
                } else {
                    self.superseded()
                }
            }
            Err(e) => {
                if self.tokens.clear_tokens_if_current(&sent) {
                    warn!(error = %e, "refresh failed, clearing credentials");
                    metrics::counter!("identity_refresh_total", "outcome" => "failure")
                        .increment(1);
                    false
                } else {
                    debug!(error = %e, "refresh failed for a replaced credential");
                    self.superseded()
                }
            }
        };
        guard.settle(refreshed);
        refreshed
    }

    /// The credentials changed while the exchange was running. The store is
    /// left as the newer operation set it.
    fn superseded(&self) -> bool {
        info!("credentials replaced during refresh, discarding its result");
        metrics::counter!("identity_refresh_total", "outcome" => "superseded").increment(1);
        self.tokens.has_access_token()
    }

    /// One network round trip against the refresh endpoint. Returns the new
    /// access credential and the rotated refresh credential, if any.
    async fn exchange(&self, refresh: &Credential) -> Result<(Credential, Option<Credential>)> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&RefreshRequest {
                refresh_token: refresh.expose(),
            })?
            .skip_auth_retry();

        let response = self.transport.execute(&request).await?;
        response
            .json::<RefreshResponse>()?
            .into_parts()
            .ok_or_else(|| Error::Decode("refresh response has no accessToken".into()))
    }

    /// Clear the in-flight flag and release every waiter, oldest first.
    fn release(&self, refreshed: bool) {
        let waiters = {
            let mut flight = self.lock();
            flight.in_flight = false;
            std::mem::take(&mut flight.waiters)
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), refreshed, "releasing queued requests");
        }
        for waiter in waiters {
            // Receiver gone means that caller was abandoned; nothing to do
            let _ = waiter.send(refreshed);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag however the leader's future ends. If the
/// leader is dropped before settling, waiters are released with failure.
struct FlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl FlightGuard<'_> {
    fn settle(&mut self, refreshed: bool) {
        self.settled = true;
        self.coordinator.release(refreshed);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh abandoned before settling");
            self.coordinator.release(false);
        }
    }
}
