//! In-memory credential holder with optional refresh persistence
//!
//! The access credential lives only in process memory and is never handed
//! to durable storage. The refresh credential is always held in memory and
//! is additionally written to storage when the user asked to be
//! remembered at login. Constructing a store reads the persisted refresh
//! credential back, which is how a remembered session survives a restart.
//!
//! All operations are synchronous state transitions. Storage writes happen
//! while the state lock is held, so memory and the remembered copy never
//! disagree about which refresh credential is current. Storage failures
//! are logged and swallowed: the in-memory transition always happens.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use tracing::{debug, warn};

use crate::constants::REFRESH_TOKEN_KEY;
use crate::storage::DurableStorage;

/// An opaque bearer or refresh token.
pub type Credential = Secret<String>;

#[derive(Default)]
struct TokenState {
    access: Option<Credential>,
    refresh: Option<Credential>,
}

/// Holder for the access and refresh credentials of the current session.
///
/// One instance exists per session manager and is shared by reference with
/// the refresh coordinator and the request pipeline.
pub struct TokenStore {
    state: Mutex<TokenState>,
    storage: Arc<dyn DurableStorage>,
}

impl TokenStore {
    /// Create a store backed by `storage`, loading any remembered refresh
    /// credential. The access credential always starts empty.
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        let refresh = match storage.get(REFRESH_TOKEN_KEY) {
            Ok(Some(value)) if !value.is_empty() => {
                debug!("restored remembered refresh credential");
                Some(Secret::new(value))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read remembered refresh credential");
                None
            }
        };

        Self {
            state: Mutex::new(TokenState {
                access: None,
                refresh,
            }),
            storage,
        }
    }

    /// Store both credentials after a login, register or refresh response.
    ///
    /// With `remember` the refresh credential is also persisted. Without it,
    /// a previously remembered credential is removed so an older session
    /// cannot resurface on the next start.
    pub fn set_tokens(&self, access: Credential, refresh: Credential, remember: bool) {
        let mut state = self.lock();
        let persisted = if remember {
            debug!("persisting refresh credential");
            self.storage.set(REFRESH_TOKEN_KEY, refresh.expose())
        } else {
            self.storage.remove(REFRESH_TOKEN_KEY)
        };
        if let Err(e) = persisted {
            warn!(error = %e, remember, "failed to update remembered refresh credential");
        }
        state.access = Some(access);
        state.refresh = Some(refresh);
    }

    /// Replace only the access credential.
    pub fn set_access_token(&self, access: Credential) {
        self.lock().access = Some(access);
    }

    /// Current access credential, if any. Never touches the network.
    pub fn access_token(&self) -> Option<Credential> {
        self.lock().access.clone()
    }

    /// Current refresh credential, if any.
    pub fn refresh_token(&self) -> Option<Credential> {
        self.lock().refresh.clone()
    }

    pub fn has_access_token(&self) -> bool {
        self.lock().access.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.lock().refresh.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Replace the refresh credential after a rotation.
    ///
    /// The persisted copy is overwritten only when one already exists, which
    /// keeps the original remember decision intact.
    pub fn update_refresh_token(&self, refresh: Credential) {
        let mut state = self.lock();
        self.persist_rotation(&refresh);
        state.refresh = Some(refresh);
    }

    /// Apply a refresh result only if `sent` is still the current refresh
    /// credential. Returns false, leaving the store untouched, when a login,
    /// logout or another refresh replaced it while the exchange was running.
    pub fn apply_refresh(
        &self,
        sent: &Credential,
        access: Credential,
        rotated: Option<Credential>,
    ) -> bool {
        let mut state = self.lock();
        if !is_current(&state, sent) {
            return false;
        }
        state.access = Some(access);
        if let Some(rotated) = rotated {
            self.persist_rotation(&rotated);
            state.refresh = Some(rotated);
        }
        true
    }

    /// Clear everything, like [`clear_tokens`](Self::clear_tokens), but only
    /// if `sent` is still the current refresh credential.
    pub fn clear_tokens_if_current(&self, sent: &Credential) -> bool {
        let mut state = self.lock();
        if !is_current(&state, sent) {
            return false;
        }
        self.clear_locked(&mut state);
        true
    }

    /// Drop both credentials and the remembered copy. Idempotent.
    pub fn clear_tokens(&self) {
        let mut state = self.lock();
        self.clear_locked(&mut state);
    }

    fn clear_locked(&self, state: &mut TokenState) {
        state.access = None;
        state.refresh = None;
        if let Err(e) = self.storage.remove(REFRESH_TOKEN_KEY) {
            warn!(error = %e, "failed to remove remembered refresh credential");
        }
        debug!("cleared credentials");
    }

    /// Overwrite the persisted copy only when one already exists.
    fn persist_rotation(&self, refresh: &Credential) {
        match self.storage.get(REFRESH_TOKEN_KEY) {
            Ok(Some(_)) => {
                if let Err(e) = self.storage.set(REFRESH_TOKEN_KEY, refresh.expose()) {
                    warn!(error = %e, "failed to persist rotated refresh credential");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read remembered refresh credential"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_current(state: &TokenState, sent: &Credential) -> bool {
    state
        .refresh
        .as_ref()
        .is_some_and(|current| current.expose() == sent.expose())
}
