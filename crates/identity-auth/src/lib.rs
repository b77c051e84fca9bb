//! Identity credential library
//!
//! Holds the client-side credentials for an identity API session and the
//! payload types exchanged with it. This crate performs no network I/O; the
//! `identity-session` crate drives requests and uses the types here.
//!
//! Credential flow:
//! 1. Login/register returns a `TokenPair`
//! 2. `TokenStore::set_tokens()` keeps both in memory, persisting the refresh
//!    credential through `DurableStorage` only when remembered
//! 3. A refresh answers with a `RefreshResponse`, applied through
//!    `TokenStore::apply_refresh()` only while the refresh credential that
//!    was sent is still current
//! 4. Logout calls `TokenStore::clear_tokens()`; a failed refresh calls
//!    `TokenStore::clear_tokens_if_current()`

pub mod constants;
pub mod envelope;
pub mod error;
pub mod models;
pub mod storage;
pub mod token;
pub mod token_store;

pub use constants::*;
pub use envelope::{ApiProblem, Outcome, flatten_problem};
pub use error::{Error, Result};
pub use models::{AppSettings, UserProfile, WeatherForecast};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use token::{RefreshRequest, RefreshResponse, TokenPair};
pub use token_store::{Credential, TokenStore};
