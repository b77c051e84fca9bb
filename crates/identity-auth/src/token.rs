//! Token endpoint payloads
//!
//! Login and register answer with a full token pair. Refresh answers with a
//! new access credential and, when the server rotates refresh credentials,
//! a new refresh credential. Both fields of the refresh response are
//! optional at the type level so that a 200 without `accessToken` can be
//! detected and treated as a failed exchange instead of a parse error.

use serde::{Deserialize, Serialize};

use crate::token_store::Credential;

/// Response from login and register.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: Credential,
    pub refresh_token: Credential,
}

/// Request body for the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response from the refresh endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<Credential>,
    #[serde(default)]
    pub refresh_token: Option<Credential>,
}

impl RefreshResponse {
    /// The new access credential, if the server actually sent a usable one.
    pub fn into_parts(self) -> Option<(Credential, Option<Credential>)> {
        let access = self.access_token.filter(|t| !t.is_empty())?;
        let refresh = self.refresh_token.filter(|t| !t.is_empty());
        Some((access, refresh))
    }
}
