//! Identity and application payloads other than tokens

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Email + password body for login and register.
#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RecoverPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VerifyTwoFactorRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

/// Profile returned by the user-info endpoint.
///
/// Only `email` is guaranteed; any other claims the server includes are
/// kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Active region and the regions the deployment knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub region: String,
    #[serde(default)]
    pub regions: BTreeMap<String, String>,
}

impl AppSettings {
    /// Display name of the active region, falling back to its code.
    pub fn region_name(&self) -> &str {
        self.regions
            .get(&self.region)
            .map(String::as_str)
            .unwrap_or(&self.region)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: String,
    pub temperature_c: i32,
    pub temperature_f: i32,
    #[serde(default)]
    pub summary: Option<String>,
}
