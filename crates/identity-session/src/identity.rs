//! Identity operations surfaced to the application
//!
//! Every operation resolves to an `Outcome`; transport errors never escape.
//! Login, register and logout change the credentials held by the session,
//! so each one re-runs the session check before returning.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use identity_auth::models::{
    ChangePasswordRequest, Credentials, RecoverPasswordRequest, VerifyTwoFactorRequest,
};
use identity_auth::{
    APP_SETTINGS_PATH, AppSettings, CHANGE_PASSWORD_PATH, LOGIN_PATH, LOGOUT_PATH, Outcome,
    RECOVER_PASSWORD_PATH, REGISTER_PATH, RESEND_2FA_PATH, TokenPair, TokenStore, USER_PATH,
    UserProfile, VERIFY_2FA_PATH, WEATHER_FORECAST_PATH, WeatherForecast,
};

use crate::bootstrap::SessionBootstrapper;
use crate::error::Result;
use crate::pipeline::ApiClient;
use crate::retry::{RetryOptions, send_with_retry};
use crate::transport::{ApiRequest, ApiResponse};

/// Account and application-data calls for one session.
pub struct IdentityService {
    client: Arc<ApiClient>,
    tokens: Arc<TokenStore>,
    session: Arc<SessionBootstrapper>,
    retry: RetryOptions,
}

impl IdentityService {
    pub fn new(
        client: Arc<ApiClient>,
        tokens: Arc<TokenStore>,
        session: Arc<SessionBootstrapper>,
        retry: RetryOptions,
    ) -> Self {
        Self {
            client,
            tokens,
            session,
            retry,
        }
    }

    /// Exchange email + password for credentials. With `remember`, the
    /// refresh credential survives a restart. On success the data is the
    /// profile found by the follow-up session check, if any.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Outcome<Option<UserProfile>> {
        match self.exchange(LOGIN_PATH, email, password).await {
            Ok(pair) => {
                self.tokens
                    .set_tokens(pair.access_token, pair.refresh_token, remember);
                info!(remember, "logged in");
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                return Outcome::failed(e.messages());
            }
        }
        let state = self.session.determine_session().await;
        Outcome::ok(state.profile().cloned())
    }

    /// Create an account. The new session is never remembered.
    pub async fn register(&self, email: &str, password: &str) -> Outcome<Option<UserProfile>> {
        match self.exchange(REGISTER_PATH, email, password).await {
            Ok(pair) => {
                self.tokens
                    .set_tokens(pair.access_token, pair.refresh_token, false);
                info!("registered");
            }
            Err(e) => {
                warn!(error = %e, "registration failed");
                return Outcome::failed(e.messages());
            }
        }
        let state = self.session.determine_session().await;
        Outcome::ok(state.profile().cloned())
    }

    /// End the session. Local credentials are cleared whatever the server
    /// answers.
    pub async fn logout(&self) -> Outcome<Value> {
        let result = self.post(LOGOUT_PATH, &serde_json::json!({})).await;
        self.tokens.clear_tokens();
        info!("logged out");
        self.session.determine_session().await;
        outcome(result.map(|r| body_value(&r)))
    }

    pub async fn user(&self) -> Outcome<UserProfile> {
        outcome(self.client.send_json(ApiRequest::get(USER_PATH)).await)
    }

    pub async fn recover_password(&self, email: &str) -> Outcome<Value> {
        let request = ApiRequest::post(RECOVER_PASSWORD_PATH)
            .json(&RecoverPasswordRequest { email })
            .map(ApiRequest::skip_auth_retry);
        let result = match request {
            Ok(request) => self.client.send(request).await,
            Err(e) => Err(e),
        };
        outcome(result.map(|r| body_value(&r)))
    }

    pub async fn verify_2fa(&self, code: &str) -> Outcome<Value> {
        let result = self
            .post(VERIFY_2FA_PATH, &VerifyTwoFactorRequest { code })
            .await;
        outcome(result.map(|r| body_value(&r)))
    }

    pub async fn resend_2fa(&self) -> Outcome<Value> {
        let result = self.post(RESEND_2FA_PATH, &serde_json::json!({})).await;
        outcome(result.map(|r| body_value(&r)))
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Outcome<Value> {
        let body = ChangePasswordRequest {
            current_password: current,
            new_password: new,
        };
        let result = self.post(CHANGE_PASSWORD_PATH, &body).await;
        outcome(result.map(|r| body_value(&r)))
    }

    /// Active region configuration. Retried on transient failures.
    pub async fn app_settings(&self) -> Outcome<AppSettings> {
        outcome(self.get_with_retry(APP_SETTINGS_PATH).await)
    }

    /// Region-aware forecast. Retried on transient failures.
    pub async fn weather_forecast(&self) -> Outcome<Vec<WeatherForecast>> {
        outcome(self.get_with_retry(WEATHER_FORECAST_PATH).await)
    }

    async fn exchange(&self, path: &str, email: &str, password: &str) -> Result<TokenPair> {
        let request = ApiRequest::post(path)
            .json(&Credentials { email, password })?
            .skip_auth_retry();
        self.client.send_json(request).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        let request = ApiRequest::post(path).json(body)?;
        self.client.send(request).await
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        send_with_retry(&self.client, ApiRequest::get(path), self.retry)
            .await?
            .json()
    }
}

fn outcome<T>(result: Result<T>) -> Outcome<T> {
    match result {
        Ok(data) => Outcome::ok(data),
        Err(e) => Outcome::failed(e.messages()),
    }
}

/// Response body as JSON: `null` when empty, a string when not JSON.
fn body_value(response: &ApiResponse) -> Value {
    if response.body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&response.body).unwrap_or_else(|_| Value::String(response.body.clone()))
}
