//! Identity API constants
//!
//! Endpoint paths are relative to the configured API base URL (for example
//! `https://app.example.com/api`). The identity routes live under
//! `/identity`; application data routes sit directly under the base.

/// Exchange email + password for a token pair
pub const LOGIN_PATH: &str = "/identity/login";

/// Create an account and receive a token pair
pub const REGISTER_PATH: &str = "/identity/register";

/// Exchange a refresh credential for a new access credential
pub const REFRESH_PATH: &str = "/identity/refresh";

/// Terminate the server-side session
pub const LOGOUT_PATH: &str = "/identity/logout";

/// User-info endpoint, also used as the session probe
pub const USER_PATH: &str = "/identity/user";

pub const RECOVER_PASSWORD_PATH: &str = "/identity/recover-password";
pub const VERIFY_2FA_PATH: &str = "/identity/verify-2fa";
pub const RESEND_2FA_PATH: &str = "/identity/resend-2fa";
pub const CHANGE_PASSWORD_PATH: &str = "/identity/change-password";

/// Region configuration (active region + available regions)
pub const APP_SETTINGS_PATH: &str = "/appsettings";

/// Sample region-aware content
pub const WEATHER_FORECAST_PATH: &str = "/weatherforecast";

/// Durable storage key holding the remembered refresh credential.
/// Absence of the key means there is no persisted session.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Default number of user-info probe attempts during session bootstrap
pub const DEFAULT_MAX_PROBE_RETRIES: u32 = 5;

/// Default fixed delay between probe attempts, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Message reported when every probe attempt failed with a transient error
pub const MAX_RETRIES_MESSAGE: &str = "Maximum retry attempts exceeded";

/// Message reported for failures that never produced an HTTP response
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred.";
