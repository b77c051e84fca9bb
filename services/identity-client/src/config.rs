//! Configuration types and loading
//!
//! The config file is chosen by `--config`, else CONFIG_PATH, else
//! `identity-client.toml`. Values come from the file, with defaults for
//! omitted `[session]` keys. The only environment override is the account
//! password: IDENTITY_PASSWORD wins over password_file, and the password is
//! never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use identity_auth::{DEFAULT_MAX_PROBE_RETRIES, DEFAULT_RETRY_DELAY_MS};
use identity_session::SessionConfig;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub account: Option<AccountConfig>,
}

/// Identity API endpoint
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session persistence and probe behaviour
#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// File holding the remembered refresh credential
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_max_probe_retries")]
    pub max_probe_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_probe_retries: default_max_probe_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Account used by `login` and `register`
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to IDENTITY_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_max_probe_retries() -> u32 {
    DEFAULT_MAX_PROBE_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. IDENTITY_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.session.max_probe_retries == 0 {
            return Err(common::Error::Config(
                "max_probe_retries must be greater than 0".into(),
            ));
        }

        if let Some(account) = config.account.as_mut() {
            account.password = resolve_password(account.password_file.as_deref())?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("identity-client.toml")
    }

    /// Settings for the session layer.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            max_probe_retries: self.session.max_probe_retries,
            retry_delay: Duration::from_millis(self.session.retry_delay_ms),
        }
    }
}

fn resolve_password(password_file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(password) = std::env::var("IDENTITY_PASSWORD") {
        return Ok(Some(Secret::new(password)));
    }
    let Some(path) = password_file else {
        return Ok(None);
    };
    let password = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read password_file {}: {e}",
            path.display()
        ))
    })?;
    let password = password.trim().to_owned();
    Ok((!password.is_empty()).then(|| Secret::new(password)))
}
