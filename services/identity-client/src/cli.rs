//! Command-line parsing and output
//!
//! ```text
//! identity-client [--config <path>] [--metrics] <command>
//!
//! commands:
//!   status              session check result (default)
//!   login [--remember]  sign in with the configured account
//!   register            create the configured account
//!   logout              end the session and forget credentials
//!   settings            active region
//!   weather             region-aware forecast
//! ```

use anyhow::{Result, bail};
use serde::Serialize;

use identity_auth::{Outcome, UserProfile};
use identity_session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Login { remember: bool },
    Register,
    Logout,
    Settings,
    Weather,
}

impl Command {
    /// Label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Login { .. } => "login",
            Command::Register => "register",
            Command::Logout => "logout",
            Command::Settings => "settings",
            Command::Weather => "weather",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<String>,
    pub metrics: bool,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut config = None;
        let mut metrics = false;
        let mut remember = false;
        let mut command = None;

        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => match args.next() {
                    Some(path) => config = Some(path.clone()),
                    None => bail!("--config requires a path"),
                },
                "--metrics" => metrics = true,
                "--remember" => remember = true,
                flag if flag.starts_with("--") => bail!("unknown flag: {flag}"),
                name if command.is_none() => command = Some(name.to_string()),
                extra => bail!("unexpected argument: {extra}"),
            }
        }

        let command = match command.as_deref().unwrap_or("status") {
            "status" => Command::Status,
            "login" => Command::Login { remember },
            "register" => Command::Register,
            "logout" => Command::Logout,
            "settings" => Command::Settings,
            "weather" => Command::Weather,
            other => bail!("unknown command: {other}"),
        };
        if remember && !matches!(command, Command::Login { .. }) {
            bail!("--remember only applies to login");
        }

        Ok(Self {
            config,
            metrics,
            command,
        })
    }
}

/// Session check result as an envelope.
pub fn session_outcome(state: &SessionState) -> Outcome<UserProfile> {
    match state {
        SessionState::Authenticated(profile) => Outcome::ok(profile.clone()),
        SessionState::Unauthenticated(reason) => Outcome::failed(reason.messages()),
        other => Outcome::failed(vec![format!("session {}", other.label())]),
    }
}

/// Print an envelope as pretty JSON and report whether it succeeded.
pub fn print_outcome<T: Serialize>(outcome: &Outcome<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(outcome.success)
}
