//! Prometheus metrics exposition
//!
//! Counters emitted during a run:
//!
//! - `identity_refresh_total` (counter): label `outcome` (success, failure, joined,
//!   superseded)
//! - `identity_probe_attempts_total` (counter)
//! - `identity_client_commands_total` (counter): labels `command`, `outcome`
//!
//! The first two are emitted by the session layer; this module installs the
//! recorder and records the command outcome.

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    describe();
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(
        "identity_refresh_total",
        "Refresh exchanges and the callers that joined one in flight"
    );
    metrics::describe_counter!(
        "identity_probe_attempts_total",
        "User-info probes issued during session checks"
    );
    metrics::describe_counter!(
        "identity_client_commands_total",
        "CLI commands run, by outcome"
    );
}

/// Record a completed command.
pub fn record_command(command: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "identity_client_commands_total",
        "command" => command.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
