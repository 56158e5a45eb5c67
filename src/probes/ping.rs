//! Ping probe
//!
//! Shells out to the system `ping` with a single echo request and parses the
//! round-trip time from its output.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{instrument, trace};

use super::{MAX_TIMEOUT_SECS, Probe, ProbeError, check_timeout, parse_payload};
use crate::storage::MonitorRecord;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Payload of a `ping` monitor
#[derive(Debug, Clone, Deserialize)]
pub struct PingProbeConfig {
    pub host: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Provider for `ping` monitors
pub struct PingProbe;

#[async_trait]
impl Probe for PingProbe {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), ProbeError> {
        let config: PingProbeConfig = parse_payload(payload)?;
        let host = config.host.trim();
        if host.is_empty() || host.starts_with('-') || host.contains(char::is_whitespace) {
            return Err(ProbeError::Config(format!("invalid host '{}'", config.host)));
        }
        check_timeout(config.timeout_secs)
    }

    #[instrument(skip_all, fields(monitor = %monitor.name))]
    async fn run(&self, monitor: &MonitorRecord) -> Result<i64, ProbeError> {
        let config: PingProbeConfig = parse_payload(&monitor.payload)?;
        trace!("pinging {}", config.host);

        let ms = run_ping_command(config.host.trim(), Duration::from_secs(config.timeout_secs.min(MAX_TIMEOUT_SECS))).await?;
        Ok((ms.ceil() as i64).max(1))
    }
}

/// Run `ping -c 1` and return the round-trip time in milliseconds
async fn run_ping_command(host: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let output = tokio::time::timeout(
        timeout + Duration::from_secs(1),
        Command::new("ping")
            .args(["-c", "1", "-W", &timeout_secs.to_string(), host])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ProbeError::Timeout(timeout))?
    .map_err(|e| ProbeError::Command(format!("failed to execute ping: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout") || stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}{}", stdout.trim(), stderr.trim())));
    }

    parse_ping_output(&stdout)
}

/// Parse ping command output for latency in milliseconds
pub fn parse_ping_output(output: &str) -> Result<f64, ProbeError> {
    // Per-packet response "time=X.XXX ms" (Linux, macOS)
    static PACKET: OnceLock<Option<Regex>> = OnceLock::new();
    // Summary "min/avg/max/... = X/X/X/X ms"
    static SUMMARY: OnceLock<Option<Regex>> = OnceLock::new();

    let packet = PACKET.get_or_init(|| Regex::new(r"time[=<](?P<val>[0-9.]+)\s*ms").ok());
    if let Some(ms) = packet
        .as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|caps| caps.name("val"))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Ok(ms);
    }

    let summary = SUMMARY.get_or_init(|| Regex::new(r"min/avg/max/\S+\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)").ok());
    if let Some(ms) = summary
        .as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Ok(ms);
    }

    Err(ProbeError::UnexpectedResponse(format!(
        "could not parse ping output: {}",
        output.lines().last().unwrap_or_default()
    )))
}
