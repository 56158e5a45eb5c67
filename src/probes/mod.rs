//! Probe providers
//!
//! A probe turns a monitor's configuration payload into one signed numeric
//! outcome. Positive values are latencies in milliseconds, negative values
//! mean the target is down and zero is inconclusive.
//!
//! Providers are stateless and never touch storage. They are registered in a
//! [`ProbeRegistry`] keyed by the monitor's `probe_type` tag, which is built
//! once at startup and shared read-only by every runner.

mod http;
mod ping;
mod tcp;

pub use http::{HttpMethod, HttpProbe, HttpProbeConfig};
pub use ping::{PingProbe, PingProbeConfig, parse_ping_output};
pub use tcp::{TcpProbe, TcpProbeConfig};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::storage::MonitorRecord;

/// Value persisted for a failed probe
pub const FAILURE_VALUE: i64 = -1;

/// Upper bound for a provider's own `timeout_secs`
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Probe error types
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// A pluggable check executor
#[async_trait]
pub trait Probe: Send + Sync {
    /// Type tag this provider is registered under
    fn name(&self) -> &'static str;

    /// Reject payloads this provider cannot run
    fn validate(&self, payload: &serde_json::Value) -> Result<(), ProbeError>;

    /// Run one check against the monitor's target
    async fn run(&self, monitor: &MonitorRecord) -> Result<i64, ProbeError>;
}

/// Decode a provider payload; unknown keys are ignored
pub(crate) fn parse_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, ProbeError> {
    serde_json::from_value(payload.clone()).map_err(|e| ProbeError::Config(e.to_string()))
}

/// Milliseconds elapsed, as a strictly positive outcome
pub(crate) fn latency_value(elapsed: Duration) -> i64 {
    (elapsed.as_millis() as i64).max(1)
}

/// Mapping from probe type tag to provider
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    providers: HashMap<String, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `http`, `ping` and `tcp` providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpProbe::new()));
        registry.register(Arc::new(PingProbe));
        registry.register(Arc::new(TcpProbe));
        registry
    }

    /// Add or replace a provider under its own name
    pub fn register(&mut self, probe: Arc<dyn Probe>) {
        self.providers.insert(probe.name().to_string(), probe);
    }

    pub fn get(&self, probe_type: &str) -> Option<Arc<dyn Probe>> {
        self.providers.get(probe_type).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Reject a payload timeout outside `1..=MAX_TIMEOUT_SECS`
fn check_timeout(timeout_secs: u64) -> Result<(), ProbeError> {
    if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ProbeError::Config(format!(
            "timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
        )));
    }
    Ok(())
}
