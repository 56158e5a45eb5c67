//! TCP connect probe

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use super::{MAX_TIMEOUT_SECS, Probe, ProbeError, check_timeout, latency_value, parse_payload};
use crate::storage::MonitorRecord;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Payload of a `tcp` monitor
#[derive(Debug, Clone, Deserialize)]
pub struct TcpProbeConfig {
    pub host: String,
    pub port: u16,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Provider for `tcp` monitors; the outcome is the connect latency
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), ProbeError> {
        let config: TcpProbeConfig = parse_payload(payload)?;
        if config.host.trim().is_empty() {
            return Err(ProbeError::Config("host must not be empty".to_string()));
        }
        if config.port == 0 {
            return Err(ProbeError::Config("port must not be 0".to_string()));
        }
        check_timeout(config.timeout_secs)
    }

    #[instrument(skip_all, fields(monitor = %monitor.name))]
    async fn run(&self, monitor: &MonitorRecord) -> Result<i64, ProbeError> {
        let config: TcpProbeConfig = parse_payload(&monitor.payload)?;
        let timeout = Duration::from_secs(config.timeout_secs.min(MAX_TIMEOUT_SECS));
        trace!("connecting to {}:{}", config.host, config.port);

        let start = Instant::now();
        let stream = tokio::time::timeout(timeout, TcpStream::connect((config.host.as_str(), config.port)))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let elapsed = start.elapsed();
        drop(stream);

        Ok(latency_value(elapsed))
    }
}
