//! HTTP probe
//!
//! Issues one request and checks the status code and, optionally, the body
//! against a regex. The outcome is the elapsed time in milliseconds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{instrument, trace};

use super::{Probe, ProbeError, check_timeout, latency_value, parse_payload};
use crate::storage::MonitorRecord;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
    Put,
    Delete,
    Patch,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Payload of an `http` monitor
#[derive(Debug, Clone, Deserialize)]
pub struct HttpProbeConfig {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body, sent as-is
    pub body: Option<String>,

    /// Accepted status codes; any 2xx when absent
    pub expected_status: Option<Vec<u16>>,

    /// Regex the response body must match
    pub body_pattern: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl HttpProbeConfig {
    fn check(&self) -> Result<(), ProbeError> {
        reqwest::Url::parse(&self.url).map_err(|e| ProbeError::Config(format!("invalid url '{}': {e}", self.url)))?;

        check_timeout(self.timeout_secs)?;

        if let Some(pattern) = &self.body_pattern {
            Regex::new(pattern).map_err(|e| ProbeError::Config(format!("invalid body_pattern '{pattern}': {e}")))?;
        }

        Ok(())
    }
}

/// Provider for `http` monitors
pub struct HttpProbe {
    /// Reused across requests for connection pooling
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn execute_request(&self, config: &HttpProbeConfig) -> Result<(u16, String), ProbeError> {
        let mut request = self
            .client
            .request(config.method.into(), &config.url)
            .timeout(Duration::from_secs(config.timeout_secs));

        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(Duration::from_secs(config.timeout_secs))
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let status_code = response.status().as_u16();

        // Body is irrelevant for HEAD
        let body = if config.method == HttpMethod::Head {
            String::new()
        } else {
            response
                .text()
                .await
                .map_err(|e| ProbeError::Network(format!("failed to read response body: {e}")))?
        };

        Ok((status_code, body))
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a response against the configured expectations
///
/// Checks:
/// 1. Status code matches expected codes (or is 2xx if not specified)
/// 2. Body matches pattern (if configured)
pub fn evaluate_response(config: &HttpProbeConfig, status_code: u16, body: &str) -> Result<(), ProbeError> {
    let status_ok = match &config.expected_status {
        Some(expected) => expected.contains(&status_code),
        None => (200..300).contains(&status_code),
    };

    if !status_ok {
        return Err(ProbeError::UnexpectedResponse(format!(
            "unexpected status code: {status_code}"
        )));
    }

    if let Some(pattern) = &config.body_pattern {
        let re = Regex::new(pattern).map_err(|e| ProbeError::Config(format!("invalid body_pattern: {e}")))?;
        if !re.is_match(body) {
            return Err(ProbeError::UnexpectedResponse(format!(
                "body does not match pattern '{pattern}'"
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), ProbeError> {
        parse_payload::<HttpProbeConfig>(payload)?.check()
    }

    #[instrument(skip_all, fields(monitor = %monitor.name))]
    async fn run(&self, monitor: &MonitorRecord) -> Result<i64, ProbeError> {
        let config: HttpProbeConfig = parse_payload(&monitor.payload)?;
        trace!("checking service at {}", config.url);

        let start = Instant::now();
        let (status_code, body) = self.execute_request(&config).await?;
        let elapsed = start.elapsed();

        evaluate_response(&config, status_code, &body)?;
        Ok(latency_value(elapsed))
    }
}
