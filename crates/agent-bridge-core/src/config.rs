//! Client configuration and endpoint derivation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::BridgeError;

/// Fixed WebSocket path on the bridge server.
pub const WS_PATH: &str = "/ws";

const ENV_SERVER_URL: &str = "AGENT_BRIDGE_SERVER_URL";
const ENV_CONNECT_TIMEOUT_MS: &str = "AGENT_BRIDGE_CONNECT_TIMEOUT_MS";
const ENV_PING_INTERVAL_MS: &str = "AGENT_BRIDGE_PING_INTERVAL_MS";
const ENV_MAX_RECONNECT_ATTEMPTS: &str = "AGENT_BRIDGE_MAX_RECONNECT_ATTEMPTS";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Backoff policy for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt; doubles per attempt.
    pub base_delay_ms: u64,
    /// Ceiling on the final delay, jitter included.
    pub max_delay_ms: u64,
    /// Upper bound of the multiplicative jitter, `delay * (1 + [0, ratio])`.
    pub jitter_ratio: f64,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.15,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` for a jitter sample in `[0, 1]`.
    ///
    /// Attempt 0 has no delay. Jitter is added on top of the exponential
    /// term and the sum is capped at `max_delay_ms`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for(&self, attempt: u32, jitter_unit: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(20);
        let scaled = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let jitter = scaled as f64 * self.jitter_ratio.max(0.0) * jitter_unit.clamp(0.0, 1.0);
        let ceiling = self.max_delay_ms.max(self.base_delay_ms);
        Duration::from_millis(scaled.saturating_add(jitter as u64).min(ceiling))
    }

    /// Largest delay `attempt` can produce.
    #[must_use]
    pub fn max_delay_for(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, 1.0)
    }
}

/// Bridge client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the bridge server (`http`, `https`, `ws` or `wss`).
    pub server_url: String,
    /// Upper bound on opening the transport.
    pub connect_timeout_ms: u64,
    /// WebSocket keepalive interval; 0 disables pings.
    pub ping_interval_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            connect_timeout_ms: 10_000,
            ping_interval_ms: 25_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for the given server URL with default tuning.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Overlay `AGENT_BRIDGE_*` environment variables onto the defaults.
    ///
    /// # Errors
    /// Returns error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup onto the defaults.
    ///
    /// # Errors
    /// Returns error if a numeric value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_SERVER_URL) {
            config.server_url = url;
        }
        if let Some(ms) = parse_var(&lookup, ENV_CONNECT_TIMEOUT_MS)? {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, ENV_PING_INTERVAL_MS)? {
            config.ping_interval_ms = ms;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_RECONNECT_ATTEMPTS)? {
            config.reconnect.max_attempts = max;
        }
        Ok(config)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn ping_interval(&self) -> Option<Duration> {
        if self.ping_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ping_interval_ms))
        }
    }

    /// Derive the WebSocket endpoint from `server_url`.
    ///
    /// `http` maps to `ws` and `https` to `wss`; the path is always `/ws`.
    ///
    /// # Errors
    /// Returns [`BridgeError::InvalidServerUrl`] if the URL is empty, cannot be
    /// parsed, has no host, or uses an unsupported scheme.
    pub fn endpoint_url(&self) -> Result<Url, BridgeError> {
        let raw = self.server_url.trim();
        if raw.is_empty() {
            return Err(BridgeError::InvalidServerUrl("empty URL".to_string()));
        }
        let mut url =
            Url::parse(raw).map_err(|e| BridgeError::InvalidServerUrl(format!("{raw}: {e}")))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(BridgeError::InvalidServerUrl(format!("{raw}: missing host")));
        }
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(BridgeError::InvalidServerUrl(format!(
                    "{raw}: unsupported scheme {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| BridgeError::InvalidServerUrl(format!("{raw}: cannot use {scheme}")))?;
        url.set_path(WS_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value })
        })
        .transpose()
}
