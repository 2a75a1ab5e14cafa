//! Configuration management for BusTunnel.
//!
//! All configuration is driven by environment variables. Every field has a
//! documented default, so an empty environment yields a working single-node
//! setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::TunnelError;
use crate::retry::RetryPolicy;

/// Default chunk size: 1 MiB.
const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Global configuration for a BusTunnel node.
///
/// # Examples
///
/// ```
/// use bustunnel_core::TunnelConfig;
///
/// let config = TunnelConfig::default();
/// assert_eq!(config.chunk_size, 1024 * 1024);
/// assert_eq!(config.messages_per_send, 10);
/// assert_eq!(config.forwarding_host, "localhost");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    /// Bind address for the HTTP front (e.g. `"0.0.0.0:5000"`).
    #[builder(default = String::from("0.0.0.0:5000"))]
    pub gateway_listen: String,

    /// Size of a transfer chunk in bytes.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Number of chunk messages grouped into one bus send.
    #[builder(default = 10)]
    pub messages_per_send: usize,

    /// Upper bound of concurrently running consumer handlers.
    #[builder(default = 1)]
    pub max_concurrent_calls: usize,

    /// Host the reverse proxy forwards tunneled requests to.
    #[builder(default = String::from("localhost"))]
    pub forwarding_host: String,

    /// Port the reverse proxy forwards tunneled requests to.
    #[builder(default = 5000)]
    pub forwarding_port: u16,

    /// Per-call timeout of forwarded requests, in milliseconds.
    #[builder(default = 120_000)]
    pub forwarding_timeout_ms: u64,

    /// Debounce delay at the start of every stitch cycle, in milliseconds.
    #[builder(default = 2_000)]
    pub stitch_delay_ms: u64,

    /// Number of retries after the first failed attempt.
    #[builder(default = 3)]
    pub retry_max_retries: usize,

    /// Base delay of the exponential backoff, in milliseconds.
    #[builder(default = 500)]
    pub retry_base_delay_ms: u64,

    /// Whether front requests must carry an `authorization` header.
    #[builder(default = false)]
    pub require_authorization: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:5000"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            messages_per_send: 10,
            max_concurrent_calls: 1,
            forwarding_host: String::from("localhost"),
            forwarding_port: 5000,
            forwarding_timeout_ms: 120_000,
            stitch_delay_ms: 2_000,
            retry_max_retries: 3,
            retry_base_delay_ms: 500,
            require_authorization: false,
            log_level: String::from("info"),
        }
    }
}

impl TunnelConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:5000` |
    /// | `CHUNK_SIZE_BYTES` | `1048576` |
    /// | `MESSAGES_PER_SEND` | `10` |
    /// | `MAX_CONCURRENT_CALLS` | `1` |
    /// | `FORWARDING_HOST` | `localhost` |
    /// | `FORWARDING_PORT` | `5000` |
    /// | `FORWARDING_TIMEOUT_MS` | `120000` |
    /// | `STITCH_DELAY_MS` | `2000` |
    /// | `RETRY_MAX_RETRIES` | `3` |
    /// | `RETRY_BASE_DELAY_MS` | `500` |
    /// | `REQUIRE_AUTHORIZATION` | `false` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Values that fail to parse keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        parse_into(&mut config.chunk_size, "CHUNK_SIZE_BYTES");
        parse_into(&mut config.messages_per_send, "MESSAGES_PER_SEND");
        parse_into(&mut config.max_concurrent_calls, "MAX_CONCURRENT_CALLS");
        if let Ok(v) = std::env::var("FORWARDING_HOST") {
            config.forwarding_host = v;
        }
        parse_into(&mut config.forwarding_port, "FORWARDING_PORT");
        parse_into(&mut config.forwarding_timeout_ms, "FORWARDING_TIMEOUT_MS");
        parse_into(&mut config.stitch_delay_ms, "STITCH_DELAY_MS");
        parse_into(&mut config.retry_max_retries, "RETRY_MAX_RETRIES");
        parse_into(&mut config.retry_base_delay_ms, "RETRY_BASE_DELAY_MS");
        if let Ok(v) = std::env::var("REQUIRE_AUTHORIZATION") {
            config.require_authorization = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Reject values that would make a transfer impossible.
    pub fn validate(&self) -> Result<(), TunnelError> {
        if self.chunk_size == 0 {
            return Err(TunnelError::Config("chunk size must be positive".to_owned()));
        }
        if self.messages_per_send == 0 {
            return Err(TunnelError::Config(
                "messages per send must be positive".to_owned(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(TunnelError::Config(
                "max concurrent calls must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Timeout applied to every forwarded request.
    #[must_use]
    pub fn forwarding_timeout(&self) -> Duration {
        Duration::from_millis(self.forwarding_timeout_ms)
    }

    /// Debounce delay of the stitch loop.
    #[must_use]
    pub fn stitch_delay(&self) -> Duration {
        Duration::from_millis(self.stitch_delay_ms)
    }

    /// Retry policy for block store and bus calls.
    #[must_use]
    pub fn remote_policy(&self) -> RetryPolicy {
        RetryPolicy::remote(
            self.retry_max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Retry policy for filesystem checks and opens.
    #[must_use]
    pub fn local_policy(&self) -> RetryPolicy {
        RetryPolicy::local(
            self.retry_max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

/// Overwrite `slot` with the parsed value of `var`, if present and valid.
fn parse_into<T: std::str::FromStr>(slot: &mut T, var: &str) {
    if let Ok(v) = std::env::var(var) {
        match v.trim().parse::<T>() {
            Ok(n) => *slot = n,
            Err(_) => tracing::warn!(var, value = %v, "ignoring unparseable configuration value"),
        }
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
