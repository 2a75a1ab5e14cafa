//! Replays a [`TunnelRequest`] as a real HTTP call.

use std::time::Duration;

use bustunnel_core::{TunnelConfig, TunnelError, TunnelResult};
use bustunnel_model::TunnelRequest;
use http::StatusCode;
use tracing::{trace, warn};

/// Headers that belong to the original connection and are never replayed.
const SKIPPED_HEADERS: [&str; 4] = ["host", "content-length", "connection", "transfer-encoding"];

/// Transport-level failure of a forwarded call.
#[derive(Debug, thiserror::Error)]
#[error("{kind} error forwarding to {url}: {source}")]
pub struct ForwardError {
    /// Failure class, e.g. `"Connect"` or `"Timeout"`.
    pub kind: &'static str,
    /// Target URL.
    pub url: String,
    /// The client error.
    #[source]
    pub source: reqwest::Error,
}

impl ForwardError {
    fn new(url: String, source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            "Timeout"
        } else if source.is_connect() {
            "Connect"
        } else if source.is_request() {
            "Request"
        } else if source.is_body() {
            "Body"
        } else {
            "Transport"
        };
        Self { kind, url, source }
    }
}

impl From<ForwardError> for TunnelError {
    fn from(err: ForwardError) -> Self {
        TunnelError::remote("forward", err)
    }
}

/// HTTP client bound to one upstream host and port.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    host: String,
    port: u16,
}

impl HttpForwarder {
    /// Create a forwarder with a per-call `timeout`.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> TunnelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TunnelError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            host: host.into(),
            port,
        })
    }

    /// Forwarder for the configured host, port, and timeout.
    pub fn from_config(config: &TunnelConfig) -> TunnelResult<Self> {
        Self::new(
            config.forwarding_host.clone(),
            config.forwarding_port,
            config.forwarding_timeout(),
        )
    }

    /// Upstream host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Upstream port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port/path?query` for `request`.
    #[must_use]
    pub fn target_url(&self, request: &TunnelRequest) -> String {
        format!("http://{}:{}{}", self.host, self.port, request.path_and_query())
    }

    /// Issue `request` upstream and return the response status.
    pub async fn forward(&self, request: &TunnelRequest) -> Result<StatusCode, ForwardError> {
        let url = self.target_url(request);
        let mut builder = self.client.request(request.method.to_http(), &url);

        for (name, value) in &request.headers {
            if SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            match (
                http::HeaderName::try_from(name.as_str()),
                http::HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => warn!(header = %name, "dropping header that is not valid HTTP"),
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ForwardError::new(url.clone(), e))?;
        let status = response.status();
        trace!(%url, %status, "forwarded request");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use bustunnel_model::HttpMethod;

    use super::*;

    #[test]
    fn test_should_compose_target_url() {
        let forwarder = HttpForwarder::new("localhost", 5000, Duration::from_secs(1)).unwrap();
        let request = TunnelRequest::builder()
            .host("/")
            .method(HttpMethod::Get)
            .path("/api/values")
            .query_pair("id", "a b")
            .build()
            .unwrap();
        assert_eq!(
            forwarder.target_url(&request),
            "http://localhost:5000/api/values?id=a+b"
        );
    }

    #[test]
    fn test_should_use_configured_upstream() {
        let config = TunnelConfig::builder()
            .forwarding_host("10.1.2.3".into())
            .forwarding_port(8081)
            .build();
        let forwarder = HttpForwarder::from_config(&config).unwrap();
        assert_eq!(forwarder.host(), "10.1.2.3");
        assert_eq!(forwarder.port(), 8081);
    }
}
