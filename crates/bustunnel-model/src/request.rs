//! Tunnel request and its JSON codec.
//!
//! A [`TunnelRequest`] is the description of an HTTP call carried inside a
//! bus message body. The encoding is a JSON object whose field names are kept
//! stable across versions:
//!
//! ```json
//! {
//!   "host": "/",
//!   "method": "post",
//!   "path": "/api/filechunk",
//!   "query": "path=%2Fdata%2Fa.bin&startIndex=0&length=4",
//!   "headers": [["x-caller", "ops"]],
//!   "body": "AAECAw=="
//! }
//! ```
//!
//! `body` is base64 so arbitrary bytes survive the trip.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ModelError;
use crate::method::HttpMethod;
use crate::params::encode_query;

/// An HTTP request description carried through the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRequest {
    /// Logical host. Mandatory, even though the consumer forwards to its own
    /// configured upstream.
    pub host: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Request path, starting with `/`.
    pub path: String,
    /// Encoded query string, without the leading `?`.
    pub query: String,
    /// Ordered header list. Duplicate keys are allowed.
    pub headers: Vec<(String, String)>,
    /// Request body.
    #[serde(serialize_with = "serialize_body")]
    pub body: Bytes,
}

/// Decoding counterpart of [`TunnelRequest`] that keeps the method as a raw
/// string so an unsupported one surfaces as [`ModelError::InvalidMethod`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    #[serde(default)]
    host: String,
    method: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: String,
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

impl TunnelRequest {
    /// Start building a request.
    #[must_use]
    pub fn builder() -> TunnelRequestBuilder {
        TunnelRequestBuilder::default()
    }

    /// Encode into a bus message body.
    ///
    /// Fails on an empty host or an empty query string.
    pub fn encode(&self) -> Result<Bytes, ModelError> {
        if self.host.is_empty() {
            return Err(ModelError::MissingHost);
        }
        if self.query.is_empty() {
            return Err(ModelError::EmptyQuery);
        }
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a bus message body.
    pub fn decode(bytes: &[u8]) -> Result<Self, ModelError> {
        let wire: WireRequest = serde_json::from_slice(bytes)?;
        let method = wire.method.parse::<HttpMethod>()?;
        if wire.host.is_empty() {
            return Err(ModelError::MissingHost);
        }
        let body = STANDARD
            .decode(wire.body.as_bytes())
            .map_err(|e| ModelError::InvalidParameter {
                name: "body",
                reason: e.to_string(),
            })?;

        Ok(Self {
            host: wire.host,
            method,
            path: wire.path,
            query: wire.query,
            headers: wire.headers,
            body: Bytes::from(body),
        })
    }

    /// `path?query`, or just the path when the query is empty.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Builder for [`TunnelRequest`].
///
/// Query parameters are collected as pairs and encoded once in
/// [`build`](Self::build), which refuses to produce a request with no query
/// parameters.
#[derive(Debug, Default)]
pub struct TunnelRequestBuilder {
    host: String,
    method: Option<HttpMethod>,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl TunnelRequestBuilder {
    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the method. Defaults to `GET`.
    #[must_use]
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Append one query parameter.
    #[must_use]
    pub fn query_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters.
    #[must_use]
    pub fn query_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Append one header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Append several headers, keeping their order.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finish the request.
    pub fn build(self) -> Result<TunnelRequest, ModelError> {
        if self.host.is_empty() {
            return Err(ModelError::MissingHost);
        }
        let query = encode_query(&self.query)?;

        Ok(TunnelRequest {
            host: self.host,
            method: self.method.unwrap_or(HttpMethod::Get),
            path: self.path,
            query,
            headers: self.headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TunnelRequest {
        TunnelRequest::builder()
            .host("/")
            .method(HttpMethod::Post)
            .path("/api/filechunk")
            .query_pair("path", "/data/my file&co.bin")
            .query_pair("startIndex", "0")
            .query_pair("length", "4")
            .header("x-caller", "ops")
            .header("x-caller", "batch")
            .body(vec![0_u8, 1, 2, 255])
            .build()
            .expect("test request")
    }

    #[test]
    fn test_should_round_trip_through_codec() {
        let request = sample();
        let bytes = request.encode().expect("test encode");
        let decoded = TunnelRequest::decode(&bytes).expect("test decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_should_encode_body_as_base64_json() {
        let bytes = sample().encode().expect("test encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("test json");
        assert_eq!(value["method"], "post");
        assert_eq!(value["host"], "/");
        assert_eq!(value["body"], "AAEC/w==");
        assert_eq!(value["headers"][1][1], "batch");
    }

    #[test]
    fn test_should_keep_special_characters_in_query() {
        let request = sample();
        let pairs: Vec<(String, String)> = form_urlencoded::parse(request.query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(pairs[0].1, "/data/my file&co.bin");
        assert!(request.path_and_query().starts_with("/api/filechunk?path="));
    }

    #[test]
    fn test_should_reject_unsupported_method_on_decode() {
        let body = br#"{"host":"/","method":"connect","path":"/","query":"a=1","headers":[],"body":""}"#;
        assert!(matches!(
            TunnelRequest::decode(body),
            Err(ModelError::InvalidMethod(m)) if m == "connect"
        ));
    }

    #[test]
    fn test_should_reject_missing_host() {
        let body = br#"{"method":"get","path":"/","query":"a=1"}"#;
        assert!(matches!(
            TunnelRequest::decode(body),
            Err(ModelError::MissingHost)
        ));

        let result = TunnelRequest::builder().path("/api/values").query_pair("a", "1").build();
        assert!(matches!(result, Err(ModelError::MissingHost)));
    }

    #[test]
    fn test_should_fail_fast_on_empty_query() {
        let result = TunnelRequest::builder().host("/").path("/api/values").build();
        assert!(matches!(result, Err(ModelError::EmptyQuery)));

        let mut request = sample();
        request.query.clear();
        assert!(matches!(request.encode(), Err(ModelError::EmptyQuery)));
    }

    #[test]
    fn test_should_reject_garbage_body() {
        assert!(matches!(
            TunnelRequest::decode(b"not json"),
            Err(ModelError::Json(_))
        ));
    }
}
