//! The closed set of HTTP methods a tunnel request may carry.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ModelError;

/// HTTP method of a tunneled request.
///
/// `CONNECT` is deliberately absent: it has no meaning once the request has
/// been taken off the wire and replayed against a fixed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
    /// `PATCH`
    Patch,
}

impl HttpMethod {
    /// Every supported method, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Options,
        Self::Trace,
        Self::Patch,
    ];

    /// The lowercase wire spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Head => "head",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Trace => "trace",
            Self::Patch => "patch",
        }
    }

    /// The equivalent [`http::Method`].
    #[must_use]
    pub fn to_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Head => http::Method::HEAD,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Options => http::Method::OPTIONS,
            Self::Trace => http::Method::TRACE,
            Self::Patch => http::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::InvalidMethod(s.to_owned()))
    }
}

impl TryFrom<&http::Method> for HttpMethod {
    type Error = ModelError;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_case_insensitively() {
        assert_eq!("GET".parse::<HttpMethod>().ok(), Some(HttpMethod::Get));
        assert_eq!("Patch".parse::<HttpMethod>().ok(), Some(HttpMethod::Patch));
        for method in HttpMethod::ALL {
            assert_eq!(method.as_str().parse::<HttpMethod>().ok(), Some(method));
        }
    }

    #[test]
    fn test_should_reject_connect() {
        assert!(matches!(
            "connect".parse::<HttpMethod>(),
            Err(ModelError::InvalidMethod(m)) if m == "connect"
        ));
        assert!(HttpMethod::try_from(&http::Method::CONNECT).is_err());
    }

    #[test]
    fn test_should_map_to_http_method() {
        assert_eq!(HttpMethod::Delete.to_http(), http::Method::DELETE);
        assert_eq!(
            HttpMethod::try_from(&http::Method::OPTIONS).ok(),
            Some(HttpMethod::Options)
        );
    }
}
