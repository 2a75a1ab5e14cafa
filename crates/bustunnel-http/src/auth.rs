//! Authorization interceptor run before routing.

use std::sync::Arc;

use bustunnel_core::TunnelConfig;
use http::HeaderMap;

/// Decides whether a request may reach the transfer operations.
pub trait Authorizer: Send + Sync + 'static {
    /// `true` if a request with `headers` is authorized.
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

/// Lets every request through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires a non-empty `authorization` header. Validating the credential is
/// left to the identity provider in front of the node.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireAuthorizationHeader;

impl Authorizer for RequireAuthorizationHeader {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        headers
            .get(http::header::AUTHORIZATION)
            .is_some_and(|v| !v.is_empty())
    }
}

/// The authorizer selected by `REQUIRE_AUTHORIZATION`.
#[must_use]
pub fn authorizer_from_config(config: &TunnelConfig) -> Arc<dyn Authorizer> {
    if config.require_authorization {
        Arc::new(RequireAuthorizationHeader)
    } else {
        Arc::new(AllowAll)
    }
}
