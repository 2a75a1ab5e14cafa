//! Response construction and error formatting.

use bustunnel_core::{ErrorKind, TunnelError};
use bytes::Bytes;
use http::{HeaderValue, StatusCode};

use crate::TunnelBody;

/// Content type of every JSON response.
pub const CONTENT_TYPE: &str = "application/json";

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP status for an error kind.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidMethod | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::TransientIo => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serialize an error into a JSON body.
///
/// ```json
/// { "__type": "Conflict", "kind": "Conflict", "message": "conflict: /data/a already exists" }
/// ```
#[must_use]
pub fn error_to_json(error: &TunnelError) -> serde_json::Value {
    serde_json::json!({
        "__type": error.type_name(),
        "kind": error.kind().as_str(),
        "message": error.to_string(),
    })
}

/// Convert a [`TunnelError`] into a complete HTTP error response.
#[must_use]
pub fn error_to_response(error: &TunnelError, request_id: &str) -> http::Response<TunnelBody> {
    json_response(status_for(error.kind()), &error_to_json(error), request_id)
}

/// An error response with a fixed status and message, for failures that
/// happen before the transfer layer is reached.
#[must_use]
pub fn plain_error(status: StatusCode, error_type: &str, message: &str, request_id: &str) -> http::Response<TunnelBody> {
    let json = serde_json::json!({ "__type": error_type, "message": message });
    json_response(status, &json, request_id)
}

/// Build a JSON response with `status`.
#[must_use]
pub fn json_response(
    status: StatusCode,
    json: &serde_json::Value,
    request_id: &str,
) -> http::Response<TunnelBody> {
    let body = TunnelBody::new(Bytes::from(json.to_string()));
    let mut response = http::Response::new(body);
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    response
}
