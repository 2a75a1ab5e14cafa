//! Contract violations raised by the model layer.

use bustunnel_core::TunnelError;

/// Error raised while building, encoding, or decoding model types.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The method is outside the tunneled set.
    #[error("invalid http method {0}")]
    InvalidMethod(String),

    /// A tunnel request without a host.
    #[error("'host' is a required field")]
    MissingHost,

    /// A query string was requested from zero key/value pairs.
    #[error("a query string needs at least one key/value pair")]
    EmptyQuery,

    /// A required query parameter is absent or malformed.
    #[error("query parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A string is not a well-formed block id.
    #[error("invalid block id {0:?}")]
    InvalidBlockId(String),

    /// A chunk size of zero, or a job too large to address.
    #[error("invalid transfer plan: {0}")]
    InvalidPlan(String),

    /// The message body is not a valid tunnel request document.
    #[error("malformed tunnel request: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ModelError> for TunnelError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidMethod(method) => Self::InvalidMethod { method },
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}
