//! Error taxonomy shared by every BusTunnel component.
//!
//! Each [`TunnelError`] belongs to an [`ErrorKind`]. The retry policies
//! decide on the kind (never on the concrete variant), and the HTTP layer maps
//! kinds to status codes.

use std::fmt;
use std::io;

/// Coarse classification of a [`TunnelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Source file, blob, or directory is absent.
    NotFound,
    /// Permission or security failure. Never retried.
    Forbidden,
    /// Destination already exists where a fresh transfer was expected.
    Conflict,
    /// Tunnel decode failure on an unsupported HTTP method.
    InvalidMethod,
    /// Malformed input or contract violation by the caller.
    InvalidRequest,
    /// Transient failure that a retry may cure.
    TransientIo,
    /// Non-retryable, or retries were exhausted.
    Fatal,
}

impl ErrorKind {
    /// Returns the string value of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Forbidden => "Forbidden",
            Self::Conflict => "Conflict",
            Self::InvalidMethod => "InvalidMethod",
            Self::InvalidRequest => "InvalidRequest",
            Self::TransientIo => "TransientIO",
            Self::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for BusTunnel.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// The named resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// File path, blob name, or directory that was absent.
        resource: String,
    },

    /// Access to the named resource was denied.
    #[error("forbidden: {resource}")]
    Forbidden {
        /// File path, blob name, or directory that was denied.
        resource: String,
    },

    /// The named resource already exists.
    #[error("conflict: {resource} already exists")]
    Conflict {
        /// File path or staging area that already existed.
        resource: String,
    },

    /// The HTTP method is outside the tunneled set.
    #[error("invalid http method {method}")]
    InvalidMethod {
        /// The rejected method string.
        method: String,
    },

    /// The request violates an input contract.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A local I/O failure that is worth retrying.
    #[error("transient I/O failure: {context}: {source}")]
    TransientIo {
        /// What was being done when the failure happened.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A block store or bus call failed.
    #[error("{operation} failed: {message}")]
    Remote {
        /// The remote operation, e.g. `"commit_block_list"`.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A message lock token is unknown or already settled.
    #[error("message lock lost: {token}")]
    LockLost {
        /// The stale lock token.
        token: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl TunnelError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidMethod { .. } => ErrorKind::InvalidMethod,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::TransientIo { .. } | Self::Remote { .. } => ErrorKind::TransientIo,
            Self::LockLost { .. } | Self::Config(_) | Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Name of the variant, used as the `error_type` log field.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Forbidden { .. } => "Forbidden",
            Self::Conflict { .. } => "Conflict",
            Self::InvalidMethod { .. } => "InvalidMethod",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::TransientIo { .. } => "TransientIo",
            Self::Remote { .. } => "Remote",
            Self::LockLost { .. } => "LockLost",
            Self::Config(_) => "Config",
            Self::Fatal(_) => "Fatal",
        }
    }

    /// Classify an I/O error raised while touching `resource`.
    ///
    /// `NotFound` and `PermissionDenied` keep their meaning; every other
    /// kind is treated as transient.
    pub fn from_io(err: io::Error, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { resource },
            io::ErrorKind::PermissionDenied => Self::Forbidden { resource },
            _ => Self::TransientIo {
                context: resource,
                source: err,
            },
        }
    }

    /// Build a [`TunnelError::Remote`] from any displayable failure.
    pub fn remote(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Remote {
            operation,
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for TunnelError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err, "io")
    }
}

/// Convenience result type for BusTunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;
