//! Bus message envelope.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::request::TunnelRequest;

/// Content type of every tunnel message body.
pub const TUNNEL_CONTENT_TYPE: &str = "application/json";

/// A message as it travels through the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Unique message id.
    pub message_id: String,
    /// MIME type of `body`.
    pub content_type: String,
    /// Payload.
    pub body: Bytes,
    /// Application properties. Carries the original caller's HTTP headers.
    pub properties: Vec<(String, String)>,
    /// Ordering key, the chunk's block id for chunk messages.
    pub sequence_key: Option<String>,
    /// Set by the bus when the message is enqueued.
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl BusMessage {
    /// Wrap an encoded tunnel request.
    pub fn for_request(
        request: &TunnelRequest,
        properties: Vec<(String, String)>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            content_type: TUNNEL_CONTENT_TYPE.to_owned(),
            body: request.encode()?,
            properties,
            sequence_key: None,
            enqueued_at: None,
        })
    }

    /// Set the ordering key.
    #[must_use]
    pub fn with_sequence_key(mut self, key: impl Into<String>) -> Self {
        self.sequence_key = Some(key.into());
        self
    }

    /// Decode the carried tunnel request.
    pub fn decode_request(&self) -> Result<TunnelRequest, ModelError> {
        TunnelRequest::decode(&self.body)
    }
}

/// Opaque settlement token of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// A fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A message handed to a handler, with the token that settles it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The message.
    pub message: BusMessage,
    /// Token for `complete` / `dead_letter`.
    pub lock_token: LockToken,
    /// How many times this message has been delivered, starting at 1.
    pub delivery_count: u32,
}
