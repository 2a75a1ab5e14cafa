//! Reverse proxy consumer for BusTunnel.
//!
//! [`ReverseProxyConsumer`] subscribes to the bus, decodes each tunneled
//! request, replays it against a fixed upstream through [`HttpForwarder`],
//! and settles the message: `200` completes it, anything else dead-letters
//! it. Redelivery of failures is left to the bus.

pub mod consumer;
pub mod forwarder;

pub use consumer::ReverseProxyConsumer;
pub use forwarder::{ForwardError, HttpForwarder};
