//! Wire types, tunnel codec, and chunk planning for BusTunnel.
//!
//! - [`method`]: the closed set of tunneled HTTP methods.
//! - [`request`]: [`TunnelRequest`], its builder, and the JSON codec that
//!   carries it inside a bus message body.
//! - [`block_id`]: fixed-width, zero-padded chunk identifiers whose
//!   lexicographic order equals their numeric order.
//! - [`plan`]: [`TransferJob`] and the lazy [`ChunkDescriptor`] sequence.
//! - [`params`]: the query records of the chunk and stitch endpoints.
//! - [`message`]: [`BusMessage`], [`Delivery`], and [`LockToken`].

pub mod block_id;
pub mod error;
pub mod message;
pub mod method;
pub mod params;
pub mod plan;
pub mod request;

pub use block_id::BlockId;
pub use error::ModelError;
pub use message::{BusMessage, Delivery, LockToken};
pub use method::HttpMethod;
pub use params::{ChunkQuery, StitchQuery};
pub use plan::{ChunkDescriptor, ChunkPlan, TransferJob};
pub use request::{TunnelRequest, TunnelRequestBuilder};
