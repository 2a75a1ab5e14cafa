//! Chunked file transfer and reassembly for BusTunnel.
//!
//! Uploads move a local file into the block store: the [`BulkDispatcher`]
//! commits the ordered block list and sends one tunneled `POST` per chunk,
//! and the receiving side stages each chunk as a block.
//!
//! Downloads move a blob into a local file: the dispatcher sends one
//! tunneled `GET` per chunk plus a terminal stitch message. Each chunk lands
//! in the [`StagingArea`] and the [`Stitcher`] appends them to the
//! destination in index order, re-sending the stitch message to itself
//! until the file is whole.

pub mod blob;
pub mod dispatcher;
pub mod messages;
pub mod receiver;
pub mod service;
pub mod staging;
pub mod stitcher;

pub use blob::blob_name;
pub use dispatcher::{BulkDispatcher, DispatchReport};
pub use receiver::ChunkReceiver;
pub use service::TransferService;
pub use staging::StagingArea;
pub use stitcher::{StitchOutcome, Stitcher};
