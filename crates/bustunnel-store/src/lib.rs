//! Block-oriented object store adapter for BusTunnel.
//!
//! A blob is assembled from independently uploaded blocks. Blocks become
//! visible only when their ids appear in a committed block list, and the
//! blob's content follows the order of that list, never the upload order.

mod memory;

use async_trait::async_trait;
use bustunnel_core::TunnelResult;
use bustunnel_model::BlockId;
use bytes::Bytes;
use tokio::io::AsyncRead;

pub use memory::InMemoryBlockStore;

/// Stream returned by [`BlockStore::open_read_range`].
pub type BlockReader = Box<dyn AsyncRead + Send + Unpin>;

/// Narrow interface over a block blob service.
///
/// Implementations report failures as [`bustunnel_core::TunnelError`]; an
/// absent blob is `NotFound`. Callers wrap every call in the remote retry
/// policy.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Whether `blob` exists.
    async fn exists(&self, blob: &str) -> TunnelResult<bool>;

    /// Committed byte length of `blob`.
    async fn length(&self, blob: &str) -> TunnelResult<u64>;

    /// Stage one block. Staging the same id again replaces it.
    async fn put_block(&self, blob: &str, id: BlockId, data: Bytes) -> TunnelResult<()>;

    /// Replace the blob's committed block list with `ids`, in order.
    async fn commit_block_list(&self, blob: &str, ids: &[BlockId]) -> TunnelResult<()>;

    /// Read `blob` from `offset` to the end.
    async fn open_read_range(&self, blob: &str, offset: u64) -> TunnelResult<BlockReader>;
}
