//! In-memory [`BlockStore`].
//!
//! Staged blocks and committed lists live in two [`DashMap`]s. Ids may be
//! committed before their blocks are staged: the committed content is the
//! concatenation of the listed blocks that are present right now.

use std::io::Cursor;

use async_trait::async_trait;
use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::BlockId;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::{BlockReader, BlockStore};

/// Composite key of a staged block: `(blob, block_id)`.
type BlockKey = (String, BlockId);

/// Thread-safe in-memory block store.
///
/// # Examples
///
/// ```
/// use bustunnel_store::{BlockStore, InMemoryBlockStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBlockStore::new();
/// store.put_blob("report.bin", "hello".into()).await.unwrap();
/// assert_eq!(store.length("report.bin").await.unwrap(), 5);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: DashMap<BlockKey, Bytes>,
    committed: DashMap<String, Vec<BlockId>>,
}

impl InMemoryBlockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `data` as block 0 of `blob` and commit it.
    pub async fn put_blob(&self, blob: &str, data: Bytes) -> TunnelResult<()> {
        let id = BlockId::new(0)?;
        self.put_block(blob, id, data).await?;
        self.commit_block_list(blob, &[id]).await
    }

    /// The committed block list of `blob`, if any.
    #[must_use]
    pub fn committed_blocks(&self, blob: &str) -> Option<Vec<BlockId>> {
        self.committed.get(blob).map(|ids| ids.clone())
    }

    /// The committed content of `blob`.
    pub fn read_all(&self, blob: &str) -> TunnelResult<Bytes> {
        let ids = self
            .committed
            .get(blob)
            .ok_or_else(|| TunnelError::NotFound {
                resource: blob.to_owned(),
            })?
            .clone();

        let mut buf = BytesMut::new();
        for id in ids {
            if let Some(block) = self.blocks.get(&(blob.to_owned(), id)) {
                buf.extend_from_slice(&block);
            }
        }
        Ok(buf.freeze())
    }

    /// Number of staged blocks across all blobs.
    #[must_use]
    pub fn staged_block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn exists(&self, blob: &str) -> TunnelResult<bool> {
        Ok(self.committed.contains_key(blob))
    }

    async fn length(&self, blob: &str) -> TunnelResult<u64> {
        let ids = self
            .committed
            .get(blob)
            .ok_or_else(|| TunnelError::NotFound {
                resource: blob.to_owned(),
            })?
            .clone();

        Ok(ids
            .into_iter()
            .filter_map(|id| self.blocks.get(&(blob.to_owned(), id)))
            .map(|block| block.len() as u64)
            .sum())
    }

    async fn put_block(&self, blob: &str, id: BlockId, data: Bytes) -> TunnelResult<()> {
        trace!(blob, block_id = %id, size = data.len(), "staging block");
        self.blocks.insert((blob.to_owned(), id), data);
        Ok(())
    }

    async fn commit_block_list(&self, blob: &str, ids: &[BlockId]) -> TunnelResult<()> {
        debug!(blob, blocks = ids.len(), "committing block list");
        self.committed.insert(blob.to_owned(), ids.to_vec());
        Ok(())
    }

    async fn open_read_range(&self, blob: &str, offset: u64) -> TunnelResult<BlockReader> {
        let content = self.read_all(blob)?;
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(content.len());
        Ok(Box::new(Cursor::new(content.slice(start..))))
    }
}
