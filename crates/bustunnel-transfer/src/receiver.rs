//! Receiving side of tunneled chunk requests.

use std::sync::Arc;

use bustunnel_core::{RetryPolicy, TunnelError, TunnelResult};
use bustunnel_model::{BlockId, ChunkQuery};
use bustunnel_store::BlockStore;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::blob::blob_name;
use crate::staging::StagingArea;

/// Handles `POST` and `GET /api/filechunk`.
pub struct ChunkReceiver {
    store: Arc<dyn BlockStore>,
    remote: RetryPolicy,
    local: RetryPolicy,
}

impl std::fmt::Debug for ChunkReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReceiver")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl ChunkReceiver {
    /// Create a receiver.
    #[must_use]
    pub fn new(store: Arc<dyn BlockStore>, remote: RetryPolicy, local: RetryPolicy) -> Self {
        Self {
            store,
            remote,
            local,
        }
    }

    /// Stage an uploaded chunk as a block of the file's blob.
    pub async fn receive_upload_chunk(&self, query: &ChunkQuery, body: Bytes) -> TunnelResult<BlockId> {
        let len = body.len() as u64;
        if len == 0 || len > query.length {
            return Err(TunnelError::InvalidRequest(format!(
                "chunk body of {len} bytes does not fit chunk size {}",
                query.length
            )));
        }
        let id = query.block_id()?;
        let blob = blob_name(&query.path);

        self.remote
            .run("put_block", || self.store.put_block(&blob, id, body.clone()))
            .await?;
        debug!(path = %query.path, block_id = %id, size = len, "upload chunk staged");
        Ok(id)
    }

    /// Copy one chunk of the blob into the file's staging area.
    ///
    /// Returns the number of bytes written, which is short only for the
    /// final chunk.
    pub async fn receive_download_chunk(&self, query: &ChunkQuery) -> TunnelResult<u64> {
        let id = query.block_id()?;
        let blob = blob_name(&query.path);
        if !self.remote.run("exists", || self.store.exists(&blob)).await? {
            return Err(TunnelError::NotFound { resource: blob });
        }

        let staging = StagingArea::for_destination(&query.path);
        if !self.local.run("check_staging", || staging.exists()).await? {
            return Err(TunnelError::NotFound {
                resource: staging.dir().display().to_string(),
            });
        }

        let store = &self.store;
        let blob = blob.as_str();
        let (start, limit) = (query.start_index, query.length);
        let data = self
            .remote
            .run("read_range", move || async move {
                let mut reader = store.open_read_range(blob, start).await?.take(limit);
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| TunnelError::remote("read_range", e))?;
                Ok(Bytes::from(buf))
            })
            .await?;

        let written = self
            .local
            .run("stage_chunk", || staging.write_chunk(id, &data[..], limit))
            .await?;

        debug!(path = %query.path, block_id = %id, written, "download chunk staged");
        Ok(written)
    }
}
