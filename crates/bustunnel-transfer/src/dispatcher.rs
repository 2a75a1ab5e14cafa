//! Bulk dispatch of chunk messages.
//!
//! Chunks are processed in batches of `messages_per_send`, in ascending index
//! order. For uploads, the cumulative block list (every id up to the end of
//! the batch) is committed before the batch is sent, so the blob's block
//! order is fixed before any block arrives and no index is ever skipped.
//! A batch is only sent once the previous one went out.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use bustunnel_bus::MessageBus;
use bustunnel_core::{RetryPolicy, TunnelResult};
use bustunnel_model::{BlockId, BusMessage, ChunkDescriptor, StitchQuery, TransferJob};
use bustunnel_store::BlockStore;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::blob::blob_name;
use crate::messages::{download_chunk_message, stitch_message, upload_chunk_message};
use crate::staging::io_error;

/// Summary of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Chunk messages sent.
    pub chunks: u64,
    /// Bus sends issued for chunk messages.
    pub batches: u64,
}

/// Turns a [`TransferJob`] into ordered bus traffic.
pub struct BulkDispatcher {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn BlockStore>,
    messages_per_send: usize,
    remote: RetryPolicy,
    local: RetryPolicy,
}

impl std::fmt::Debug for BulkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkDispatcher")
            .field("messages_per_send", &self.messages_per_send)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl BulkDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn BlockStore>,
        messages_per_send: usize,
        remote: RetryPolicy,
        local: RetryPolicy,
    ) -> Self {
        Self {
            bus,
            store,
            messages_per_send: messages_per_send.max(1),
            remote,
            local,
        }
    }

    /// Upload the local file at `job.path()`.
    ///
    /// A zero-length file commits an empty block list so the blob exists.
    pub async fn dispatch_upload(
        &self,
        job: &TransferJob,
        headers: &[(String, String)],
    ) -> TunnelResult<DispatchReport> {
        let blob = blob_name(job.path());
        let source = Path::new(job.path());
        let mut report = DispatchReport::default();
        let mut committed: Vec<BlockId> = Vec::new();

        if job.chunk_count() == 0 {
            self.commit(&blob, &committed).await?;
        }

        for range in job.batches(self.messages_per_send) {
            let mut messages = Vec::with_capacity(self.messages_per_send);
            for chunk in job.chunks_in(range.clone()) {
                let body = self
                    .local
                    .run("read_chunk", || read_chunk(source, chunk))
                    .await?;
                messages.push(upload_chunk_message(job, &chunk, body, headers)?);
                committed.push(chunk.block_id());
            }

            self.commit(&blob, &committed).await?;
            self.send(messages).await?;

            report.chunks += range.end - range.start;
            report.batches += 1;
            debug!(path = job.path(), first = range.start, end = range.end, "upload batch sent");
        }

        info!(
            path = job.path(),
            length = job.total_length(),
            chunks = report.chunks,
            batches = report.batches,
            "upload dispatched"
        );
        Ok(report)
    }

    /// Request every chunk of `job`, then announce the stitch.
    pub async fn dispatch_download(
        &self,
        job: &TransferJob,
        headers: &[(String, String)],
    ) -> TunnelResult<DispatchReport> {
        let mut report = DispatchReport::default();

        for range in job.batches(self.messages_per_send) {
            let messages = job
                .chunks_in(range.clone())
                .map(|chunk| download_chunk_message(job, &chunk, headers))
                .collect::<TunnelResult<Vec<_>>>()?;
            self.send(messages).await?;

            report.chunks += range.end - range.start;
            report.batches += 1;
            debug!(path = job.path(), first = range.start, end = range.end, "download batch sent");
        }

        let stitch = stitch_message(&StitchQuery::for_job(job), headers)?;
        self.remote
            .run("send_stitch", || self.bus.send(stitch.clone()))
            .await?;

        info!(
            path = job.path(),
            length = job.total_length(),
            chunks = report.chunks,
            batches = report.batches,
            "download dispatched"
        );
        Ok(report)
    }

    async fn commit(&self, blob: &str, ids: &[BlockId]) -> TunnelResult<()> {
        self.remote
            .run("commit_block_list", || self.store.commit_block_list(blob, ids))
            .await
    }

    async fn send(&self, messages: Vec<BusMessage>) -> TunnelResult<()> {
        self.remote
            .run("send_batch", || self.bus.send_batch(messages.clone()))
            .await
    }
}

/// Read the bytes of `chunk` from `source`.
async fn read_chunk(source: &Path, chunk: ChunkDescriptor) -> TunnelResult<Bytes> {
    let mut file = fs::File::open(source)
        .await
        .map_err(|e| io_error(e, source))?;
    file.seek(SeekFrom::Start(chunk.start_offset))
        .await
        .map_err(|e| io_error(e, source))?;

    let len = usize::try_from(chunk.length).map_err(|e| anyhow::anyhow!(e))?;
    let mut buf = vec![0_u8; len];
    file.read_exact(&mut buf)
        .await
        .map_err(|e| io_error(e, source))?;
    Ok(Bytes::from(buf))
}
