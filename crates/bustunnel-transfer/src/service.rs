//! Transfer operations exposed to the routing layer.

use std::path::Path;
use std::sync::Arc;

use bustunnel_bus::MessageBus;
use bustunnel_core::{RetryPolicy, TunnelConfig, TunnelError, TunnelResult};
use bustunnel_model::{BlockId, ChunkQuery, StitchQuery, TransferJob};
use bustunnel_store::BlockStore;
use bytes::Bytes;
use tokio::fs;
use tracing::info;

use crate::blob::blob_name;
use crate::dispatcher::{BulkDispatcher, DispatchReport};
use crate::messages::with_correlation;
use crate::receiver::ChunkReceiver;
use crate::staging::{StagingArea, io_error};
use crate::stitcher::{StitchOutcome, Stitcher};

/// Upload, download, chunk and stitch operations.
///
/// Every operation reports failures as [`TunnelError`]s whose kind the
/// routing layer turns into not-found, forbidden, or conflict responses.
pub struct TransferService {
    store: Arc<dyn BlockStore>,
    chunk_size: u64,
    remote: RetryPolicy,
    local: RetryPolicy,
    dispatcher: BulkDispatcher,
    receiver: ChunkReceiver,
    stitcher: Stitcher,
}

impl std::fmt::Debug for TransferService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferService")
            .field("chunk_size", &self.chunk_size)
            .field("dispatcher", &self.dispatcher)
            .field("stitcher", &self.stitcher)
            .finish_non_exhaustive()
    }
}

impl TransferService {
    /// Wire a service from configuration.
    #[must_use]
    pub fn new(config: &TunnelConfig, bus: Arc<dyn MessageBus>, store: Arc<dyn BlockStore>) -> Self {
        let remote = config.remote_policy();
        let local = config.local_policy();
        Self {
            dispatcher: BulkDispatcher::new(
                Arc::clone(&bus),
                Arc::clone(&store),
                config.messages_per_send,
                remote,
                local,
            ),
            receiver: ChunkReceiver::new(Arc::clone(&store), remote, local),
            stitcher: Stitcher::new(bus, config.stitch_delay(), remote, local),
            store,
            chunk_size: config.chunk_size,
            remote,
            local,
        }
    }

    /// Upload the local file at `path` into its blob.
    pub async fn begin_upload(
        &self,
        path: &str,
        headers: &[(String, String)],
    ) -> TunnelResult<DispatchReport> {
        let source = Path::new(path);
        let meta = self
            .local
            .run("stat_source", move || async move {
                fs::metadata(source).await.map_err(|e| io_error(e, source))
            })
            .await?;
        if !meta.is_file() {
            return Err(TunnelError::InvalidRequest(format!("{path} is not a file")));
        }

        let job = TransferJob::new(path, meta.len(), self.chunk_size)?;
        info!(path, length = job.total_length(), chunks = job.chunk_count(), "upload requested");
        self.dispatcher
            .dispatch_upload(&job, &with_correlation(headers))
            .await
    }

    /// Download the blob of `path` into a new local file at `path`.
    pub async fn begin_download(
        &self,
        path: &str,
        headers: &[(String, String)],
    ) -> TunnelResult<DispatchReport> {
        let destination = Path::new(path);
        let staging = StagingArea::for_destination(destination);

        let present = self
            .local
            .run("stat_destination", move || async move {
                fs::try_exists(destination)
                    .await
                    .map_err(|e| io_error(e, destination))
            })
            .await?;
        if present {
            return Err(TunnelError::Conflict {
                resource: path.to_owned(),
            });
        }
        if self.local.run("check_staging", || staging.exists()).await? {
            return Err(TunnelError::Conflict {
                resource: staging.dir().display().to_string(),
            });
        }

        let blob = blob_name(path);
        if !self.remote.run("exists", || self.store.exists(&blob)).await? {
            return Err(TunnelError::NotFound { resource: blob });
        }
        let length = self.remote.run("length", || self.store.length(&blob)).await?;
        let job = TransferJob::new(path, length, self.chunk_size)?;

        staging.create().await?;
        info!(path, length, chunks = job.chunk_count(), "download requested");
        self.dispatcher
            .dispatch_download(&job, &with_correlation(headers))
            .await
    }

    /// Handle a tunneled upload chunk.
    pub async fn receive_upload_chunk(&self, query: &ChunkQuery, body: Bytes) -> TunnelResult<BlockId> {
        self.receiver.receive_upload_chunk(query, body).await
    }

    /// Handle a tunneled download chunk.
    pub async fn receive_download_chunk(&self, query: &ChunkQuery) -> TunnelResult<u64> {
        self.receiver.receive_download_chunk(query).await
    }

    /// Run one stitch cycle.
    pub async fn stitch(
        &self,
        query: &StitchQuery,
        headers: &[(String, String)],
    ) -> TunnelResult<StitchOutcome> {
        self.stitcher.run_cycle(query, headers).await
    }
}
