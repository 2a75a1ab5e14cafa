//! Self-rescheduling reassembly of downloaded files.
//!
//! Every cycle re-derives its cursor from disk: with `L` the current length
//! of the destination file, the next chunk to append is `L / chunk_size`.
//! There is no persisted counter, so duplicate or concurrent stitch messages
//! for the same file cannot corrupt it:
//!
//! 1. Sleep for the debounce delay.
//! 2. Staging area absent: already complete, nothing to do.
//! 3. `L == total`: remove the staging area, done.
//! 4. Next chunk missing or short: re-send the stitch message and wait.
//! 5. Otherwise append it, delete it, and re-send the stitch message.
//!
//! Steps 3 to 5 run under an exclusive OS-level lock on the destination, so
//! cycles in different processes never interleave, and `L` is only read once
//! the lock is held. Within one process a per-path async mutex queues cycles
//! ahead of the file lock. An append writes only at `L`; a retried attempt
//! overwrites its own partial bytes and never truncates below `L`.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bustunnel_bus::MessageBus;
use bustunnel_core::{RetryPolicy, TunnelError, TunnelResult};
use bustunnel_model::{BlockId, StitchQuery, TransferJob};
use dashmap::DashMap;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::messages::{correlation, stitch_message};
use crate::staging::{StagingArea, io_error};

/// Result of one stitch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchOutcome {
    /// The destination is whole and the staging area is gone.
    Complete,
    /// Chunk `next_index` has not fully arrived. The stitch message was
    /// re-sent.
    Waiting {
        /// Index of the awaited chunk.
        next_index: u64,
    },
    /// Chunk `index` was appended. The stitch message was re-sent.
    Appended {
        /// Index of the appended chunk.
        index: u64,
    },
}

/// Reassembles destination files from staged chunks.
pub struct Stitcher {
    bus: Arc<dyn MessageBus>,
    delay: Duration,
    remote: RetryPolicy,
    local: RetryPolicy,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for Stitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stitcher")
            .field("delay", &self.delay)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("active", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Stitcher {
    /// Create a stitcher that waits `delay` at the start of each cycle.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        delay: Duration,
        remote: RetryPolicy,
        local: RetryPolicy,
    ) -> Self {
        Self {
            bus,
            delay,
            remote,
            local,
            locks: DashMap::new(),
        }
    }

    /// Run one cycle for `query`.
    ///
    /// Unless the cycle completes or fails, the stitch message is re-sent
    /// with `headers`. A failure stops the loop: nothing is re-sent.
    pub async fn run_cycle(
        &self,
        query: &StitchQuery,
        headers: &[(String, String)],
    ) -> TunnelResult<StitchOutcome> {
        let job = query.to_job()?;
        tokio::time::sleep(self.delay).await;

        let outcome = match self.step(&job).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    path = job.path(),
                    error_type = err.type_name(),
                    correlation = correlation(headers).unwrap_or("-"),
                    error = %err,
                    "stitch halted"
                );
                return Err(err);
            }
        };

        if outcome != StitchOutcome::Complete {
            let message = stitch_message(query, headers)?;
            self.remote
                .run("send_stitch", || self.bus.send(message.clone()))
                .await?;
        }
        Ok(outcome)
    }

    async fn step(&self, job: &TransferJob) -> TunnelResult<StitchOutcome> {
        let destination = Path::new(job.path());
        let staging = StagingArea::for_destination(destination);

        if !self.local.run("check_staging", || staging.exists()).await? {
            debug!(path = job.path(), "staging area absent, nothing to stitch");
            return Ok(StitchOutcome::Complete);
        }

        let lock = Arc::clone(
            self.locks
                .entry(destination.to_path_buf())
                .or_default()
                .value(),
        );
        let _guard = lock.lock().await;

        // Held until the end of the cycle. Cycles in other processes back
        // off on contention and re-read the length once they get in.
        let target = self
            .local
            .run("lock_destination", || lock_destination(destination))
            .await?;
        let current = target
            .metadata()
            .await
            .map_err(|e| io_error(e, destination))?
            .len();

        if current == job.total_length() {
            self.local.run("remove_staging", || staging.remove()).await?;
            self.locks.remove(destination);
            info!(path = job.path(), length = current, "stitch complete");
            return Ok(StitchOutcome::Complete);
        }
        if current > job.total_length() || current % job.chunk_size() != 0 {
            return Err(TunnelError::Fatal(anyhow::anyhow!(
                "destination {} holds {current} bytes, not a chunk boundary of a {} byte file",
                job.path(),
                job.total_length()
            )));
        }

        let next_index = job.next_index(current);
        let Some(chunk) = job.chunk(next_index) else {
            return Err(TunnelError::Fatal(anyhow::anyhow!(
                "no chunk {next_index} in {}",
                job.path()
            )));
        };
        let id = chunk.block_id();

        let staged = self
            .local
            .run("chunk_length", || staging.chunk_length(id))
            .await?;
        if staged != Some(chunk.length) {
            debug!(
                path = job.path(),
                next_index,
                expected = chunk.length,
                staged = ?staged,
                "waiting for chunk"
            );
            return Ok(StitchOutcome::Waiting { next_index });
        }

        let chunk_path = staging.chunk_path(id);
        let (target, chunk_path) = (&target, chunk_path.as_path());
        self.local
            .run("append_chunk", move || async move {
                let mut handle = target
                    .try_clone()
                    .await
                    .map_err(|e| io_error(e, destination))?;
                append_at(&mut handle, destination, chunk_path, current, chunk.length).await
            })
            .await?;
        self.local.run("remove_chunk", || staging.remove_chunk(id)).await?;

        debug!(path = job.path(), index = next_index, block_id = %id, "chunk appended");
        Ok(StitchOutcome::Appended { index: next_index })
    }
}

/// Open `path`, creating it empty if needed, and take an exclusive
/// OS-level lock on it. Contention surfaces as a transient error.
///
/// The lock is released when the returned handle and its clones are closed.
async fn lock_destination(path: &Path) -> TunnelResult<fs::File> {
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|e| io_error(e, path))?
        .into_std()
        .await;
    file.try_lock()
        .map_err(|e| io_error(std::io::Error::from(e), path))?;
    Ok(fs::File::from_std(file))
}

/// Write the whole of `chunk` into the locked `target` at `offset`.
///
/// The target must hold exactly `offset` bytes, or up to `chunk_len` more
/// left behind by an interrupted attempt of the same cycle, which are
/// overwritten. Any other length means the file moved on and nothing is
/// written.
async fn append_at(
    target: &mut fs::File,
    destination: &Path,
    chunk: &Path,
    offset: u64,
    chunk_len: u64,
) -> TunnelResult<()> {
    let len = target
        .metadata()
        .await
        .map_err(|e| io_error(e, destination))?
        .len();
    if len < offset || len > offset + chunk_len {
        return Err(TunnelError::Fatal(anyhow::anyhow!(
            "destination {} holds {len} bytes, expected {offset}",
            destination.display()
        )));
    }

    let mut source = fs::File::open(chunk).await.map_err(|e| io_error(e, chunk))?;
    if len > offset {
        target
            .set_len(offset)
            .await
            .map_err(|e| io_error(e, destination))?;
    }
    target
        .seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| io_error(e, destination))?;
    tokio::io::copy(&mut source, target)
        .await
        .map_err(|e| io_error(e, destination))?;
    target.flush().await.map_err(|e| io_error(e, destination))?;
    target
        .sync_all()
        .await
        .map_err(|e| io_error(e, destination))
}
