//! Per-download scratch directory.
//!
//! The staging area of a destination `path` is the directory `path.partial`.
//! It holds one file per arrived chunk, named by the chunk's block id. Its
//! existence is the only marker of an unfinished download.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::BlockId;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

/// Suffix appended to the destination path to name its staging area.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// The staging directory of one destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Staging area of `destination`.
    pub fn for_destination(destination: impl AsRef<Path>) -> Self {
        let mut dir = OsString::from(destination.as_ref().as_os_str());
        dir.push(PARTIAL_SUFFIX);
        Self {
            dir: PathBuf::from(dir),
        }
    }

    /// The directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the chunk file for `id`.
    #[must_use]
    pub fn chunk_path(&self, id: BlockId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Whether the directory exists.
    pub async fn exists(&self) -> TunnelResult<bool> {
        fs::try_exists(&self.dir)
            .await
            .map_err(|e| io_error(e, &self.dir))
    }

    /// Create the directory. An existing one is a [`TunnelError::Conflict`].
    pub async fn create(&self) -> TunnelResult<()> {
        match fs::create_dir(&self.dir).await {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "created staging area");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(TunnelError::Conflict {
                resource: self.dir.display().to_string(),
            }),
            Err(e) => Err(io_error(e, &self.dir)),
        }
    }

    /// Delete the directory and everything in it. Absence is success.
    pub async fn remove(&self) -> TunnelResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "removed staging area");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e, &self.dir)),
        }
    }

    /// Length of the chunk file for `id`, or `None` if it has not arrived.
    pub async fn chunk_length(&self, id: BlockId) -> TunnelResult<Option<u64>> {
        let path = self.chunk_path(id);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e, &path)),
        }
    }

    /// Copy at most `limit` bytes from `reader` into the chunk file for `id`.
    ///
    /// Bytes go to a `.tmp` sibling first and are renamed into place, so a
    /// chunk file is only ever observed at its full length.
    pub async fn write_chunk<R>(&self, id: BlockId, reader: R, limit: u64) -> TunnelResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.chunk_path(id);
        let tmp = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| io_error(e, &tmp))?;
        let written = tokio::io::copy(&mut reader.take(limit), &mut file)
            .await
            .map_err(|e| io_error(e, &tmp))?;
        file.flush().await.map_err(|e| io_error(e, &tmp))?;
        file.sync_all().await.map_err(|e| io_error(e, &tmp))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(e, &path))?;
        trace!(chunk = %path.display(), written, "staged chunk");
        Ok(written)
    }

    /// Delete the chunk file for `id`. Absence is success.
    pub async fn remove_chunk(&self, id: BlockId) -> TunnelResult<()> {
        let path = self.chunk_path(id);
        match fs::remove_file(&path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error(e, &path)),
            _ => Ok(()),
        }
    }
}

pub(crate) fn io_error(err: io::Error, path: &Path) -> TunnelError {
    TunnelError::from_io(err, path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn id(index: u64) -> BlockId {
        BlockId::new(index).expect("test block id")
    }

    #[test]
    fn test_should_name_staging_after_destination() {
        let staging = StagingArea::for_destination("/srv/out/file.bin");
        assert_eq!(staging.dir(), Path::new("/srv/out/file.bin.partial"));
        assert_eq!(
            staging.chunk_path(id(3)),
            Path::new("/srv/out/file.bin.partial/0000000000000000003")
        );
    }

    #[tokio::test]
    async fn test_should_create_once_and_remove_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_destination(tmp.path().join("f.bin"));

        assert!(!staging.exists().await.unwrap());
        staging.create().await.unwrap();
        assert!(staging.exists().await.unwrap());
        assert!(matches!(
            staging.create().await,
            Err(TunnelError::Conflict { .. })
        ));

        staging.remove().await.unwrap();
        staging.remove().await.unwrap();
        assert!(!staging.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_should_write_chunk_up_to_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_destination(tmp.path().join("f.bin"));
        staging.create().await.unwrap();

        assert_eq!(staging.chunk_length(id(0)).await.unwrap(), None);
        let written = staging
            .write_chunk(id(0), Cursor::new(b"0123456789".to_vec()), 4)
            .await
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(staging.chunk_length(id(0)).await.unwrap(), Some(4));
        assert_eq!(fs::read(staging.chunk_path(id(0))).await.unwrap(), b"0123");
        assert!(!staging.chunk_path(id(0)).with_extension("tmp").exists());

        staging.remove_chunk(id(0)).await.unwrap();
        staging.remove_chunk(id(0)).await.unwrap();
        assert_eq!(staging.chunk_length(id(0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_fail_write_without_staging_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_destination(tmp.path().join("missing.bin"));
        let result = staging
            .write_chunk(id(0), Cursor::new(vec![1_u8]), 1)
            .await;
        assert!(matches!(result, Err(TunnelError::NotFound { .. })));
    }
}
