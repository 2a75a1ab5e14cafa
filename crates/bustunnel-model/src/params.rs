//! Query parameters of the tunneled chunk and stitch endpoints.
//!
//! | Endpoint | Parameters |
//! |----------|------------|
//! | `/api/filechunk` | `path`, `startIndex`, `length` |
//! | `/api/filestitch` | `path`, `length`, `bytesPerChunk` |
//!
//! Values travel `application/x-www-form-urlencoded`.

use crate::block_id::BlockId;
use crate::error::ModelError;
use crate::plan::{ChunkDescriptor, TransferJob};

/// Encode `pairs` as a query string. At least one pair is required.
pub fn encode_query<K, V>(pairs: &[(K, V)]) -> Result<String, ModelError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if pairs.is_empty() {
        return Err(ModelError::EmptyQuery);
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k.as_ref(), v.as_ref());
    }
    Ok(serializer.finish())
}

/// Look up `name` in a raw query string.
fn find(query: &str, name: &'static str) -> Result<String, ModelError> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| ModelError::InvalidParameter {
            name,
            reason: "missing".to_owned(),
        })
}

fn find_u64(query: &str, name: &'static str) -> Result<u64, ModelError> {
    let raw = find(query, name)?;
    raw.trim().parse().map_err(|_| ModelError::InvalidParameter {
        name,
        reason: format!("{raw:?} is not a non-negative integer"),
    })
}

/// Parameters of one chunk request.
///
/// `length` is the nominal chunk size of the job, not the length of this
/// particular chunk: the final chunk of a file may hold fewer bytes. This
/// keeps the block index derivable as `start_index / length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkQuery {
    /// File path the chunk belongs to.
    pub path: String,
    /// Byte offset of the chunk.
    pub start_index: u64,
    /// Chunk size of the job.
    pub length: u64,
}

impl ChunkQuery {
    /// Parameters for `chunk` of `job`.
    #[must_use]
    pub fn for_chunk(job: &TransferJob, chunk: &ChunkDescriptor) -> Self {
        Self {
            path: job.path().to_owned(),
            start_index: chunk.start_offset,
            length: job.chunk_size(),
        }
    }

    /// Parse from a raw query string.
    pub fn from_query(query: &str) -> Result<Self, ModelError> {
        let parsed = Self {
            path: find(query, "path")?,
            start_index: find_u64(query, "startIndex")?,
            length: find_u64(query, "length")?,
        };
        if parsed.path.is_empty() {
            return Err(ModelError::InvalidParameter {
                name: "path",
                reason: "empty".to_owned(),
            });
        }
        if parsed.length == 0 {
            return Err(ModelError::InvalidParameter {
                name: "length",
                reason: "must be positive".to_owned(),
            });
        }
        Ok(parsed)
    }

    /// Query pairs in wire order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("path", self.path.clone()),
            ("startIndex", self.start_index.to_string()),
            ("length", self.length.to_string()),
        ]
    }

    /// Block id of the chunk, `start_index / length`.
    pub fn block_id(&self) -> Result<BlockId, ModelError> {
        if self.length == 0 || self.start_index % self.length != 0 {
            return Err(ModelError::InvalidParameter {
                name: "startIndex",
                reason: format!("{} is not aligned to {}", self.start_index, self.length),
            });
        }
        BlockId::new(self.start_index / self.length)
    }
}

/// Parameters of a stitch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchQuery {
    /// Destination file path.
    pub path: String,
    /// Total length of the file.
    pub length: u64,
    /// Chunk size the file was split with.
    pub bytes_per_chunk: u64,
}

impl StitchQuery {
    /// Parameters announcing `job`.
    #[must_use]
    pub fn for_job(job: &TransferJob) -> Self {
        Self {
            path: job.path().to_owned(),
            length: job.total_length(),
            bytes_per_chunk: job.chunk_size(),
        }
    }

    /// Parse from a raw query string.
    pub fn from_query(query: &str) -> Result<Self, ModelError> {
        Ok(Self {
            path: find(query, "path")?,
            length: find_u64(query, "length")?,
            bytes_per_chunk: find_u64(query, "bytesPerChunk")?,
        })
    }

    /// Query pairs in wire order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("path", self.path.clone()),
            ("length", self.length.to_string()),
            ("bytesPerChunk", self.bytes_per_chunk.to_string()),
        ]
    }

    /// The job being stitched.
    pub fn to_job(&self) -> Result<TransferJob, ModelError> {
        TransferJob::new(self.path.clone(), self.length, self.bytes_per_chunk)
    }
}
