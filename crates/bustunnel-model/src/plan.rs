//! Chunk planning.
//!
//! A [`TransferJob`] is pure arithmetic over `(total_length, chunk_size)`.
//! Nothing here touches the filesystem or the network.

use std::ops::Range;

use crate::block_id::{BlockId, MAX_BLOCK_INDEX};
use crate::error::ModelError;

/// One file transfer, split into fixed-size chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    path: String,
    total_length: u64,
    chunk_size: u64,
}

/// One contiguous byte range of a [`TransferJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Chunk index in `[0, chunk_count)`.
    pub index: u64,
    /// `index × chunk_size`.
    pub start_offset: u64,
    /// Byte length. Shorter than the chunk size only for the last chunk.
    pub length: u64,
}

impl ChunkDescriptor {
    /// The block id of this chunk.
    #[must_use]
    pub fn block_id(&self) -> BlockId {
        BlockId::from_planned(self.index)
    }
}

impl TransferJob {
    /// Plan a job. `chunk_size` must be positive.
    pub fn new(path: impl Into<String>, total_length: u64, chunk_size: u64) -> Result<Self, ModelError> {
        if chunk_size == 0 {
            return Err(ModelError::InvalidPlan("chunk size must be positive".to_owned()));
        }
        let job = Self {
            path: path.into(),
            total_length,
            chunk_size,
        };
        if job.chunk_count() > MAX_BLOCK_INDEX {
            return Err(ModelError::InvalidPlan(format!(
                "{} chunks exceed the block id range",
                job.chunk_count()
            )));
        }
        Ok(job)
    }

    /// File path of the job.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Total byte length.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// `ceil(total_length / chunk_size)`.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.total_length.div_ceil(self.chunk_size)
    }

    /// Length of the chunk at `index`, or `None` past the end.
    #[must_use]
    pub fn chunk(&self, index: u64) -> Option<ChunkDescriptor> {
        if index >= self.chunk_count() {
            return None;
        }
        let start_offset = index * self.chunk_size;
        Some(ChunkDescriptor {
            index,
            start_offset,
            length: (self.total_length - start_offset).min(self.chunk_size),
        })
    }

    /// Chunk index a file of `current_length` bytes needs next.
    #[must_use]
    pub fn next_index(&self, current_length: u64) -> u64 {
        current_length / self.chunk_size
    }

    /// Lazy ascending sequence of every chunk.
    #[must_use]
    pub fn chunks(&self) -> ChunkPlan<'_> {
        self.chunks_in(0..self.chunk_count())
    }

    /// Lazy ascending sequence of the chunks in `range`, clamped to the job.
    #[must_use]
    pub fn chunks_in(&self, range: Range<u64>) -> ChunkPlan<'_> {
        let end = range.end.min(self.chunk_count());
        ChunkPlan {
            job: self,
            next: range.start.min(end),
            end,
        }
    }

    /// Index ranges `[i, min(i + batch_size, chunk_count))` in ascending
    /// order. A zero `batch_size` is treated as one.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Range<u64>> + use<> {
        let count = self.chunk_count();
        let step = u64::try_from(batch_size.max(1)).unwrap_or(u64::MAX);
        (0..count)
            .step_by(usize::try_from(step).unwrap_or(usize::MAX))
            .map(move |start| start..start.saturating_add(step).min(count))
    }
}

/// Iterator over [`ChunkDescriptor`]s. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct ChunkPlan<'a> {
    job: &'a TransferJob,
    next: u64,
    end: u64,
}

impl Iterator for ChunkPlan<'_> {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let chunk = self.job.chunk(self.next);
        self.next += 1;
        chunk
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_should_split_with_short_last_chunk() {
        let job = TransferJob::new("/data/a.bin", 5 * MIB / 2, MIB).expect("plan");
        assert_eq!(job.chunk_count(), 3);

        let lengths: Vec<u64> = job.chunks().map(|c| c.length).collect();
        assert_eq!(lengths, vec![MIB, MIB, MIB / 2]);
        assert_eq!(job.chunk(2).map(|c| c.start_offset), Some(2 * MIB));
        assert_eq!(job.chunk(3), None);
    }

    #[test]
    fn test_should_cover_total_length_exactly() {
        for total in [0_u64, 1, 9, 10, 11, 99, 100, 101, 12_345] {
            for size in [1_u64, 3, 10, 64, 1000] {
                let job = TransferJob::new("f", total, size).expect("plan");
                assert_eq!(job.chunk_count(), total.div_ceil(size));
                let chunks: Vec<_> = job.chunks().collect();
                assert_eq!(chunks.iter().map(|c| c.length).sum::<u64>(), total);
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.index, i as u64);
                    assert_eq!(c.start_offset, c.index * size);
                    assert!(c.length > 0 && c.length <= size);
                }
            }
        }
    }

    #[test]
    fn test_should_plan_nothing_for_empty_file() {
        let job = TransferJob::new("empty", 0, MIB).expect("plan");
        assert_eq!(job.chunk_count(), 0);
        assert_eq!(job.chunks().count(), 0);
        assert_eq!(job.batches(10).count(), 0);
    }

    #[test]
    fn test_should_reject_zero_chunk_size() {
        assert!(matches!(
            TransferJob::new("f", 10, 0),
            Err(ModelError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_should_batch_by_upper_bound() {
        let job = TransferJob::new("f", 25, 1).expect("plan");
        let batches: Vec<_> = job.batches(10).collect();
        assert_eq!(batches, vec![0..10, 10..20, 20..25]);

        let sent: Vec<u64> = batches
            .into_iter()
            .flat_map(|b| job.chunks_in(b).map(|c| c.index))
            .collect();
        assert_eq!(sent, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_should_restart_plan_from_clone() {
        let job = TransferJob::new("f", 30, 10).expect("plan");
        let mut plan = job.chunks();
        assert_eq!(plan.next().map(|c| c.index), Some(0));
        let resumed = plan.clone();
        assert_eq!(plan.count(), 2);
        assert_eq!(resumed.map(|c| c.index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_should_compute_next_index_from_length() {
        let job = TransferJob::new("f", 25, 10).expect("plan");
        assert_eq!(job.next_index(0), 0);
        assert_eq!(job.next_index(10), 1);
        assert_eq!(job.next_index(20), 2);
        assert_eq!(job.chunk(2).map(|c| c.length), Some(5));
        assert_eq!(job.chunk(1).map(|c| c.block_id().to_string()).as_deref(), Some("0000000000000000001"));
    }
}
