//! Fixed-width chunk identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Number of decimal digits in a [`BlockId`].
pub const BLOCK_ID_WIDTH: usize = 19;

/// Largest chunk index a [`BlockId`] can encode (`10^19 - 1`).
pub const MAX_BLOCK_INDEX: u64 = 9_999_999_999_999_999_999;

/// Zero-padded decimal encoding of a chunk index.
///
/// The width is fixed so that lexicographic order equals numeric order: the
/// block store commits blocks in the order of the submitted id list and the
/// bus orders messages by the same string.
///
/// ```
/// use bustunnel_model::BlockId;
///
/// let id = BlockId::new(2).unwrap();
/// assert_eq!(id.to_string(), "0000000000000000002");
/// assert_eq!("0000000000000000002".parse::<BlockId>().unwrap(), id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    /// Wrap a chunk index. Fails above [`MAX_BLOCK_INDEX`].
    pub fn new(index: u64) -> Result<Self, ModelError> {
        if index > MAX_BLOCK_INDEX {
            return Err(ModelError::InvalidBlockId(index.to_string()));
        }
        Ok(Self(index))
    }

    /// Callers guarantee `index <= MAX_BLOCK_INDEX`.
    pub(crate) fn from_planned(index: u64) -> Self {
        Self(index)
    }

    /// The chunk index.
    #[must_use]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = BLOCK_ID_WIDTH)
    }
}

impl FromStr for BlockId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != BLOCK_ID_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::InvalidBlockId(s.to_owned()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ModelError::InvalidBlockId(s.to_owned()))
    }
}
