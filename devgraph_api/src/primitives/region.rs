use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BLOCK_SIZE;

use super::bytes::ByteCount;

/// A contiguous range of blocks on a device.
///
/// `start` and `length` are counted in blocks of `block_size` bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct Region {
    pub start: u64,
    pub length: u64,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

impl Region {
    pub fn new(start: u64, length: u64, block_size: u64) -> Self {
        Self {
            start,
            length,
            block_size,
        }
    }

    /// Builds a region from byte offsets, rounding to whole blocks.
    pub fn from_bytes(start: ByteCount, size: ByteCount, block_size: u64) -> Self {
        Self {
            start: start.bytes() / block_size,
            length: size.bytes() / block_size,
            block_size,
        }
    }

    /// First block after the region.
    pub fn end_exclusive(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    pub fn size(&self) -> ByteCount {
        ByteCount(self.length.saturating_mul(self.block_size))
    }

    pub fn start_bytes(&self) -> ByteCount {
        ByteCount(self.start.saturating_mul(self.block_size))
    }

    pub fn end_bytes(&self) -> ByteCount {
        ByteCount(self.end_exclusive().saturating_mul(self.block_size))
    }

    /// End of the region in bytes, `None` when it cannot be represented.
    pub fn checked_end_bytes(&self) -> Option<ByteCount> {
        self.start
            .checked_add(self.length)?
            .checked_mul(self.block_size)
            .map(ByteCount)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start_bytes() < other.end_bytes() && other.start_bytes() < self.end_bytes()
    }

    /// Returns a copy with the same start and a new size.
    pub fn with_size(&self, size: ByteCount) -> Region {
        Region {
            length: size.bytes() / self.block_size,
            ..*self
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {} B]",
            self.start, self.length, self.block_size
        )
    }
}
