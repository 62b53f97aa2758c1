//! Tuple identifiers.
//!
//! A `Tid` locates one physical row version as a (block number, offset) pair.
//! Offsets are 1-based line-pointer numbers within the block. TIDs cross the
//! boundary to the storage layer in a fixed 6-byte encoding: the block number
//! as a big-endian `u32` followed by the offset as a big-endian `u16`.

use crate::error::{Error, Result};
use core::fmt;

/// Block (page) number within a relation.
pub type BlockNumber = u32;

/// 1-based line pointer number within a block.
pub type OffsetNumber = u16;

/// Upper bound on tuples a single heap page can hold.
pub const MAX_TUPLES_PER_PAGE: usize = 291;

/// Physical row-version locator, ordered by (block, offset).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid {
    block: BlockNumber,
    offset: OffsetNumber,
}

impl Tid {
    /// Encoded width in bytes.
    pub const ENCODED_LEN: usize = 6;

    /// Creates a tuple identifier.
    #[inline]
    pub const fn new(block: BlockNumber, offset: OffsetNumber) -> Self {
        Self { block, offset }
    }

    /// Returns the block number.
    #[inline]
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    /// Returns the in-block offset.
    #[inline]
    pub fn offset(&self) -> OffsetNumber {
        self.offset
    }

    /// Returns true if the offset names a line pointer (offsets start at 1).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.offset != 0
    }

    /// Encodes the identifier in the storage layer's external format.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..4].copy_from_slice(&self.block.to_be_bytes());
        out[4..].copy_from_slice(&self.offset.to_be_bytes());
        out
    }

    /// Decodes an identifier from the storage layer's external format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::storage(alloc::format!(
                "tuple identifier must be {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let block = BlockNumber::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let offset = OffsetNumber::from_be_bytes([bytes[4], bytes[5]]);
        Ok(Self { block, offset })
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.block, self.offset)
    }
}
