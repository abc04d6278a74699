//! Core data types shared by the scanner, the index store and the readers.

use serde::{Deserialize, Serialize};

/// Estimated in-memory cost of one index entry, in bytes.
///
/// Used for the `size()` counter and the persisted meta. A heuristic, not
/// exact accounting.
pub const ESTIMATED_ENTRY_SIZE: u64 = 48;

/// Absolute, end-exclusive file offsets of one top-level element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty byte range {}..{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Offsets of an item inside the in-memory staging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRange {
    pub start: usize,
    pub end: usize,
}

/// Where the bytes of an indexed item live.
///
/// Readers must branch on the variant: a `Staged` range is only meaningful
/// against the staging buffer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Element of the data file.
    Disk(ByteRange),
    /// Item added through `add_entry`, not part of the data file.
    Staged(StagedRange),
}

/// (field, value) pair identifying one index bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    /// Unseeded hash of the field name.
    pub field_id: u32,
    /// Seeded Murmur3 hash of the raw value bytes.
    pub value_hash: u32,
}

/// Persisted index metadata. Its presence marks an index as valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Murmur3 seed. Immutable once persisted.
    pub seed: u32,
    /// Number of top-level elements in the data file.
    pub total: u64,
    /// Estimated index size in bytes.
    pub size: u64,
}

impl Meta {
    pub fn new(seed: u32) -> Self {
        Self { seed, total: 0, size: 0 }
    }
}
