//! Binary format of a per-field index blob.
//!
//! A blob maps value hashes of one field to the ordered byte ranges of the
//! elements carrying that value.
//!
//! # File Layout
//!
//! ```text
//! [BlobHeader]                  32 bytes
//! [LookupEntry] * lookup_count  12 bytes each, sorted by value_hash
//! [RangeEntry]  * entry_count   16 bytes each, grouped by value_hash
//! ```
//!
//! Ranges keep file order inside each group.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use crate::error::{IndexError, Result};
use crate::types::ByteRange;

/// value_hash -> ordered element ranges, for one field.
pub type FieldIndex = HashMap<u32, Vec<ByteRange>>;

// ── Blob Header ───────────────────────────────────────────────────

/// Magic bytes for field index blobs.
pub const BLOB_MAGIC: [u8; 4] = *b"JIDX";

/// Blob format version.
pub const BLOB_VERSION: u32 = 1;

const HEADER_SIZE: usize = 32;
const LOOKUP_ENTRY_SIZE: usize = 12;
const RANGE_ENTRY_SIZE: usize = 16;

/// Blob header -- exactly 32 bytes.
///
/// ```text
/// Offset  Size  Field
/// 0       4     magic: b"JIDX"
/// 4       4     version: u32 = 1
/// 8       8     entry_count: u64
/// 16      4     lookup_count: u32
/// 20      12    _reserved: [u8; 12]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    pub magic: [u8; 4],
    pub version: u32,
    /// Number of range entries.
    pub entry_count: u64,
    /// Number of distinct value hashes.
    pub lookup_count: u32,
    pub _reserved: [u8; 12],
}

impl BlobHeader {
    pub fn new(entry_count: u64, lookup_count: u32) -> Self {
        Self {
            magic: BLOB_MAGIC,
            version: BLOB_VERSION,
            entry_count,
            lookup_count,
            _reserved: [0u8; 12],
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.magic)?;
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.entry_count.to_le_bytes())?;
        w.write_all(&self.lookup_count.to_le_bytes())?;
        w.write_all(&self._reserved)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            IndexError::InvalidFormat(format!("Failed to read blob header: {}", e))
        })?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        let mut reserved = [0u8; 12];
        reserved.copy_from_slice(&buf[20..32]);

        let header = Self {
            magic,
            version: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            entry_count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            lookup_count: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            _reserved: reserved,
        };

        if header.magic != BLOB_MAGIC {
            return Err(IndexError::InvalidFormat(format!(
                "Not an index blob: expected JIDX, got {:?}",
                header.magic
            )));
        }
        if header.version != BLOB_VERSION {
            return Err(IndexError::InvalidFormat(format!(
                "Unsupported blob version: {}",
                header.version
            )));
        }

        Ok(header)
    }
}

// ── Lookup Entry ──────────────────────────────────────────────────

/// One distinct value hash and the slice of range entries it owns.
///
/// ```text
/// Offset  Size  Field
/// 0       4     value_hash: u32
/// 4       4     entry_offset: u32
/// 8       4     entry_count: u32
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupEntry {
    pub value_hash: u32,
    pub entry_offset: u32,
    pub entry_count: u32,
}

impl LookupEntry {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.value_hash.to_le_bytes())?;
        w.write_all(&self.entry_offset.to_le_bytes())?;
        w.write_all(&self.entry_count.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; LOOKUP_ENTRY_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            IndexError::InvalidFormat(format!("Failed to read lookup entry: {}", e))
        })?;
        Ok(Self {
            value_hash: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            entry_offset: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            entry_count: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        })
    }
}

// ── Range Entry ───────────────────────────────────────────────────

fn write_range<W: Write>(range: &ByteRange, w: &mut W) -> Result<()> {
    w.write_all(&range.start.to_le_bytes())?;
    w.write_all(&range.end.to_le_bytes())?;
    Ok(())
}

fn read_range<R: Read>(r: &mut R) -> Result<ByteRange> {
    let mut buf = [0u8; RANGE_ENTRY_SIZE];
    r.read_exact(&mut buf).map_err(|e| {
        IndexError::InvalidFormat(format!("Failed to read range entry: {}", e))
    })?;
    let start = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let end = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    if start >= end {
        return Err(IndexError::InvalidFormat(format!(
            "Invalid range entry {}..{}",
            start, end
        )));
    }
    Ok(ByteRange { start, end })
}

// ── Blob (de)serialization ────────────────────────────────────────

/// Serialize a field index to blob bytes.
pub fn serialize_field_index(index: &FieldIndex) -> Result<Vec<u8>> {
    let mut hashes: Vec<u32> = index.keys().copied().collect();
    hashes.sort_unstable();

    let total_entries: usize = index.values().map(|v| v.len()).sum();
    let mut buf = Cursor::new(Vec::with_capacity(
        HEADER_SIZE + hashes.len() * LOOKUP_ENTRY_SIZE + total_entries * RANGE_ENTRY_SIZE,
    ));

    BlobHeader::new(total_entries as u64, hashes.len() as u32).write_to(&mut buf)?;

    let mut entry_offset: u32 = 0;
    for hash in &hashes {
        let count = index[hash].len() as u32;
        LookupEntry {
            value_hash: *hash,
            entry_offset,
            entry_count: count,
        }
        .write_to(&mut buf)?;
        entry_offset += count;
    }

    for hash in &hashes {
        for range in &index[hash] {
            write_range(range, &mut buf)?;
        }
    }

    Ok(buf.into_inner())
}

/// Parse blob bytes back into a field index.
pub fn deserialize_field_index(data: &[u8]) -> Result<FieldIndex> {
    let mut cursor = Cursor::new(data);
    let header = BlobHeader::read_from(&mut cursor)?;

    let expected = (header.lookup_count as u64)
        .checked_mul(LOOKUP_ENTRY_SIZE as u64)
        .and_then(|lookups| {
            header
                .entry_count
                .checked_mul(RANGE_ENTRY_SIZE as u64)
                .and_then(|ranges| ranges.checked_add(lookups))
        })
        .and_then(|body| body.checked_add(HEADER_SIZE as u64))
        .ok_or_else(|| {
            IndexError::InvalidFormat(format!(
                "Blob header counts overflow: {} entries, {} lookups",
                header.entry_count, header.lookup_count
            ))
        })?;
    if (data.len() as u64) < expected {
        return Err(IndexError::InvalidFormat(format!(
            "Blob truncated: {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    // Both counts are bounded by the blob length from here on.
    let mut lookups = Vec::with_capacity(header.lookup_count as usize);
    for _ in 0..header.lookup_count {
        lookups.push(LookupEntry::read_from(&mut cursor)?);
    }

    let mut ranges = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        ranges.push(read_range(&mut cursor)?);
    }

    let mut index = FieldIndex::with_capacity(lookups.len());
    for lookup in lookups {
        let start = lookup.entry_offset as usize;
        let end = start + lookup.entry_count as usize;
        if end > ranges.len() {
            return Err(IndexError::InvalidFormat(format!(
                "Lookup entry for hash {:#x} points past the range table",
                lookup.value_hash
            )));
        }
        index.insert(lookup.value_hash, ranges[start..end].to_vec());
    }

    Ok(index)
}
