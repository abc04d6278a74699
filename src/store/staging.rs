//! Staging buffer for items added through `add_entry`.
//!
//! Items are serialized and appended to one growing buffer; each one is
//! addressed by a [`StagedRange`] into that buffer. Staged items are not part
//! of the data file and never show up in lookups against it.

use crate::error::{IndexError, Result};
use crate::types::{IndexKey, Location, StagedRange};

#[derive(Debug, Default, Clone)]
pub struct StagingArea {
    buffer: Vec<u8>,
    entries: Vec<(IndexKey, StagedRange)>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a staging area from persisted parts, checking every range.
    pub fn from_parts(buffer: Vec<u8>, entries: Vec<(IndexKey, StagedRange)>) -> Result<Self> {
        if let Some((_, bad)) = entries
            .iter()
            .find(|(_, r)| r.start > r.end || r.end > buffer.len())
        {
            return Err(IndexError::InvalidFormat(format!(
                "Staged range {}..{} outside buffer of {} bytes",
                bad.start,
                bad.end,
                buffer.len()
            )));
        }
        Ok(Self { buffer, entries })
    }

    /// Append serialized item bytes under `key`.
    pub fn stage(&mut self, key: IndexKey, bytes: &[u8]) -> StagedRange {
        let start = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        let range = StagedRange {
            start,
            end: self.buffer.len(),
        };
        self.entries.push((key, range));
        range
    }

    /// Staged locations recorded under `key`, in insertion order.
    pub fn locations(&self, key: &IndexKey) -> Vec<Location> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, r)| Location::Staged(*r))
            .collect()
    }

    /// Bytes of a staged location. `None` for disk locations, which must be
    /// read through the data file.
    pub fn resolve(&self, location: &Location) -> Option<&[u8]> {
        match location {
            Location::Staged(range) => self.buffer.get(range.start..range.end),
            Location::Disk(_) => None,
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn entries(&self) -> &[(IndexKey, StagedRange)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
