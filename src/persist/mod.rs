//! Persistence of finished indexes.
//!
//! One directory per index:
//!
//! ```text
//! <index-dir>/
//!   meta.json          seed, element count, estimated size (written last)
//!   <field_id>.idx     one blob per indexed field (see `format`)
//!   staged.dat         staging buffer of items added with add_entry
//!   staged.bin         staged item ledger (bincode)
//! ```
//!
//! Meta and field blobs are never overwritten: `create_if_required` only
//! adds what is missing. An index is valid iff `meta.json` exists.

pub mod format;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::hash::field_id;
use crate::store::StagingArea;
use crate::types::{IndexKey, Meta, StagedRange};

pub use format::{deserialize_field_index, serialize_field_index, FieldIndex};

pub const META_FILE: &str = "meta.json";
const STAGED_DATA_FILE: &str = "staged.dat";
const STAGED_LEDGER_FILE: &str = "staged.bin";

/// Load/save operations for index structures.
pub trait IndexStorage {
    /// Read the meta record. `NotFound` if the index was never completed.
    fn load(&self) -> Result<Meta>;

    /// True iff the meta record and every requested field blob exist.
    fn exists(&self, fields: &[String]) -> bool;

    /// Load one field's value-hash -> ranges mapping.
    fn open_index(&self, field_id: u32) -> Result<FieldIndex>;

    /// Write missing field blobs, then the meta record if absent.
    fn create_if_required(&self, meta: &Meta, index: &[(u32, &FieldIndex)]) -> Result<()>;

    /// Replace the persisted staged items.
    fn save_staged(&self, staging: &StagingArea) -> Result<()>;

    /// Read staged items, if any were saved.
    fn load_staged(&self) -> Result<Option<StagingArea>>;
}

/// Directory-backed index storage.
#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    /// Path of a field blob, keyed by field id.
    pub fn field_path(&self, field_id: u32) -> PathBuf {
        self.dir.join(format!("{}.idx", field_id))
    }

    /// Write through a temp file so a crash never leaves a partial file
    /// under the final name.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl IndexStorage for DirStorage {
    fn load(&self) -> Result<Meta> {
        if !self.dir.exists() {
            debug!("index dir {} doesn't exist, creating", self.dir.display());
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.meta_path();
        if !path.exists() {
            debug!("meta file not found in {}", self.dir.display());
            return Err(IndexError::NotFound(self.dir.clone()));
        }
        let contents = fs::read_to_string(&path)?;
        let meta: Meta = serde_json::from_str(&contents)?;
        debug!("meta loaded: {:?}", meta);
        Ok(meta)
    }

    fn exists(&self, fields: &[String]) -> bool {
        self.meta_path().exists()
            && fields
                .iter()
                .all(|name| self.field_path(field_id(name)).exists())
    }

    fn open_index(&self, field_id: u32) -> Result<FieldIndex> {
        let path = self.field_path(field_id);
        debug!("reading field index {} from {}", field_id, path.display());
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        deserialize_field_index(&mmap)
    }

    fn create_if_required(&self, meta: &Meta, index: &[(u32, &FieldIndex)]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        for (field_id, field_index) in index {
            let path = self.field_path(*field_id);
            if path.exists() {
                debug!("field index {} exists, skipping", field_id);
                continue;
            }
            debug!(
                "writing field index {} ({} values) to {}",
                field_id,
                field_index.len(),
                path.display()
            );
            self.write_atomic(&path, &serialize_field_index(field_index)?)?;
        }

        let meta_path = self.meta_path();
        if meta_path.exists() {
            debug!("meta file exists, skipping creation");
        } else {
            debug!("writing meta file: {:?}", meta);
            self.write_atomic(&meta_path, &serde_json::to_vec_pretty(meta)?)?;
        }
        Ok(())
    }

    fn save_staged(&self, staging: &StagingArea) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        debug!("saving {} staged items", staging.len());
        self.write_atomic(&self.dir.join(STAGED_DATA_FILE), staging.buffer())?;
        let ledger = bincode::serialize(staging.entries())?;
        self.write_atomic(&self.dir.join(STAGED_LEDGER_FILE), &ledger)?;
        Ok(())
    }

    fn load_staged(&self) -> Result<Option<StagingArea>> {
        let ledger_path = self.dir.join(STAGED_LEDGER_FILE);
        if !ledger_path.exists() {
            return Ok(None);
        }
        let entries: Vec<(IndexKey, StagedRange)> =
            bincode::deserialize(&fs::read(&ledger_path)?)?;
        let buffer = fs::read(self.dir.join(STAGED_DATA_FILE))?;
        StagingArea::from_parts(buffer, entries).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteRange;
    use tempfile::TempDir;

    fn field(ranges: &[(u32, u64, u64)]) -> FieldIndex {
        let mut index = FieldIndex::new();
        for &(hash, start, end) in ranges {
            index.entry(hash).or_default().push(ByteRange::new(start, end));
        }
        index
    }

    #[test]
    fn test_load_missing_meta_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path().join("idx"));

        let err = storage.load().unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)), "unexpected error: {}", err);
        // The directory is created on first load.
        assert!(dir.path().join("idx").is_dir());
    }

    #[test]
    fn test_create_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path());
        let meta = Meta { seed: 42, total: 3, size: 144 };
        let ids = field(&[(1, 0, 10), (1, 20, 30), (2, 11, 19)]);

        storage.create_if_required(&meta, &[(field_id("id"), &ids)]).unwrap();

        assert_eq!(storage.load().unwrap(), meta);
        assert!(storage.exists(&["id".to_string()]));
        assert!(!storage.exists(&["id".to_string(), "name".to_string()]));
        assert_eq!(storage.open_index(field_id("id")).unwrap(), ids);
    }

    #[test]
    fn test_create_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path());
        let first = field(&[(1, 0, 10)]);
        storage
            .create_if_required(&Meta::new(1), &[(5, &first)])
            .unwrap();

        let second = field(&[(9, 100, 200)]);
        let other = field(&[(3, 1, 2)]);
        storage
            .create_if_required(&Meta::new(2), &[(5, &second), (6, &other)])
            .unwrap();

        assert_eq!(storage.load().unwrap().seed, 1);
        assert_eq!(storage.open_index(5).unwrap(), first);
        // Missing blobs are still added.
        assert_eq!(storage.open_index(6).unwrap(), other);
    }

    #[test]
    fn test_open_missing_field_is_io_error() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path());
        let err = storage.open_index(77).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)), "unexpected error: {}", err);
    }

    #[test]
    fn test_open_corrupt_field_is_format_error() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path());
        let mut blob = serialize_field_index(&field(&[(1, 0, 10)])).unwrap();
        blob[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(storage.field_path(3), &blob).unwrap();

        let err = storage.open_index(3).unwrap_err();
        assert!(matches!(err, IndexError::InvalidFormat(_)), "unexpected error: {}", err);
    }

    #[test]
    fn test_staged_roundtrip() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path());
        assert!(storage.load_staged().unwrap().is_none());

        let mut staging = StagingArea::new();
        let key = IndexKey { field_id: 1, value_hash: 2 };
        let range = staging.stage(key, br#"{"id":"x"}"#);
        storage.save_staged(&staging).unwrap();

        let loaded = storage.load_staged().unwrap().unwrap();
        assert_eq!(loaded.entries(), staging.entries());
        assert_eq!(
            loaded.resolve(&crate::types::Location::Staged(range)),
            Some(&br#"{"id":"x"}"#[..])
        );
    }
}
