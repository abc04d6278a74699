//! JsonIndex - lazily indexed access to a huge JSON array file.
//!
//! Builds a lightweight index (field -> value hash -> byte ranges) in one
//! pass over the data file, persists it in an index directory, and serves
//! lookups as [`ResultView`]s that read elements on demand through a
//! bounded window.
//!
//! # Usage
//!
//! ```no_run
//! use jsonidx::{IndexConfig, JsonIndex};
//!
//! let config = IndexConfig::new(["id", "name"]);
//! let mut index = JsonIndex::new("/data/people.json", "/data/people.idx", config).unwrap();
//! index.load().unwrap();
//!
//! let matches = index.get_entry("42").unwrap();
//! for person in &matches {
//!     println!("{:?}", person);
//! }
//! drop(matches);
//!
//! index.close().unwrap();
//! ```
//!
//! The data file handle is owned by the index from `load`/`create` until
//! `close`. Views borrow it, so an index cannot be closed while a view is
//! alive.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::builder::IndexBuilder;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::extract::Elements;
use crate::hash::random_seed;
use crate::persist::{DirStorage, IndexStorage};
use crate::store::{IndexStore, StagingArea};
use crate::types::{Meta, StagedRange};
use crate::view::ResultView;

pub struct JsonIndex {
    data_path: PathBuf,
    index_dir: PathBuf,
    config: IndexConfig,
    file: Option<File>,
    store: Option<IndexStore>,
}

impl JsonIndex {
    pub fn new(
        data_path: impl Into<PathBuf>,
        index_dir: impl Into<PathBuf>,
        config: IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            data_path: data_path.into(),
            index_dir: index_dir.into(),
            config,
            file: None,
            store: None,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Open the persisted index if it is complete, otherwise build and
    /// persist it.
    pub fn load(&mut self) -> Result<()> {
        let storage = DirStorage::new(&self.index_dir);

        let meta = if storage.exists(&self.config.fields) {
            match storage.load() {
                Ok(meta) => Some(meta),
                Err(IndexError::NotFound(_)) => None,
                Err(e) => return Err(e),
            }
        } else {
            debug!("missing indexes in {}", self.index_dir.display());
            None
        };

        match meta {
            Some(meta) => {
                debug!("all indexes up to date");
                self.store = Some(IndexStore::open(
                    Box::new(storage),
                    &self.config.fields,
                    meta,
                )?);
            }
            None => self.rebuild()?,
        }
        self.open_data()
    }

    /// Rebuild the index from the data file and persist what is missing.
    ///
    /// Files already on disk are kept as they are; a persisted seed is
    /// reused so the rebuilt index hashes exactly like the stored one.
    pub fn create(&mut self) -> Result<()> {
        self.rebuild()?;
        self.open_data()
    }

    fn rebuild(&mut self) -> Result<()> {
        let storage = DirStorage::new(&self.index_dir);
        let seed = match storage.load() {
            Ok(meta) => meta.seed,
            Err(IndexError::NotFound(_)) => self.config.seed.unwrap_or_else(random_seed),
            Err(e) => return Err(e),
        };

        let mut store = IndexStore::empty(Box::new(storage), &self.config.fields, seed)?;
        let meta = IndexBuilder::new(self.config.parse_buffer_size)
            .build(&self.data_path, &mut store)?;
        store.save()?;
        info!(
            "indexed {} elements of {} into {}",
            meta.total,
            self.data_path.display(),
            self.index_dir.display()
        );

        self.store = Some(store);
        Ok(())
    }

    fn open_data(&mut self) -> Result<()> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.data_path)?);
        }
        Ok(())
    }

    fn open_parts(&self) -> Result<(&IndexStore, &File)> {
        match (&self.store, &self.file) {
            (Some(store), Some(file)) => Ok((store, file)),
            _ => Err(IndexError::Closed),
        }
    }

    /// Elements whose default field equals `key`. Empty view if none.
    pub fn get_entry(&self, key: &str) -> Result<ResultView<'_>> {
        let (store, file) = self.open_parts()?;
        let ranges = store.get_entry(key)?;
        Ok(ResultView::new(file, ranges, self.config.read_buffer_size))
    }

    /// Elements matching any of the (field, value) criteria.
    ///
    /// OR semantics across fields: the result is the union, in criteria
    /// order, with duplicates.
    pub fn query<I, K, V>(&self, criteria: I) -> Result<ResultView<'_>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let (store, file) = self.open_parts()?;
        let ranges = store.query(criteria)?;
        Ok(ResultView::new(file, ranges, self.config.read_buffer_size))
    }

    /// Stage a new item under `key`. Not visible to lookups; persisted by
    /// `save`/`close`.
    pub fn add_entry<T: Serialize + ?Sized>(&mut self, key: &str, item: &T) -> Result<StagedRange> {
        self.store
            .as_mut()
            .ok_or(IndexError::Closed)?
            .add_entry(key, item)
    }

    /// Estimated index size in bytes.
    pub fn size(&self) -> u64 {
        self.store.as_ref().map_or(0, |s| s.size())
    }

    /// Membership in the default field's in-memory index. Does not load it.
    pub fn has(&self, key: &str) -> bool {
        self.store.as_ref().map_or(false, |s| s.has(key))
    }

    pub fn meta(&self) -> Option<Meta> {
        self.store.as_ref().map(|s| s.meta())
    }

    pub fn staging(&self) -> Option<&StagingArea> {
        self.store.as_ref().map(|s| s.staging())
    }

    /// Raw bytes of every top-level element, in file order.
    pub fn extract(&self) -> Result<Elements<File>> {
        let file = File::open(&self.data_path)?;
        Ok(Elements::new(file, self.config.parse_buffer_size))
    }

    pub fn save(&self) -> Result<()> {
        self.store.as_ref().ok_or(IndexError::Closed)?.save()
    }

    /// Save and release the data file.
    pub fn close(mut self) -> Result<()> {
        if let Some(store) = self.store.take() {
            debug!("closing index manager");
            store.save()?;
        }
        self.file = None;
        Ok(())
    }
}
