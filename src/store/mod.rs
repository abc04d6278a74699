//! In-memory index: field -> value hash -> ordered byte ranges.
//!
//! Populated by the index builder, or loaded lazily per field from
//! persistent storage the first time a lookup touches that field. Each field
//! is tracked by a [`FieldSlot`]; a failed load is remembered and reported
//! again on every later access, it is not retried.
//!
//! NOT Sync -- the lazy-load cache uses a `RefCell`; single-writer access
//! assumed.

mod staging;

pub use staging::StagingArea;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::hash::{field_id, value_hash};
use crate::persist::{FieldIndex, IndexStorage};
use crate::types::{ByteRange, IndexKey, Location, Meta, StagedRange, ESTIMATED_ENTRY_SIZE};

/// A configured field and its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub id: u32,
}

impl FieldDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: field_id(name),
        }
    }
}

/// Load state of one field's sub-index.
#[derive(Debug)]
pub enum FieldSlot {
    NotLoaded,
    Loaded(FieldIndex),
    Failed { kind: io::ErrorKind, message: String },
}

impl FieldSlot {
    fn failed(err: &IndexError) -> Self {
        let kind = match err {
            IndexError::Io(e) => e.kind(),
            _ => io::ErrorKind::InvalidData,
        };
        FieldSlot::Failed {
            kind,
            message: err.to_string(),
        }
    }
}

pub struct IndexStore {
    storage: Box<dyn IndexStorage>,
    /// Configured fields; the first one is the default field.
    fields: Vec<FieldDef>,
    slots: RefCell<HashMap<u32, FieldSlot>>,
    meta: Meta,
    /// Estimated size in bytes. Diagnostic only.
    size: u64,
    staging: StagingArea,
}

impl IndexStore {
    /// Empty store for a fresh build. Every configured field starts loaded;
    /// previously saved staged items are kept.
    pub fn empty(storage: Box<dyn IndexStorage>, fields: &[String], seed: u32) -> Result<Self> {
        let fields = Self::field_defs(fields)?;
        let slots = fields
            .iter()
            .map(|f| (f.id, FieldSlot::Loaded(FieldIndex::new())))
            .collect();
        let staging = storage.load_staged()?.unwrap_or_default();
        Ok(Self {
            storage,
            fields,
            slots: RefCell::new(slots),
            meta: Meta::new(seed),
            size: 0,
            staging,
        })
    }

    /// Store over a persisted index. Fields are loaded on first access.
    pub fn open(storage: Box<dyn IndexStorage>, fields: &[String], meta: Meta) -> Result<Self> {
        let fields = Self::field_defs(fields)?;
        let slots = fields.iter().map(|f| (f.id, FieldSlot::NotLoaded)).collect();
        let staging = storage.load_staged()?.unwrap_or_default();
        Ok(Self {
            storage,
            fields,
            slots: RefCell::new(slots),
            meta,
            size: meta.size,
            staging,
        })
    }

    fn field_defs(fields: &[String]) -> Result<Vec<FieldDef>> {
        if fields.is_empty() {
            return Err(IndexError::Config("at least one indexed field is required".into()));
        }
        Ok(fields.iter().map(|name| FieldDef::new(name)).collect())
    }

    pub fn meta(&self) -> Meta {
        self.meta
    }

    pub fn seed(&self) -> u32 {
        self.meta.seed
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn default_field(&self) -> &FieldDef {
        &self.fields[0]
    }

    pub fn is_indexed(&self, field_id: u32) -> bool {
        self.fields.iter().any(|f| f.id == field_id)
    }

    /// Whether a field's sub-index is currently in memory.
    pub fn is_loaded(&self, field_id: u32) -> bool {
        matches!(self.slots.borrow().get(&field_id), Some(FieldSlot::Loaded(_)))
    }

    /// Record the element count of a completed build.
    pub fn finish_build(&mut self, total: u64) -> Meta {
        self.meta.total = total;
        self.meta.size = self.size;
        self.meta
    }

    /// Append one range under (field, value). Used by the builder.
    pub fn push(&mut self, field_id: u32, value_hash: u32, start: u64, end: u64) {
        let slot = self
            .slots
            .get_mut()
            .entry(field_id)
            .or_insert(FieldSlot::NotLoaded);
        if !matches!(slot, FieldSlot::Loaded(_)) {
            *slot = FieldSlot::Loaded(FieldIndex::new());
        }
        if let FieldSlot::Loaded(index) = slot {
            index
                .entry(value_hash)
                .or_default()
                .push(ByteRange::new(start, end));
        }
        self.size += ESTIMATED_ENTRY_SIZE;
    }

    /// Stage a new item under `key` (a value of the default field).
    ///
    /// The item is kept in the staging buffer until saved; it is not visible
    /// to `get_entry` or `query`.
    pub fn add_entry<T: Serialize + ?Sized>(&mut self, key: &str, item: &T) -> Result<StagedRange> {
        let raw = serde_json::to_vec(item)?;
        let index_key = self.default_key(key);
        debug!("new item: {}", key);
        self.size += ESTIMATED_ENTRY_SIZE;
        Ok(self.staging.stage(index_key, &raw))
    }

    /// Ranges matching `key` on the default field. Empty if absent.
    pub fn get_entry(&self, key: &str) -> Result<Vec<ByteRange>> {
        let index_key = self.default_key(key);
        self.lookup(index_key.field_id, index_key.value_hash)
    }

    /// Disk and staged locations for `key` on the default field.
    pub fn locations(&self, key: &str) -> Result<Vec<Location>> {
        let index_key = self.default_key(key);
        let mut locations: Vec<Location> = self
            .lookup(index_key.field_id, index_key.value_hash)?
            .into_iter()
            .map(Location::Disk)
            .collect();
        locations.extend(self.staging.locations(&index_key));
        Ok(locations)
    }

    /// Union of the ranges matching any (field name, raw value) pair.
    ///
    /// Results follow criteria order and keep duplicates: an element matching
    /// two pairs appears twice.
    pub fn query<I, K, V>(&self, criteria: I) -> Result<Vec<ByteRange>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut results = Vec::new();
        for (field, value) in criteria {
            let ranges = self.lookup(
                field_id(field.as_ref()),
                value_hash(value.as_ref(), self.meta.seed),
            )?;
            results.extend(ranges);
        }
        Ok(results)
    }

    /// Estimated index size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether `key` is present in the default field's in-memory sub-index.
    ///
    /// Does not load the field: returns false while it is not loaded.
    pub fn has(&self, key: &str) -> bool {
        let index_key = self.default_key(key);
        match self.slots.borrow().get(&index_key.field_id) {
            Some(FieldSlot::Loaded(index)) => index.contains_key(&index_key.value_hash),
            _ => false,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Persist loaded field indexes and meta (additively), then staged items.
    pub fn save(&self) -> Result<()> {
        let slots = self.slots.borrow();
        let loaded: Vec<(u32, &FieldIndex)> = slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                FieldSlot::Loaded(index) => Some((*id, index)),
                _ => None,
            })
            .collect();
        self.storage.create_if_required(&self.meta, &loaded)?;

        if !self.staging.is_empty() {
            self.storage.save_staged(&self.staging)?;
        }
        Ok(())
    }

    fn default_key(&self, key: &str) -> IndexKey {
        IndexKey {
            field_id: self.default_field().id,
            value_hash: value_hash(key.as_bytes(), self.meta.seed),
        }
    }

    fn lookup(&self, field_id: u32, value_hash: u32) -> Result<Vec<ByteRange>> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(field_id).or_insert(FieldSlot::NotLoaded);

        if matches!(slot, FieldSlot::NotLoaded) {
            debug!("opening field index {}", field_id);
            *slot = match self.storage.open_index(field_id) {
                Ok(index) => FieldSlot::Loaded(index),
                Err(e) => {
                    warn!("failed to load field index {}: {}", field_id, e);
                    FieldSlot::failed(&e)
                }
            };
        }

        match slot {
            FieldSlot::Loaded(index) => Ok(index.get(&value_hash).cloned().unwrap_or_default()),
            FieldSlot::Failed { kind, message } => {
                Err(IndexError::Io(io::Error::new(*kind, message.clone())))
            }
            FieldSlot::NotLoaded => unreachable!("slot resolved above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory storage counting blob loads.
    #[derive(Default)]
    struct MemStorage {
        meta: Option<Meta>,
        blobs: HashMap<u32, FieldIndex>,
        opens: Rc<Cell<usize>>,
    }

    impl IndexStorage for MemStorage {
        fn load(&self) -> Result<Meta> {
            self.meta.ok_or_else(|| IndexError::NotFound("mem".into()))
        }

        fn exists(&self, fields: &[String]) -> bool {
            self.meta.is_some() && fields.iter().all(|f| self.blobs.contains_key(&field_id(f)))
        }

        fn open_index(&self, field_id: u32) -> Result<FieldIndex> {
            self.opens.set(self.opens.get() + 1);
            self.blobs.get(&field_id).cloned().ok_or_else(|| {
                IndexError::Io(io::Error::new(io::ErrorKind::NotFound, "no such blob"))
            })
        }

        fn create_if_required(&self, _meta: &Meta, _index: &[(u32, &FieldIndex)]) -> Result<()> {
            Ok(())
        }

        fn save_staged(&self, _staging: &StagingArea) -> Result<()> {
            Ok(())
        }

        fn load_staged(&self) -> Result<Option<StagingArea>> {
            Ok(None)
        }
    }

    const SEED: u32 = 99;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn built_store() -> IndexStore {
        let mut store =
            IndexStore::empty(Box::new(MemStorage::default()), &fields(&["id", "color"]), SEED)
                .unwrap();
        let id = field_id("id");
        let color = field_id("color");
        store.push(id, value_hash(b"1", SEED), 1, 20);
        store.push(color, value_hash(b"red", SEED), 1, 20);
        store.push(id, value_hash(b"2", SEED), 21, 40);
        store.push(color, value_hash(b"blue", SEED), 21, 40);
        store.push(id, value_hash(b"3", SEED), 41, 60);
        store.push(color, value_hash(b"red", SEED), 41, 60);
        store
    }

    #[test]
    fn test_requires_fields() {
        match IndexStore::empty(Box::new(MemStorage::default()), &[], 0) {
            Err(IndexError::Config(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("store without fields was accepted"),
        }
    }

    #[test]
    fn test_get_entry_default_field() {
        let store = built_store();
        assert_eq!(store.get_entry("2").unwrap(), vec![ByteRange::new(21, 40)]);
        assert!(store.get_entry("404").unwrap().is_empty());
        // "red" is a color, not an id.
        assert!(store.get_entry("red").unwrap().is_empty());
    }

    #[test]
    fn test_push_keeps_duplicates_in_order() {
        let mut store = built_store();
        store.push(field_id("id"), value_hash(b"1", SEED), 100, 120);
        assert_eq!(
            store.get_entry("1").unwrap(),
            vec![ByteRange::new(1, 20), ByteRange::new(100, 120)]
        );
        assert_eq!(store.size(), 7 * ESTIMATED_ENTRY_SIZE);
    }

    #[test]
    fn test_query_is_union_not_intersection() {
        let store = built_store();

        // id=2 OR color=red: no element satisfies both, yet three match.
        let ranges = store.query([("id", "2"), ("color", "red")]).unwrap();
        assert_eq!(
            ranges,
            vec![ByteRange::new(21, 40), ByteRange::new(1, 20), ByteRange::new(41, 60)]
        );

        // Overlapping criteria keep duplicates.
        let ranges = store.query([("id", "1"), ("color", "red")]).unwrap();
        assert_eq!(
            ranges,
            vec![ByteRange::new(1, 20), ByteRange::new(1, 20), ByteRange::new(41, 60)]
        );
    }

    #[test]
    fn test_lazy_load_once() {
        let opens = Rc::new(Cell::new(0));
        let mut blobs = HashMap::new();
        let mut ids = FieldIndex::new();
        ids.insert(value_hash(b"7", SEED), vec![ByteRange::new(5, 9)]);
        blobs.insert(field_id("id"), ids);
        let storage = MemStorage {
            meta: Some(Meta::new(SEED)),
            blobs,
            opens: opens.clone(),
        };

        let store = IndexStore::open(Box::new(storage), &fields(&["id"]), Meta::new(SEED)).unwrap();
        assert!(!store.is_loaded(field_id("id")));
        // has() never forces a load.
        assert!(!store.has("7"));
        assert_eq!(opens.get(), 0);

        assert_eq!(store.get_entry("7").unwrap(), vec![ByteRange::new(5, 9)]);
        assert!(store.get_entry("8").unwrap().is_empty());
        assert_eq!(opens.get(), 1);
        assert!(store.is_loaded(field_id("id")));
        assert!(store.has("7"));
    }

    #[test]
    fn test_missing_blob_is_io_error_and_sticky() {
        let opens = Rc::new(Cell::new(0));
        let storage = MemStorage {
            meta: Some(Meta::new(SEED)),
            blobs: HashMap::new(),
            opens: opens.clone(),
        };
        let store = IndexStore::open(Box::new(storage), &fields(&["id"]), Meta::new(SEED)).unwrap();

        for _ in 0..2 {
            match store.get_entry("1") {
                Err(IndexError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
                other => panic!("expected IO error, got {:?}", other),
            }
        }
        assert_eq!(opens.get(), 1);

        // Unconfigured fields behave the same way.
        assert!(matches!(store.query([("nope", "x")]), Err(IndexError::Io(_))));
    }

    #[test]
    fn test_add_entry_is_staged_only() {
        let mut store = built_store();
        let before = store.size();
        let range = store.add_entry("9", &serde_json::json!({"id": "9"})).unwrap();

        assert_eq!(store.size(), before + ESTIMATED_ENTRY_SIZE);
        assert!(store.get_entry("9").unwrap().is_empty());
        assert!(!store.has("9"));

        let locations = store.locations("9").unwrap();
        assert_eq!(locations, vec![Location::Staged(range)]);
        let raw = store.staging().resolve(&locations[0]).unwrap();
        assert_eq!(raw, br#"{"id":"9"}"#);
    }

    #[test]
    fn test_finish_build_updates_meta() {
        let mut store = built_store();
        let meta = store.finish_build(3);
        assert_eq!(meta.seed, SEED);
        assert_eq!(meta.total, 3);
        assert_eq!(meta.size, 6 * ESTIMATED_ENTRY_SIZE);
    }
}
