//! jsonidx - secondary indexes over huge JSON array files.
//!
//! The data file is never loaded into memory. A single streaming pass
//! records the byte range of every top-level element under the hashes of
//! its configured fields; lookups return lazy views that read matching
//! elements back through a bounded window.

pub mod error;
pub mod types;
pub mod hash;
pub mod scanner;
pub mod extract;
pub mod builder;
pub mod persist;
pub mod store;
pub mod cache;
pub mod view;
pub mod config;
pub mod index;

pub use error::{IndexError, Result};
pub use types::{ByteRange, IndexKey, Location, Meta, StagedRange};
pub use scanner::{ElementSink, ScanState};
pub use extract::Elements;
pub use builder::{BuildStats, IndexBuilder};
pub use persist::{DirStorage, FieldIndex, IndexStorage};
pub use store::{FieldDef, FieldSlot, IndexStore, StagingArea};
pub use cache::RangeCache;
pub use view::ResultView;
pub use config::IndexConfig;
pub use index::JsonIndex;
