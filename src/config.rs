//! Index configuration and buffer auto-tuning.
//!
//! `IndexConfig` can be persisted next to an index as `index_config.json`.
//! `IndexConfig::auto_tuned()` probes available RAM and sizes the build
//! buffer to the host.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::error::{IndexError, Result};

// ── Constants ───────────────────────────────────────────────────────

const MB: usize = 1024 * 1024;

pub const CONFIG_FILE: &str = "index_config.json";

/// Default build chunk size (256 MB).
pub const DEFAULT_PARSE_BUFFER_SIZE: usize = 256 * MB;

/// Default read window capacity (50 MB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 50 * MB;

/// Auto-tuned parse buffer floor (4 MB).
const PARSE_BUFFER_MIN: usize = 4 * MB;

/// Fraction of available memory given to the parse buffer. Two chunk
/// buffers can be alive at once during a build.
const PARSE_BUFFER_FRACTION: f64 = 0.05;

// ── IndexConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Indexed field names. The first one is the default field used by
    /// `get_entry`, `add_entry` and `has`.
    pub fields: Vec<String>,
    /// Bytes read per chunk while building.
    pub parse_buffer_size: usize,
    /// Capacity of the read window used by result views.
    pub read_buffer_size: usize,
    /// Pinned Murmur3 seed for new indexes. Random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            parse_buffer_size: DEFAULT_PARSE_BUFFER_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            seed: None,
        }
    }
}

impl IndexConfig {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_parse_buffer_size(mut self, size: usize) -> Self {
        self.parse_buffer_size = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Config whose parse buffer is sized from available memory.
    pub fn auto_tuned<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();
        Self::new(fields).with_parse_buffer_size(parse_buffer_for(sys.available_memory()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(IndexError::Config("at least one indexed field is required".into()));
        }
        if let Some(empty) = self.fields.iter().position(|f| f.is_empty()) {
            return Err(IndexError::Config(format!("field #{} has an empty name", empty)));
        }
        if self.parse_buffer_size == 0 {
            return Err(IndexError::Config("parse_buffer_size must be positive".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(IndexError::Config("read_buffer_size must be positive".into()));
        }
        Ok(())
    }

    /// Read config from an index directory. Returns None if the file doesn't exist.
    pub fn read_from(index_dir: &Path) -> Result<Option<Self>> {
        let path = index_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    /// Write config to an index directory.
    pub fn write_to(&self, index_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(index_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(index_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }
}

/// Parse buffer size for a host with `available` bytes of free memory:
/// `clamp(available * 0.05, 4 MB, 256 MB)`.
fn parse_buffer_for(available: u64) -> usize {
    let raw = (available as f64 * PARSE_BUFFER_FRACTION) as usize;
    raw.clamp(PARSE_BUFFER_MIN, DEFAULT_PARSE_BUFFER_SIZE)
}
