//! Index build driver.
//!
//! One pass over the data file in fixed-size chunks:
//! - a reader thread reads chunk N+1 while the calling thread scans chunk N;
//! - the rendezvous channel between them keeps at most one read-ahead
//!   buffer alive, so peak memory is O(chunk size) for any file size;
//! - exactly one [`ScanState`] exists and it is carried across chunks, so
//!   offsets are absolute and cross-chunk elements are found.
//!
//! Any read error aborts the whole build. The caller decides what to
//! persist; a failed build leaves nothing on disk.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::scanner::{ElementSink, ScanState};
use crate::store::IndexStore;
use crate::types::{ByteRange, IndexKey, Meta};

/// Outcome of one build pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub elements: u64,
    pub chunks: u64,
    pub bytes: u64,
}

/// Routes scanner output into an index store.
struct StoreSink<'a> {
    store: &'a mut IndexStore,
    seed: u32,
    elements: u64,
}

impl ElementSink for StoreSink<'_> {
    const EXTRACT_KEYS: bool = true;

    fn is_indexed(&self, field_id: u32) -> bool {
        self.store.is_indexed(field_id)
    }

    fn seed(&self) -> u32 {
        self.seed
    }

    fn element(&mut self, range: ByteRange, keys: &[IndexKey]) {
        for key in keys {
            self.store
                .push(key.field_id, key.value_hash, range.start, range.end);
        }
        self.elements += 1;
    }
}

pub struct IndexBuilder {
    chunk_size: usize,
}

impl IndexBuilder {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Scan `data_path` into `store` and return the finished meta.
    ///
    /// Uses the store's seed and field set.
    pub fn build(&self, data_path: &Path, store: &mut IndexStore) -> Result<Meta> {
        let started = Instant::now();
        debug!("creating index for {}", data_path.display());

        let stats = self.scan_file(data_path, store)?;
        let meta = store.finish_build(stats.elements);

        debug!(
            "done, {} elements in {} chunks, took {} secs",
            stats.elements,
            stats.chunks,
            started.elapsed().as_secs_f64()
        );
        Ok(meta)
    }

    fn scan_file(&self, data_path: &Path, store: &mut IndexStore) -> Result<BuildStats> {
        let file = File::open(data_path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = self.chunk_size;

        let (tx, rx) = bounded::<io::Result<Vec<u8>>>(0);
        let reader = thread::Builder::new()
            .name("jsonidx-reader".into())
            .spawn(move || read_chunks(file, file_size, chunk_size, tx))?;

        let seed = store.seed();
        let mut sink = StoreSink {
            store,
            seed,
            elements: 0,
        };
        let mut state = ScanState::new();
        let mut stats = BuildStats {
            elements: 0,
            chunks: 0,
            bytes: 0,
        };

        let mut failure = None;
        for chunk in rx.iter() {
            match chunk {
                Ok(chunk) => {
                    state.scan(&chunk, &mut sink);
                    stats.chunks += 1;
                    stats.bytes += chunk.len() as u64;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        // Unblocks the reader if we stopped early.
        drop(rx);

        if reader.join().is_err() {
            return Err(IndexError::BuildAborted("reader thread panicked".into()));
        }
        if let Some(e) = failure {
            warn!("index build aborted after {} bytes: {}", stats.bytes, e);
            return Err(e.into());
        }
        if stats.bytes < file_size {
            return Err(IndexError::BuildAborted(format!(
                "read {} of {} bytes",
                stats.bytes, file_size
            )));
        }
        if let Some(start) = state.open_element_start() {
            warn!("data ends inside an element starting at offset {}", start);
        }

        stats.elements = sink.elements;
        Ok(stats)
    }
}

/// Reader thread body: send `file_size` bytes in chunks, the last one sized
/// to what remains. Stops at the first error or when the scanner hangs up.
fn read_chunks(mut file: File, file_size: u64, chunk_size: usize, tx: Sender<io::Result<Vec<u8>>>) {
    let mut remaining = file_size;
    while remaining > 0 {
        let len = remaining.min(chunk_size as u64) as usize;
        let mut buf = vec![0u8; len];
        let chunk = file.read_exact(&mut buf).map(|_| buf);
        let failed = chunk.is_err();
        if tx.send(chunk).is_err() || failed {
            return;
        }
        remaining -= len as u64;
    }
}
