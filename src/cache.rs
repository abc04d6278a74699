//! Single-window read cache over the data file.
//!
//! Holds at most `capacity` bytes of the file, the window
//! `[window_start, window_end)`. Callers usually read ranges in ascending
//! file order, so one forward-moving window turns many small reads into a
//! few large ones. Random access degrades to one disk read per call.
//!
//! Boundary condition: a read is a miss only when it *starts* outside the
//! window. A range that starts inside the window but runs past
//! `window_end` is served from the window and comes back truncated.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{IndexError, Result};

/// Windowed reader borrowing the data file. Never closes it.
#[derive(Debug)]
pub struct RangeCache<'f> {
    file: &'f File,
    capacity: usize,
    buf: Vec<u8>,
    /// Current window; `None` until the first read.
    window: Option<(u64, u64)>,
    fills: usize,
}

impl<'f> RangeCache<'f> {
    pub fn new(file: &'f File, capacity: usize) -> Self {
        Self {
            file,
            capacity,
            buf: Vec::new(),
            window: None,
            fills: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current window as `(start, end)`, if anything was read yet.
    pub fn window(&self) -> Option<(u64, u64)> {
        self.window
    }

    /// Number of disk reads performed so far.
    pub fn fills(&self) -> usize {
        self.fills
    }

    /// Bytes of `[start, end)`.
    pub fn read(&mut self, start: u64, end: u64) -> Result<&[u8]> {
        let len = end.saturating_sub(start);
        if len > self.capacity as u64 {
            return Err(IndexError::RangeTooLarge {
                len,
                capacity: self.capacity,
            });
        }

        let (window_start, _) = match self.window {
            Some((ws, we)) if start >= ws && start <= we => (ws, we),
            _ => self.fill(start)?,
        };

        let from = (start - window_start) as usize;
        let to = ((end - window_start) as usize).min(self.buf.len());
        Ok(&self.buf[from.min(to)..to])
    }

    fn fill(&mut self, start: u64) -> Result<(u64, u64)> {
        self.buf.resize(self.capacity, 0);
        let mut file = self.file;
        file.seek(SeekFrom::Start(start))?;

        let mut filled = 0;
        while filled < self.capacity {
            match file.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.window = None;
                    self.buf.clear();
                    return Err(e.into());
                }
            }
        }
        self.buf.truncate(filled);

        let window = (start, start + filled as u64);
        self.window = Some(window);
        self.fills += 1;
        debug!("buffering new range: {}..{}", window.0, window.1);
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DATA: &[u8] = b"0123456789ABCDEF0123456789ABCDEF";

    fn data_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DATA).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_single_refill_scenario() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 16);

        assert_eq!(cache.read(0, 10).unwrap(), b"0123456789");
        assert_eq!(cache.fills(), 1);
        assert_eq!(cache.window(), Some((0, 16)));

        assert_eq!(cache.read(20, 26).unwrap(), b"456789");
        assert_eq!(cache.fills(), 2, "exactly one refill");
        assert_eq!(cache.window(), Some((20, 32)));
    }

    #[test]
    fn test_hits_do_not_read() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 16);

        cache.read(0, 4).unwrap();
        assert_eq!(cache.read(4, 8).unwrap(), b"4567");
        assert_eq!(cache.read(10, 16).unwrap(), b"ABCDEF");
        assert_eq!(cache.fills(), 1);

        // Going backwards is a miss.
        cache.read(20, 24).unwrap();
        assert_eq!(cache.read(2, 3).unwrap(), b"2");
        assert_eq!(cache.fills(), 3);
    }

    #[test]
    fn test_range_too_large() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 16);

        let err = cache.read(0, 17).unwrap_err();
        assert!(matches!(err, IndexError::RangeTooLarge { len: 17, capacity: 16 }));
        // Exactly capacity is fine.
        assert_eq!(cache.read(16, 32).unwrap(), &DATA[16..32]);
    }

    #[test]
    fn test_overrun_past_window_is_truncated() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 16);

        cache.read(0, 4).unwrap();
        // Starts inside [0, 16) but ends past it: served from the window.
        let bytes = cache.read(12, 20).unwrap();
        assert_eq!(bytes, b"CDEF");
        assert_eq!(cache.fills(), 1);

        // Starting exactly at window_end is not a miss either.
        assert!(cache.read(16, 18).unwrap().is_empty());
        assert_eq!(cache.fills(), 1);
    }

    #[test]
    fn test_reads_match_file_contents() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 8);

        // Ascending ranges that never straddle or touch the window end.
        for (s, e) in [(0u64, 3u64), (3, 8), (9, 12), (12, 17), (18, 26), (27, 32)] {
            assert_eq!(cache.read(s, e).unwrap(), &DATA[s as usize..e as usize], "{}..{}", s, e);
        }
    }

    #[test]
    fn test_window_shrinks_at_eof() {
        let tmp = data_file();
        let file = File::open(tmp.path()).unwrap();
        let mut cache = RangeCache::new(&file, 16);

        assert_eq!(cache.read(28, 32).unwrap(), b"CDEF");
        assert_eq!(cache.window(), Some((28, 32)));
    }
}
