//! Extraction mode: iterate the raw bytes of every top-level element.
//!
//! Same traversal as the index build, but completed ranges are handed back
//! as owned slices instead of being routed to an index. Bytes of an element
//! that spans reads are carried over until the element closes, so memory
//! stays bounded by the chunk size plus the largest element.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use crate::error::Result;
use crate::scanner::ScanState;
use crate::types::ByteRange;

/// Iterator over the raw top-level elements of a JSON array.
pub struct Elements<R> {
    reader: R,
    state: ScanState,
    chunk_size: usize,
    /// Unconsumed bytes; `buf[0]` sits at absolute offset `buf_offset`.
    buf: Vec<u8>,
    buf_offset: u64,
    ready: VecDeque<Vec<u8>>,
    done: bool,
}

impl<R: Read> Elements<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            state: ScanState::new(),
            chunk_size: chunk_size.max(1),
            buf: Vec::new(),
            buf_offset: 0,
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Read and scan one chunk. Returns false at end of input.
    fn fill(&mut self) -> Result<bool> {
        let scan_from = self.buf.len();
        self.buf.resize(scan_from + self.chunk_size, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[scan_from..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(scan_from);
                    return Err(e.into());
                }
            }
        };
        self.buf.truncate(scan_from + read);
        if read == 0 {
            return Ok(false);
        }

        let mut ranges: Vec<ByteRange> = Vec::new();
        self.state.scan(&self.buf[scan_from..], &mut ranges);
        for range in ranges {
            let start = (range.start - self.buf_offset) as usize;
            let end = (range.end - self.buf_offset) as usize;
            self.ready.push_back(self.buf[start..end].to_vec());
        }

        // Keep only the bytes of an element still open at the chunk end.
        let keep_from = self.state.open_element_start().unwrap_or(self.state.offset);
        self.buf.drain(..(keep_from - self.buf_offset) as usize);
        self.buf_offset = keep_from;
        Ok(true)
    }
}

impl<R: Read> Iterator for Elements<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(element) = self.ready.pop_front() {
                return Some(Ok(element));
            }
            if self.done {
                return None;
            }
            match self.fill() {
                Ok(true) => {}
                Ok(false) => {
                    if self.state.depth >= 0 {
                        tracing::warn!(
                            "input ended inside an element starting at offset {}",
                            self.buf_offset
                        );
                    }
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
