//! Streaming structural scanner over raw JSON bytes.
//!
//! Walks a JSON array one byte at a time and reports the byte range of every
//! complete top-level element. Key-extracting sinks additionally receive the
//! `(field_id, value_hash)` pairs of the element's configured fields.
//!
//! The scanner only tracks braces, brackets and strings. It does not validate
//! JSON; malformed input yields undefined boundaries.
//!
//! State lives in [`ScanState`], which callers carry across successive
//! chunks so elements and strings that span reads are still recognized,
//! including a backslash that ends one chunk and escapes the first quote of
//! the next.
//!
//! Known limitation: a quote preceded by a backslash never toggles string
//! mode, so a string ending in an escaped backslash (`"a\\"`) is not closed
//! where it should be.

use crate::hash::{step_field_hash, value_hash};
use crate::types::{ByteRange, IndexKey};

const OPENING_BRACE: u8 = b'{';
const CLOSING_BRACE: u8 = b'}';
const OPENING_BRACKET: u8 = b'[';
const CLOSING_BRACKET: u8 = b']';
const DOUBLE_QUOTE: u8 = b'"';
const BACKSLASH: u8 = b'\\';
const COLON: u8 = b':';
const COMMA: u8 = b',';

/// Consumer of scanner output.
///
/// The consumption strategy is fixed per sink type: `EXTRACT_KEYS` is a
/// constant, so range-only sinks compile the key-extraction path out.
pub trait ElementSink {
    /// Whether the scanner should hash configured field values.
    const EXTRACT_KEYS: bool;

    /// Whether `field_id` is an indexed field. Only called when
    /// `EXTRACT_KEYS` is true.
    fn is_indexed(&self, _field_id: u32) -> bool {
        false
    }

    /// Murmur3 seed for value hashes. Only called when `EXTRACT_KEYS` is true.
    fn seed(&self) -> u32 {
        0
    }

    /// A top-level element closed. `keys` is empty for range-only sinks.
    fn element(&mut self, range: ByteRange, keys: &[IndexKey]);
}

/// Range-only sink: collects element boundaries.
impl ElementSink for Vec<ByteRange> {
    const EXTRACT_KEYS: bool = false;

    fn element(&mut self, range: ByteRange, _keys: &[IndexKey]) {
        self.push(range);
    }
}

/// Scanner state carried across chunk boundaries.
#[derive(Debug, Clone)]
pub struct ScanState {
    /// Brace depth. -1 means outside any element.
    pub depth: i32,
    /// Inside a string literal.
    pub in_string: bool,
    /// Running hash of the current field name.
    pub field_hash: u32,
    /// Keys collected for the element being scanned.
    pub pending_keys: Vec<IndexKey>,
    /// Absolute file offset of the next byte to scan.
    pub offset: u64,
    /// The next string at element level is a value (set by `:`, cleared by `,`).
    is_value: bool,
    /// Bracket depth inside the current element's direct members.
    list_depth: u32,
    prev: Option<u8>,
    element_start: u64,
    /// Field id of the value being captured, if it is an indexed field.
    capture: Option<u32>,
    value: Vec<u8>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanState {
    pub fn new() -> Self {
        Self::at_offset(0)
    }

    /// State for a scan whose first byte sits at absolute `offset`.
    pub fn at_offset(offset: u64) -> Self {
        Self {
            depth: -1,
            in_string: false,
            field_hash: 0,
            pending_keys: Vec::new(),
            offset,
            is_value: false,
            list_depth: 0,
            prev: None,
            element_start: 0,
            capture: None,
            value: Vec::new(),
        }
    }

    /// Absolute offset where the element being scanned started, if any.
    pub fn open_element_start(&self) -> Option<u64> {
        (self.depth >= 0).then_some(self.element_start)
    }

    /// Scan one chunk. Offsets continue from the previous chunk.
    pub fn scan<S: ElementSink>(&mut self, chunk: &[u8], sink: &mut S) {
        for &byte in chunk {
            self.step(byte, sink);
        }
    }

    /// Advance the state by one byte.
    #[inline]
    pub fn step<S: ElementSink>(&mut self, byte: u8, sink: &mut S) {
        let position = self.offset;
        // Only direct members of a top-level element are indexed.
        let member_level = S::EXTRACT_KEYS && self.depth == 0 && self.list_depth == 0;

        if byte == DOUBLE_QUOTE && self.prev != Some(BACKSLASH) {
            if member_level {
                if self.in_string {
                    self.close_string(sink);
                } else {
                    self.open_string(sink);
                }
            }
            self.in_string = !self.in_string;
        } else if self.in_string {
            if member_level {
                if self.is_value {
                    if self.capture.is_some() {
                        self.value.push(byte);
                    }
                } else {
                    self.field_hash = step_field_hash(self.field_hash, byte);
                }
            }
        } else {
            match byte {
                OPENING_BRACE => {
                    self.depth += 1;
                    if self.depth == 0 {
                        self.begin_element(position);
                    }
                }
                CLOSING_BRACE if self.depth >= 0 => {
                    self.depth -= 1;
                    if self.depth == -1 {
                        self.end_element(position + 1, sink);
                    }
                }
                OPENING_BRACKET if self.depth == 0 => self.list_depth += 1,
                CLOSING_BRACKET if self.depth == 0 => {
                    self.list_depth = self.list_depth.saturating_sub(1)
                }
                COLON => self.is_value = true,
                COMMA if self.list_depth == 0 => self.is_value = false,
                _ => {}
            }
        }

        self.prev = Some(byte);
        self.offset += 1;
    }

    fn open_string<S: ElementSink>(&mut self, sink: &S) {
        if self.is_value {
            self.value.clear();
            self.capture = sink
                .is_indexed(self.field_hash)
                .then_some(self.field_hash);
        } else {
            self.field_hash = 0;
        }
    }

    fn close_string<S: ElementSink>(&mut self, sink: &S) {
        if !self.is_value {
            return;
        }
        if let Some(field_id) = self.capture.take() {
            self.pending_keys.push(IndexKey {
                field_id,
                value_hash: value_hash(&self.value, sink.seed()),
            });
        }
        self.value.clear();
        self.field_hash = 0;
    }

    fn begin_element(&mut self, position: u64) {
        self.element_start = position;
        self.is_value = false;
        self.list_depth = 0;
        self.field_hash = 0;
        self.capture = None;
        self.pending_keys.clear();
    }

    fn end_element<S: ElementSink>(&mut self, end: u64, sink: &mut S) {
        sink.element(ByteRange::new(self.element_start, end), &self.pending_keys);
        self.pending_keys.clear();
        self.capture = None;
        self.list_depth = 0;
    }
}
