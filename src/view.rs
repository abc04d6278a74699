//! Lazy, index-addressable view over matched elements.
//!
//! A `ResultView` holds only byte ranges. Each access reads the range through
//! its own [`RangeCache`] and decodes one element. Failures are per element:
//! a range that cannot be read or decoded is logged and reported as `None`,
//! and traversal continues.

use std::cell::RefCell;
use std::fs::File;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::cache::RangeCache;
use crate::error::Result;
use crate::types::ByteRange;

#[derive(Debug)]
pub struct ResultView<'f> {
    ranges: Vec<ByteRange>,
    cache: RefCell<RangeCache<'f>>,
}

impl<'f> ResultView<'f> {
    pub fn new(file: &'f File, ranges: Vec<ByteRange>, window_size: usize) -> Self {
        Self {
            ranges,
            cache: RefCell::new(RangeCache::new(file, window_size)),
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Byte ranges backing this view, in result order.
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Disk reads performed by this view's cache.
    pub fn fills(&self) -> usize {
        self.cache.borrow().fills()
    }

    /// Element at `index` as JSON. `None` if out of bounds or unreadable.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.get_as(index)
    }

    /// Element at `index` decoded as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        let range = *self.ranges.get(index)?;
        match self.decode(range) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(
                    "ERROR reading item {} at {}..{}: {}",
                    index, range.start, range.end, e
                );
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, range: ByteRange) -> Result<T> {
        let mut cache = self.cache.borrow_mut();
        let raw = cache.read(range.start, range.end)?;
        Ok(serde_json::from_slice(raw)?)
    }

    /// One-shot forward iteration.
    pub fn iter(&self) -> Iter<'_, 'f> {
        Iter {
            view: self,
            next: 0,
        }
    }

    pub fn map<U, F>(&self, mut f: F) -> Vec<U>
    where
        F: FnMut(Option<Value>, usize) -> U,
    {
        (0..self.len()).map(|i| f(self.get(i), i)).collect()
    }

    pub fn filter<F>(&self, mut f: F) -> Vec<Option<Value>>
    where
        F: FnMut(Option<&Value>, usize) -> bool,
    {
        let mut filtered = Vec::new();
        for i in 0..self.len() {
            let item = self.get(i);
            if f(item.as_ref(), i) {
                filtered.push(item);
            }
        }
        filtered
    }

    pub fn reduce<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, Option<Value>, usize) -> A,
    {
        (0..self.len()).fold(init, |acc, i| f(acc, self.get(i), i))
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Option<Value>, usize),
    {
        for i in 0..self.len() {
            f(self.get(i), i);
        }
    }

    /// Elements for the sub-list `[begin, end)`, indexed by their position
    /// in the sub-list: result `i` is `get(i)`, not `get(begin + i)`.
    pub fn slice(&self, begin: usize, end: usize) -> Vec<Option<Value>> {
        let end = end.min(self.len());
        let begin = begin.min(end);
        (0..end - begin).map(|i| self.get(i)).collect()
    }

    pub fn every<F>(&self, mut f: F) -> bool
    where
        F: FnMut(Option<Value>, usize) -> bool,
    {
        (0..self.len()).all(|i| f(self.get(i), i))
    }

    pub fn some<F>(&self, mut f: F) -> bool
    where
        F: FnMut(Option<Value>, usize) -> bool,
    {
        (0..self.len()).any(|i| f(self.get(i), i))
    }
}

impl<'v, 'f> IntoIterator for &'v ResultView<'f> {
    type Item = Option<Value>;
    type IntoIter = Iter<'v, 'f>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Forward iterator over a view's elements.
pub struct Iter<'v, 'f> {
    view: &'v ResultView<'f>,
    next: usize,
}

impl Iterator for Iter<'_, '_> {
    type Item = Option<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.view.len() {
            return None;
        }
        let item = self.view.get(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.view.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Iter<'_, '_> {}
