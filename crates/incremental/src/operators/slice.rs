//! OFFSET / LIMIT over diff streams.
//!
//! The ordered variant windows rows by their upstream order annotation, so
//! a deletion inside the window pulls in the next row in order. The
//! unordered variant keeps skipped, result and overflow multisets and
//! promotes an arbitrary overflow row when the window shrinks.

use crate::delta::DiffRow;
use crate::memory::{MemoryEntry, Multiset};
use crate::stream::DiffStream;
use futures::stream::{Stream, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};
use tributary_core::{Bindings, Error, HashKey, Result, SharedHasher};

/// Window bounds: rows `[start, start + length)`; no length means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliceWindow {
    pub start: u64,
    pub length: Option<u64>,
}

impl SliceWindow {
    pub fn new(start: u64, length: Option<u64>) -> Self {
        Self { start, length }
    }

    fn end(&self) -> u64 {
        match self.length {
            Some(length) => self.start.saturating_add(length),
            None => u64::MAX,
        }
    }

    fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end()
    }
}

/// A windowing strategy fed one diff at a time.
pub trait SliceStrategy: Send {
    /// Applies `row`, appending the resulting diffs to `output`.
    fn apply(&mut self, row: DiffRow, output: &mut VecDeque<DiffRow>) -> Result<()>;

    fn clear(&mut self);
}

/// Window over rows annotated by an upstream order operator.
pub struct OrderedSlice {
    window: SliceWindow,
    hasher: SharedHasher,
    rows: BTreeMap<(u64, HashKey), MemoryEntry>,
    total: u64,
}

impl OrderedSlice {
    pub fn new(window: SliceWindow, hasher: SharedHasher) -> Self {
        Self {
            window,
            hasher,
            rows: BTreeMap::new(),
            total: 0,
        }
    }

    /// Number of rows ahead of `key` in order.
    fn rank(&self, key: &(u64, HashKey)) -> u64 {
        self.rows.range(..key).map(|(_, e)| e.count).sum()
    }

    /// The row at `position`, with its order index.
    fn row_at(&self, position: u64) -> Option<(u64, &Bindings)> {
        let mut seen = 0;
        for ((index, _), entry) in &self.rows {
            seen += entry.count;
            if position < seen {
                return Some((*index, &entry.value));
            }
        }
        None
    }

    fn emit_at(&self, position: u64, is_addition: bool, output: &mut VecDeque<DiffRow>) {
        if let Some((index, value)) = self.row_at(position) {
            output.push_back(DiffRow::new(value.clone(), is_addition).with_order(index));
        }
    }

    /// Number of rows currently inside the window.
    pub fn len(&self) -> u64 {
        self.total.saturating_sub(self.window.start).min(self.window.end() - self.window.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SliceStrategy for OrderedSlice {
    fn apply(&mut self, row: DiffRow, output: &mut VecDeque<DiffRow>) -> Result<()> {
        let index = row.order_index.ok_or(Error::MissingOrderContext)?;
        let key = (index, self.hasher.hash(&row.bindings, None));
        let window = self.window;
        let emits = window.end() > window.start;

        if row.is_addition {
            // A new row goes after its equals
            let position = self.rank(&key) + self.rows.get(&key).map_or(0, |e| e.count);
            let entry = self.rows.entry(key).or_insert_with(|| MemoryEntry {
                value: row.bindings.clone(),
                count: 0,
            });
            if entry.value != row.bindings {
                return Err(Error::hash_collision(key.1, key.1));
            }
            entry.count += 1;
            self.total += 1;

            if emits && position < window.end() {
                // Whatever sat at the end of the window is pushed out
                self.emit_at(window.end(), false, output);
                let entering = position.max(window.start);
                self.emit_at(entering, true, output);
            }
        } else {
            let entry = self
                .rows
                .get(&key)
                .ok_or_else(|| {
                    Error::removal_invariant(format!("slice never held {}", row.bindings))
                })?;
            if entry.value != row.bindings {
                return Err(Error::hash_collision(key.1, key.1));
            }
            // The last of its equals leaves
            let position = self.rank(&key) + entry.count - 1;
            let shifts = emits && position < window.end();
            if shifts {
                let leaving = position.max(window.start);
                self.emit_at(leaving, false, output);
            }

            if let Some(entry) = self.rows.get_mut(&key) {
                entry.count -= 1;
                if entry.count == 0 {
                    self.rows.remove(&key);
                }
            }
            self.total -= 1;

            if shifts && window.length.is_some() {
                // The first row past the window moves in
                let promoted = window.end() - 1;
                if window.contains(promoted) {
                    self.emit_at(promoted, true, output);
                    log::debug!("ordered slice promoted row at position {}", promoted);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.total = 0;
    }
}

/// Window over rows without an order; replacements are arbitrary.
pub struct UnorderedSlice {
    window: SliceWindow,
    hasher: SharedHasher,
    skipped: Multiset,
    result: Multiset,
    overflow: Multiset,
}

impl UnorderedSlice {
    pub fn new(window: SliceWindow, hasher: SharedHasher) -> Self {
        Self {
            window,
            hasher,
            skipped: Multiset::new(),
            result: Multiset::new(),
            overflow: Multiset::new(),
        }
    }

    fn result_has_room(&self) -> bool {
        match self.window.length {
            Some(length) => self.result.total() < length,
            None => true,
        }
    }

    /// Refills `result` from `overflow` after a row left it.
    fn promote(&mut self, output: &mut VecDeque<DiffRow>) -> Result<()> {
        if !self.result_has_room() {
            return Ok(());
        }
        if let Some(value) = self.overflow.pop_any() {
            let key = self.hasher.hash(&value, None);
            self.result.insert(key, value.clone())?;
            output.push_back(DiffRow::addition(value));
            log::debug!("unordered slice promoted an overflow row");
        }
        Ok(())
    }

    /// Number of rows inside the window.
    pub fn len(&self) -> u64 {
        self.result.total()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

impl SliceStrategy for UnorderedSlice {
    fn apply(&mut self, row: DiffRow, output: &mut VecDeque<DiffRow>) -> Result<()> {
        let key = self.hasher.hash(&row.bindings, None);

        if row.is_addition {
            if self.skipped.total() < self.window.start {
                self.skipped.insert(key, row.bindings)?;
            } else if self.result_has_room() {
                self.result.insert(key, row.bindings.clone())?;
                output.push_back(DiffRow::addition(row.bindings));
            } else {
                self.overflow.insert(key, row.bindings)?;
            }
            return Ok(());
        }

        if self.overflow.contains(key) {
            self.overflow.remove(key, &row.bindings)?;
        } else if self.result.contains(key) {
            self.result.remove(key, &row.bindings)?;
            output.push_back(DiffRow::deletion(row.bindings));
            self.promote(output)?;
        } else if self.skipped.contains(key) {
            self.skipped.remove(key, &row.bindings)?;
            // The offset now swallows one row of the window
            if let Some(value) = self.result.pop_any() {
                output.push_back(DiffRow::deletion(value.clone()));
                let moved_key = self.hasher.hash(&value, None);
                self.skipped.insert(moved_key, value)?;
                self.promote(output)?;
            } else if let Some(value) = self.overflow.pop_any() {
                // Zero-length window: overflow feeds the offset directly
                let moved_key = self.hasher.hash(&value, None);
                self.skipped.insert(moved_key, value)?;
            }
        } else {
            return Err(Error::removal_invariant(format!(
                "slice never held {}",
                row.bindings
            )));
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.skipped.clear();
        self.result.clear();
        self.overflow.clear();
    }
}

/// Applies a [`SliceStrategy`] to a diff stream.
pub struct Slice<S> {
    input: Option<DiffStream>,
    strategy: S,
    output: VecDeque<DiffRow>,
}

impl<S: SliceStrategy> Slice<S> {
    pub fn new(input: DiffStream, strategy: S) -> Self {
        Self {
            input: Some(input),
            strategy,
            output: VecDeque::new(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

impl<S: SliceStrategy + Unpin + 'static> Slice<S> {
    pub fn into_stream(self) -> DiffStream {
        Box::pin(self)
    }
}

impl<S: SliceStrategy + Unpin> Stream for Slice<S> {
    type Item = Result<DiffRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(row) = this.output.pop_front() {
                return Poll::Ready(Some(Ok(row)));
            }
            let input = match this.input.as_mut() {
                Some(input) => input,
                None => return Poll::Ready(None),
            };
            let failure = match input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(row))) => match this.strategy.apply(row, &mut this.output) {
                    Ok(()) => continue,
                    Err(e) => e,
                },
                Poll::Ready(Some(Err(e))) => e,
                Poll::Ready(None) => {
                    this.input = None;
                    this.strategy.clear();
                    continue;
                }
                Poll::Pending => return Poll::Pending,
            };
            log::error!("slice terminated: {}", failure);
            this.input = None;
            this.output.clear();
            this.strategy.clear();
            return Poll::Ready(Some(Err(failure)));
        }
    }
}
