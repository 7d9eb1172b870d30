//! Per-traversal cursors.

use crate::errors::ReplayError;
use crate::replay::recorder::{Outcome, Recorder};
use crate::source::{Characteristics, SizeHint, SourceCursor};
use std::sync::Arc;

// ── ReplayCursor ──────────────────────────────────────────────────────────────

/// Reads index by index through the recorder, which serves buffered
/// elements and pulls unseen ones.
pub struct ReplayCursor<S: SourceCursor> {
    recorder: Arc<Recorder<S>>,
    index: usize,
}

impl<S: SourceCursor> ReplayCursor<S> {
    pub fn new(recorder: Arc<Recorder<S>>) -> Self {
        Self { recorder, index: 0 }
    }

    /// Index of the next element this cursor will ask for.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves past the current index on a value or end of sequence. An error
    /// leaves the index in place so the same element can be asked for again.
    pub fn advance(&mut self) -> Result<Outcome<S::Item>, ReplayError>
    where
        S::Item: Clone,
    {
        let outcome = self.recorder.fetch(self.index)?;
        self.index += 1;
        Ok(outcome)
    }

    /// The source's characteristics. Asking opens the source if no
    /// traversal has yet.
    pub fn characteristics(&self) -> Characteristics {
        self.recorder.characteristics()
    }

    /// The source's size estimate less what this cursor already read.
    /// Opens the source like [`ReplayCursor::characteristics`].
    pub fn size_hint(&self) -> SizeHint {
        match self.recorder.size_hint() {
            SizeHint::Known(len) => SizeHint::Known(len.saturating_sub(self.index as u64)),
            SizeHint::Unknown => SizeHint::Unknown,
        }
    }
}

// ── MaterializedCursor ────────────────────────────────────────────────────────

/// Reads a half-open range of a fully drained, frozen buffer. Never locks.
///
/// The buffer cannot change once frozen, so the range end is fixed at
/// construction and splitting hands out disjoint halves.
pub struct MaterializedCursor<T> {
    items: Arc<[T]>,
    start: usize,
    end: usize,
    characteristics: Characteristics,
}

impl<T> MaterializedCursor<T> {
    pub fn new(items: Arc<[T]>, source_characteristics: Characteristics) -> Self {
        let end = items.len();
        Self {
            items,
            start: 0,
            end,
            characteristics: source_characteristics,
        }
    }

    pub fn advance(&mut self) -> Outcome<T>
    where
        T: Clone,
    {
        match self.items.get(self.start) {
            Some(item) if self.start < self.end => {
                self.start += 1;
                Outcome::Value(item.clone())
            }
            _ => Outcome::EndOfSequence,
        }
    }

    /// Splits off the front half of the remaining range, keeping the back
    /// half. `None` when fewer than two elements remain.
    pub fn split(&mut self) -> Option<Self> {
        let (lo, hi) = (self.start, self.end);
        let mid = lo + (hi - lo) / 2;
        if lo >= mid {
            return None;
        }
        self.start = mid;
        Some(Self {
            items: Arc::clone(&self.items),
            start: lo,
            end: mid,
            characteristics: self.characteristics,
        })
    }

    pub fn remaining(&self) -> usize {
        self.end - self.start
    }

    pub fn characteristics(&self) -> Characteristics {
        self.characteristics
            | Characteristics::ORDERED
            | Characteristics::SIZED
            | Characteristics::SUBSIZED
    }
}

impl<T: Clone> Iterator for MaterializedCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.advance().into_value()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl<T: Clone> ExactSizeIterator for MaterializedCursor<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::recorder::RecorderOptions;
    use crate::source::IterSource;

    fn frozen(len: u32) -> Arc<[u32]> {
        (0..len).collect::<Vec<_>>().into()
    }

    #[test]
    fn split_halves_cover_the_range_exactly_once() {
        let mut back = MaterializedCursor::new(frozen(7), Characteristics::NONE);
        let mut front = back.split().expect("splittable");
        assert_eq!(front.remaining(), 3);
        assert_eq!(back.remaining(), 4);

        let mut front_front = front.split().expect("splittable");
        let mut seen: Vec<u32> = front_front.by_ref().collect();
        seen.extend(front.by_ref());
        seen.extend(back.by_ref());
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn split_refuses_single_element_ranges() {
        let mut cursor = MaterializedCursor::new(frozen(1), Characteristics::NONE);
        assert!(cursor.split().is_none());
        assert_eq!(cursor.advance(), Outcome::Value(0));
        assert_eq!(cursor.advance(), Outcome::EndOfSequence);
        assert!(cursor.split().is_none());
    }

    #[test]
    fn materialized_cursor_reports_sized_and_ordered() {
        let cursor = MaterializedCursor::new(frozen(2), Characteristics::NONE);
        let traits = cursor.characteristics();
        assert!(traits.ordered && traits.sized && traits.subsized);
        assert_eq!(cursor.len(), 2);
    }

    #[test]
    fn replay_cursor_keeps_index_on_error() {
        let recorder = Arc::new(Recorder::new(
            || crate::source::FallibleIterSource::new(
                vec![Err(std::fmt::Error), Ok(5)].into_iter(),
            ),
            RecorderOptions::default(),
        ));
        let mut cursor = ReplayCursor::new(recorder);
        assert!(cursor.advance().is_err());
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.advance().expect("retry"), Outcome::Value(5));
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn replay_cursor_size_hint_counts_down() {
        let recorder = Arc::new(Recorder::new(|| IterSource::new(0..4), RecorderOptions::default()));
        let mut cursor = ReplayCursor::new(recorder);
        cursor.advance().expect("first");
        assert_eq!(cursor.size_hint(), SizeHint::Known(3));
        assert!(cursor.characteristics().sized);
    }
}
