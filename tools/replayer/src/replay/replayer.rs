//! Entry points: wrap a source once, then traverse it as many times as
//! needed.

use crate::errors::ReplayError;
use crate::replay::cursor::{MaterializedCursor, ReplayCursor};
use crate::replay::recorder::{Outcome, Recorder, RecorderOptions};
use crate::replay::recording::RecorderStats;
use crate::source::{Characteristics, IterSource, SizeHint, SourceCursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Replays the source built by `provider`. The provider runs on the first
/// traversal step or metadata query that needs it, never earlier.
pub fn replay<S, F>(provider: F) -> SequenceFactory<S>
where
    S: SourceCursor,
    F: FnOnce() -> S + Send + 'static,
{
    replay_with(provider, RecorderOptions::default())
}

pub fn replay_with<S, F>(provider: F, options: RecorderOptions) -> SequenceFactory<S>
where
    S: SourceCursor,
    F: FnOnce() -> S + Send + 'static,
{
    SequenceFactory {
        recorder: Arc::new(Recorder::new(provider, options)),
        closed: Arc::new(AtomicBool::new(false)),
    }
}

/// Replays an already-built iterator.
pub fn replay_iter<I>(iter: I) -> SequenceFactory<IterSource<I::IntoIter>>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
{
    let iter = iter.into_iter();
    replay(move || IterSource::new(iter))
}

// ── SequenceFactory ───────────────────────────────────────────────────────────

/// Produces independent views over one recorded source. Clones share the
/// recorder and the close latch.
pub struct SequenceFactory<S: SourceCursor> {
    recorder: Arc<Recorder<S>>,
    closed: Arc<AtomicBool>,
}

impl<S: SourceCursor> Clone for SequenceFactory<S> {
    fn clone(&self) -> Self {
        Self {
            recorder: Arc::clone(&self.recorder),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<S: SourceCursor> SequenceFactory<S> {
    /// A fresh view starting at the first element. Once the source has been
    /// drained the view reads the frozen buffer directly and can be split.
    pub fn create(&self) -> SequenceView<S> {
        let cursor = match self.recorder.frozen() {
            Some(items) => {
                ViewCursor::Materialized(MaterializedCursor::new(items, self.recorder.characteristics()))
            }
            None => ViewCursor::Replay(ReplayCursor::new(Arc::clone(&self.recorder))),
        };
        SequenceView {
            cursor,
            close: CloseHook {
                recorder: Arc::clone(&self.recorder),
                closed: Arc::clone(&self.closed),
            },
        }
    }

    /// Same latch as [`SequenceView::close`].
    pub fn close(&self) -> bool {
        close_once(&self.closed, &self.recorder)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    pub fn recorder(&self) -> &Arc<Recorder<S>> {
        &self.recorder
    }
}

// ── SequenceView ──────────────────────────────────────────────────────────────

enum ViewCursor<S: SourceCursor> {
    Replay(ReplayCursor<S>),
    Materialized(MaterializedCursor<S::Item>),
}

struct CloseHook<S: SourceCursor> {
    recorder: Arc<Recorder<S>>,
    closed: Arc<AtomicBool>,
}

impl<S: SourceCursor> Clone for CloseHook<S> {
    fn clone(&self) -> Self {
        Self {
            recorder: Arc::clone(&self.recorder),
            closed: Arc::clone(&self.closed),
        }
    }
}

/// One traversal. Iterating yields `Result`s: a failed source pull is
/// reported to exactly the view that triggered it.
pub struct SequenceView<S: SourceCursor> {
    cursor: ViewCursor<S>,
    close: CloseHook<S>,
}

impl<S: SourceCursor> SequenceView<S>
where
    S::Item: Clone,
{
    pub fn advance(&mut self) -> Result<Outcome<S::Item>, ReplayError> {
        match &mut self.cursor {
            ViewCursor::Replay(cursor) => cursor.advance(),
            ViewCursor::Materialized(cursor) => Ok(cursor.advance()),
        }
    }
}

impl<S: SourceCursor> SequenceView<S> {
    pub fn is_materialized(&self) -> bool {
        matches!(self.cursor, ViewCursor::Materialized(_))
    }

    /// Splits off the front half of the remaining elements into a new view.
    /// Only views over a drained source can split.
    pub fn try_split(&mut self) -> Option<Self> {
        let ViewCursor::Materialized(cursor) = &mut self.cursor else {
            return None;
        };
        let front = cursor.split()?;
        Some(Self {
            cursor: ViewCursor::Materialized(front),
            close: self.close.clone(),
        })
    }

    pub fn remaining_hint(&self) -> SizeHint {
        match &self.cursor {
            ViewCursor::Replay(cursor) => cursor.size_hint(),
            ViewCursor::Materialized(cursor) => SizeHint::Known(cursor.remaining() as u64),
        }
    }

    pub fn characteristics(&self) -> Characteristics {
        match &self.cursor {
            ViewCursor::Replay(cursor) => cursor.characteristics(),
            ViewCursor::Materialized(cursor) => cursor.characteristics(),
        }
    }

    /// Releases the source if no view from the same factory has been closed
    /// yet. Returns whether this call ran the source's release.
    pub fn close(&self) -> bool {
        close_once(&self.close.closed, &self.close.recorder)
    }
}

impl<S: SourceCursor> Iterator for SequenceView<S>
where
    S::Item: Clone,
{
    type Item = Result<S::Item, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Outcome::Value(item)) => Some(Ok(item)),
            Ok(Outcome::EndOfSequence) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.cursor {
            ViewCursor::Materialized(cursor) => cursor.size_hint(),
            ViewCursor::Replay(_) => (0, None),
        }
    }
}

fn close_once<S: SourceCursor>(closed: &AtomicBool, recorder: &Recorder<S>) -> bool {
    closed
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
        && recorder.release()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_view_replays_and_later_view_is_materialized() {
        let factory = replay_iter(vec![1, 2, 3]);
        let mut first = factory.create();
        assert!(!first.is_materialized());
        assert!(first.try_split().is_none());
        let drained: Vec<i32> = first.by_ref().collect::<Result<_, _>>().expect("drain");
        assert_eq!(drained, vec![1, 2, 3]);

        let second = factory.create();
        assert!(second.is_materialized());
        assert_eq!(second.remaining_hint(), SizeHint::Known(3));
        assert_eq!(second.size_hint(), (3, Some(3)));
    }

    #[test]
    fn creating_views_does_not_touch_the_source() {
        let factory = replay(|| -> IterSource<std::ops::Range<u8>> {
            panic!("source must stay untouched")
        });
        let _a = factory.create();
        let _b = factory.create();
        assert!(!factory.stats().opened);
    }

    #[test]
    fn split_views_share_the_close_latch() {
        let factory = replay_iter(0..8u32);
        factory.create().for_each(drop);
        let mut back = factory.create();
        let front = back.try_split().expect("split");
        assert!(front.close());
        assert!(!back.close());
        assert!(factory.is_closed());
    }

    #[test]
    fn fresh_view_reports_source_metadata_before_traversal() {
        let factory = replay_iter(vec![1, 2, 3]);
        let view = factory.create();
        let traits = view.characteristics();
        assert!(traits.ordered);
        assert!(traits.sized);
        assert_eq!(view.remaining_hint(), SizeHint::Known(3));
        assert_eq!(factory.stats().pulls, 0);
    }
}
