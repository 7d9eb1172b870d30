//! The pull side of a replay: a single-pass producer and a few adapters for
//! turning ordinary iterators and readers into one.

use crate::errors::SourceError;
use serde::Serialize;
use std::io::BufRead;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "len")]
pub enum SizeHint {
    Known(u64),
    Unknown,
}

impl SizeHint {
    pub fn known(self) -> Option<u64> {
        match self {
            Self::Known(len) => Some(len),
            Self::Unknown => None,
        }
    }
}

/// Ordering and sizing facts a source reports about the elements it yields.
/// Passed through untouched to every view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Characteristics {
    pub ordered: bool,
    pub distinct: bool,
    pub sorted: bool,
    pub sized: bool,
    pub subsized: bool,
}

impl Characteristics {
    pub const NONE: Self = Self {
        ordered: false,
        distinct: false,
        sorted: false,
        sized: false,
        subsized: false,
    };
    pub const ORDERED: Self = Self {
        ordered: true,
        ..Self::NONE
    };
    pub const SIZED: Self = Self {
        sized: true,
        ..Self::NONE
    };
    pub const SUBSIZED: Self = Self {
        subsized: true,
        ..Self::NONE
    };
}

impl BitOr for Characteristics {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            ordered: self.ordered || rhs.ordered,
            distinct: self.distinct || rhs.distinct,
            sorted: self.sorted || rhs.sorted,
            sized: self.sized || rhs.sized,
            subsized: self.subsized || rhs.subsized,
        }
    }
}

/// A one-shot, pull-based producer.
///
/// `pull_next` returning `Ok(None)` means the source is exhausted. The
/// recorder never calls `pull_next` again after that, and calls `release` at
/// most once.
pub trait SourceCursor: Send {
    type Item;

    fn pull_next(&mut self) -> Result<Option<Self::Item>, SourceError>;

    fn size_hint(&self) -> SizeHint {
        SizeHint::Unknown
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED
    }

    fn release(&mut self) {}
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Any iterator as a source. The size hint is known only when the
/// iterator's lower and upper bounds agree.
pub struct IterSource<I> {
    iter: I,
    on_release: Option<ReleaseHook>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            on_release: None,
        }
    }

    /// Runs `hook` when the recorder releases this source.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }
}

impl<I> SourceCursor for IterSource<I>
where
    I: Iterator + Send,
{
    type Item = I::Item;

    fn pull_next(&mut self) -> Result<Option<I::Item>, SourceError> {
        Ok(self.iter.next())
    }

    fn size_hint(&self) -> SizeHint {
        exact_size(self.iter.size_hint())
    }

    fn characteristics(&self) -> Characteristics {
        match self.size_hint() {
            SizeHint::Known(_) => Characteristics::ORDERED | Characteristics::SIZED,
            SizeHint::Unknown => Characteristics::ORDERED,
        }
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// An iterator of `Result`s as a source; an `Err` item surfaces as a failed
/// pull and the next pull continues with the following item.
pub struct FallibleIterSource<I> {
    iter: I,
}

impl<I> FallibleIterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I, T, E> SourceCursor for FallibleIterSource<I>
where
    I: Iterator<Item = Result<T, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = T;

    fn pull_next(&mut self) -> Result<Option<T>, SourceError> {
        self.iter
            .next()
            .transpose()
            .map_err(|e| Box::new(e) as SourceError)
    }

    fn size_hint(&self) -> SizeHint {
        exact_size(self.iter.size_hint())
    }
}

/// Lines of a reader, without their terminators. Releasing drops the reader,
/// which closes the underlying file or pipe.
pub struct LineSource<R> {
    reader: Option<R>,
    line: String,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            line: String::new(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R> SourceCursor for LineSource<R>
where
    R: BufRead + Send,
{
    type Item = String;

    fn pull_next(&mut self) -> Result<Option<String>, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        self.line.clear();
        if reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        let trimmed = self.line.trim_end_matches(['\n', '\r']);
        Ok(Some(trimmed.to_string()))
    }

    fn release(&mut self) {
        self.reader = None;
    }
}

fn exact_size((lower, upper): (usize, Option<usize>)) -> SizeHint {
    match upper {
        Some(upper) if upper == lower => SizeHint::Known(lower as u64),
        _ => SizeHint::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn iter_source_reports_exact_sizes_only() {
        let sized = IterSource::new(vec![1, 2, 3].into_iter());
        assert_eq!(sized.size_hint(), SizeHint::Known(3));
        assert!(sized.characteristics().sized);

        let filtered = IterSource::new((0..10).filter(|n| n % 2 == 0));
        assert_eq!(filtered.size_hint(), SizeHint::Unknown);
        assert!(!filtered.characteristics().sized);
        assert!(filtered.characteristics().ordered);
    }

    #[test]
    fn iter_source_release_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut source = IterSource::new(0..3).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        source.release();
        source.release();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fallible_source_surfaces_item_errors() {
        let items = vec![
            Ok(1),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "flaky")),
            Ok(3),
        ];
        let mut source = FallibleIterSource::new(items.into_iter());
        assert_eq!(source.pull_next().expect("first"), Some(1));
        let err = source.pull_next().expect_err("second fails");
        assert_eq!(err.to_string(), "flaky");
        assert_eq!(source.pull_next().expect("third"), Some(3));
        assert_eq!(source.pull_next().expect("end"), None);
    }

    #[test]
    fn line_source_strips_terminators_and_closes_on_release() {
        let mut source = LineSource::new(Cursor::new("a\r\nb\nc"));
        assert_eq!(source.pull_next().expect("a"), Some("a".to_string()));
        assert_eq!(source.pull_next().expect("b"), Some("b".to_string()));
        source.release();
        assert!(source.is_released());
        assert_eq!(source.pull_next().expect("released"), None);
    }

    #[test]
    fn characteristics_union_keeps_every_flag() {
        let merged = Characteristics::ORDERED | Characteristics::SIZED | Characteristics::SUBSIZED;
        assert!(merged.ordered && merged.sized && merged.subsized);
        assert!(!merged.sorted && !merged.distinct);
    }
}
