//! The shared recorder: one lazily-opened source, one append-only buffer,
//! one lock.
//!
//! Every mutation happens under `Recorder::state`. A fetch that misses the
//! buffer checks the length, pulls and appends inside a single critical
//! section, so concurrent cursors never pull the same element twice.

use crate::errors::ReplayError;
use crate::replay::recording::{EventSink, RecorderEvent, RecorderStats};
use crate::source::{Characteristics, SizeHint, SourceCursor};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Largest element count a `Vec` can be asked to hold, whatever the item.
pub const MAX_BUFFER_LEN: u64 = isize::MAX as u64;
pub const DEFAULT_PRESIZE_LIMIT: usize = 4096;

/// Largest element count a `Vec<T>` can hold: `isize::MAX` bytes of sized
/// items, or `isize::MAX` zero-sized ones.
pub const fn max_buffer_len_for<T>() -> u64 {
    match std::mem::size_of::<T>() {
        0 => MAX_BUFFER_LEN,
        size => MAX_BUFFER_LEN / size as u64,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Value(T),
    EndOfSequence,
}

impl<T> Outcome<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::EndOfSequence => None,
        }
    }
}

// ── RecorderOptions ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RecorderOptions {
    /// A source whose known size exceeds this is rejected before any pull.
    /// Clamped to [`max_buffer_len_for`] the item type.
    pub max_buffer_len: u64,
    /// Upper bound on the up-front allocation for a known-size source.
    pub presize_limit: usize,
    pub events: Option<Arc<dyn EventSink>>,
}

impl RecorderOptions {
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_max_buffer_len(mut self, max_buffer_len: u64) -> Self {
        self.max_buffer_len = max_buffer_len;
        self
    }
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            max_buffer_len: MAX_BUFFER_LEN,
            presize_limit: DEFAULT_PRESIZE_LIMIT,
            events: None,
        }
    }
}

impl fmt::Debug for RecorderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderOptions")
            .field("max_buffer_len", &self.max_buffer_len)
            .field("presize_limit", &self.presize_limit)
            .field("events", &self.events.is_some())
            .finish()
    }
}

// ── Buffer ────────────────────────────────────────────────────────────────────

enum Buffer<T> {
    Growing(Vec<T>),
    /// The source is exhausted; the contents can be shared without the lock.
    Frozen(Arc<[T]>),
}

impl<T> Buffer<T> {
    fn len(&self) -> usize {
        match self {
            Self::Growing(items) => items.len(),
            Self::Frozen(items) => items.len(),
        }
    }

    fn get(&self, index: usize) -> Option<&T> {
        match self {
            Self::Growing(items) => items.get(index),
            Self::Frozen(items) => items.get(index),
        }
    }

    fn push(&mut self, item: T) {
        // Frozen buffers are only produced by exhaustion, after which nothing is pulled.
        if let Self::Growing(items) = self {
            items.push(item);
        }
    }

    fn freeze(&mut self) {
        if let Self::Growing(items) = self {
            let items = std::mem::take(items);
            *self = Self::Frozen(Arc::from(items));
        }
    }
}

// ── Recorder ──────────────────────────────────────────────────────────────────

type SourceFactory<S> = Box<dyn FnOnce() -> S + Send>;

enum SourceSlot<S> {
    Pending(SourceFactory<S>),
    Open(S),
    Rejected { source: S, size: u64, limit: u64 },
    /// The provider panicked before producing a source.
    Failed,
    Released,
}

struct RecorderState<S: SourceCursor> {
    slot: SourceSlot<S>,
    buffer: Buffer<S::Item>,
    exhausted: bool,
    opened: bool,
    released: bool,
    size_hint: SizeHint,
    characteristics: Characteristics,
    pulls: u64,
    /// Events raised under the lock, handed to the sink once it is dropped.
    events: Vec<RecorderEvent>,
}

pub struct Recorder<S: SourceCursor> {
    state: Mutex<RecorderState<S>>,
    /// Held while the sink runs, so events keep their order across callers.
    sink_order: Mutex<()>,
    options: RecorderOptions,
}

impl<S: SourceCursor> Recorder<S> {
    /// `factory` runs at most once, on the first fetch that needs the source.
    pub fn new(factory: impl FnOnce() -> S + Send + 'static, options: RecorderOptions) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                slot: SourceSlot::Pending(Box::new(factory)),
                buffer: Buffer::Growing(Vec::new()),
                exhausted: false,
                opened: false,
                released: false,
                size_hint: SizeHint::Unknown,
                characteristics: Characteristics::NONE,
                pulls: 0,
                events: Vec::new(),
            }),
            sink_order: Mutex::new(()),
            options,
        }
    }

    /// Opens the source if nothing has yet. Idempotent: racing callers
    /// serialize on the lock and every loser observes the winner's result.
    pub fn ensure_source(&self) -> Result<(), ReplayError> {
        let mut guard = self.lock();
        let result = self.open_source(&mut guard);
        self.flush(guard);
        result
    }

    /// Returns the element at `index`, pulling from the source only for
    /// indices not yet buffered.
    ///
    /// A failed pull appends nothing and leaves the recorder unexhausted, so
    /// the same index can be fetched again.
    pub fn fetch(&self, index: usize) -> Result<Outcome<S::Item>, ReplayError>
    where
        S::Item: Clone,
    {
        let mut guard = self.lock();
        let result = self.fetch_locked(&mut guard, index);
        self.flush(guard);
        result
    }

    /// Runs the source's release hook if the source was ever opened, and
    /// returns whether it did. No pull is attempted afterwards; already
    /// buffered elements keep replaying.
    pub fn release(&self) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let released = match std::mem::replace(&mut state.slot, SourceSlot::Released) {
            SourceSlot::Open(mut source) | SourceSlot::Rejected { mut source, .. } => {
                source.release();
                true
            }
            SourceSlot::Pending(_) | SourceSlot::Failed | SourceSlot::Released => false,
        };
        if released {
            state.released = true;
            state.events.push(RecorderEvent::Released {
                buffered: state.buffer.len(),
                exhausted: state.exhausted,
            });
        }
        self.flush(guard);
        released
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    /// The source's size hint. Asking opens the source if nothing has yet;
    /// a source that was never built reports `Unknown`.
    pub fn size_hint(&self) -> SizeHint {
        self.metadata().0
    }

    /// The source's characteristics, opening it like [`Recorder::size_hint`].
    pub fn characteristics(&self) -> Characteristics {
        self.metadata().1
    }

    pub fn stats(&self) -> RecorderStats {
        let state = self.lock();
        RecorderStats {
            buffered: state.buffer.len(),
            pulls: state.pulls,
            opened: state.opened,
            exhausted: state.exhausted,
            released: state.released,
        }
    }

    /// The complete buffer, once the source is exhausted.
    pub(crate) fn frozen(&self) -> Option<Arc<[S::Item]>> {
        match &self.lock().buffer {
            Buffer::Frozen(items) => Some(Arc::clone(items)),
            Buffer::Growing(_) => None,
        }
    }

    fn fetch_locked(
        &self,
        state: &mut RecorderState<S>,
        index: usize,
    ) -> Result<Outcome<S::Item>, ReplayError>
    where
        S::Item: Clone,
    {
        if let Some(item) = state.buffer.get(index) {
            return Ok(Outcome::Value(item.clone()));
        }
        if state.exhausted {
            return Ok(Outcome::EndOfSequence);
        }

        self.open_source(state)?;
        let RecorderState {
            slot,
            buffer,
            exhausted,
            pulls,
            events,
            ..
        } = state;
        let SourceSlot::Open(source) = slot else {
            return Err(ReplayError::SourceReleased);
        };

        while buffer.len() <= index {
            match source.pull_next() {
                Ok(Some(item)) => {
                    buffer.push(item);
                    *pulls += 1;
                }
                Ok(None) => {
                    *exhausted = true;
                    buffer.freeze();
                    events.push(RecorderEvent::Exhausted { len: buffer.len() });
                    return Ok(Outcome::EndOfSequence);
                }
                Err(err) => {
                    events.push(RecorderEvent::PullFailed {
                        index: buffer.len(),
                        message: err.to_string(),
                    });
                    return Err(ReplayError::SourcePullFailed(err));
                }
            }
        }

        match buffer.get(index) {
            Some(item) => Ok(Outcome::Value(item.clone())),
            None => Ok(Outcome::EndOfSequence),
        }
    }

    fn metadata(&self) -> (SizeHint, Characteristics) {
        let mut guard = self.lock();
        // A rejected source keeps its admitted metadata; the error itself
        // resurfaces on the next fetch.
        let _ = self.open_source(&mut guard);
        let metadata = (guard.size_hint, guard.characteristics);
        self.flush(guard);
        metadata
    }

    fn open_source(&self, state: &mut RecorderState<S>) -> Result<(), ReplayError> {
        // `Failed` stays in place if the provider panics.
        let slot = match std::mem::replace(&mut state.slot, SourceSlot::Failed) {
            SourceSlot::Pending(factory) => {
                let source = factory();
                state.opened = true;
                self.admit(state, source)
            }
            other => other,
        };
        state.slot = slot;

        match &state.slot {
            SourceSlot::Open(_) => Ok(()),
            SourceSlot::Rejected { size, limit, .. } => Err(ReplayError::CapacityExceeded {
                size: *size,
                limit: *limit,
            }),
            SourceSlot::Failed => Err(ReplayError::ProviderFailed),
            SourceSlot::Pending(_) | SourceSlot::Released => Err(ReplayError::SourceReleased),
        }
    }

    fn admit(&self, state: &mut RecorderState<S>, source: S) -> SourceSlot<S> {
        state.size_hint = source.size_hint();
        state.characteristics = source.characteristics();
        let limit = self
            .options
            .max_buffer_len
            .min(max_buffer_len_for::<S::Item>());

        match state.size_hint {
            SizeHint::Known(size) if size > limit => {
                state
                    .events
                    .push(RecorderEvent::CapacityRejected { size, limit });
                return SourceSlot::Rejected {
                    source,
                    size,
                    limit,
                };
            }
            SizeHint::Known(size) => {
                let presize = size.min(self.options.presize_limit as u64) as usize;
                state.buffer = Buffer::Growing(Vec::with_capacity(presize));
            }
            SizeHint::Unknown => {}
        }

        state.events.push(RecorderEvent::SourceOpened {
            size_hint: state.size_hint.known(),
        });
        SourceSlot::Open(source)
    }

    /// Hands queued events to the sink after the state lock is dropped. The
    /// order lock is taken first, so events still arrive in the order they
    /// were raised.
    fn flush(&self, mut state: MutexGuard<'_, RecorderState<S>>) {
        if state.events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut state.events);
        let Some(sink) = &self.options.events else {
            return;
        };
        let _order = self
            .sink_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);
        for event in &events {
            sink.record(event);
        }
    }

    // A source that panics mid-pull poisons the lock before anything is
    // appended, so the state behind it is still consistent.
    fn lock(&self) -> MutexGuard<'_, RecorderState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
