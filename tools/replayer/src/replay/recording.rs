//! Serializable records describing what a recorder did.
//!
//! Events go to an optional [`EventSink`]; the JSONL logger in
//! `crate::logging` is the production sink.

use serde::Serialize;

// ── RecorderEvent ─────────────────────────────────────────────────────────────

/// A lifecycle step of a recorder. Raised under the recorder's lock and
/// delivered after it is released, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    SourceOpened { size_hint: Option<u64> },
    CapacityRejected { size: u64, limit: u64 },
    PullFailed { index: usize, message: String },
    Exhausted { len: usize },
    Released { buffered: usize, exhausted: bool },
}

impl RecorderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SourceOpened { .. } => "source_opened",
            Self::CapacityRejected { .. } => "capacity_rejected",
            Self::PullFailed { .. } => "pull_failed",
            Self::Exhausted { .. } => "exhausted",
            Self::Released { .. } => "released",
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            Self::CapacityRejected { .. } | Self::PullFailed { .. } => "warn",
            _ => "info",
        }
    }
}

/// Receives recorder events. Runs outside the recorder's state lock, so a
/// slow sink delays only the caller that raised the event and other callers
/// raising events of their own.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &RecorderEvent);
}

// ── RecorderStats ─────────────────────────────────────────────────────────────

/// Point-in-time view of a recorder's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Elements currently held in the buffer.
    pub buffered: usize,
    /// Pulls that produced an element. Never exceeds `buffered`.
    pub pulls: u64,
    pub opened: bool,
    pub exhausted: bool,
    pub released: bool,
}
