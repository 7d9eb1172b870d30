//! Record-once, replay-many traversal of a one-shot source.
//!
//! # Overview
//!
//! A [`SequenceFactory`](replayer::SequenceFactory) owns one shared
//! [`Recorder`](recorder::Recorder). Each view it creates reads through one of
//! two cursors:
//! 1. **ReplayCursor** – used while the source may still have unseen
//!    elements; every step goes through the recorder's lock, which serves
//!    buffered elements and pulls (at most once per element) otherwise.
//! 2. **MaterializedCursor** – used once the source is drained; reads the
//!    frozen buffer without locking and splits for parallel traversal.
//!
//! Closing any view releases the source, once per factory.

pub mod cursor;
pub mod recorder;
pub mod recording;
pub mod replayer;
