//! # spinfeed-ingest
//!
//! The change ingester: reads newly appended outcomes from a
//! [`ChangeSource`], parses them, and hands them to an [`EventSink`]
//! in per-channel sequence order.
//!
//! Dedup is cursor-based: one high-water mark per channel, advanced only
//! after a successful handoff (at-least-once delivery; consumers dedup on
//! the sequence key). One malformed row is skipped and never wedges the
//! feed.

#![deny(unsafe_code)]

pub mod cursor;
pub mod errors;
pub mod ingester;
pub mod source;

pub use cursor::IngestCursor;
pub use errors::IngestError;
pub use ingester::{EventSink, Ingester, IngesterConfig, SinkError};
pub use source::{ChangeSource, ChangeWaker};
