//! Per-channel high-water marks.
//!
//! Memory is bounded by the channel count, never by the event count: the
//! cursor remembers one sequence key per channel, not a set of seen ids.
//! The cursor is owned exclusively by the ingester; nothing else mutates
//! it.

use std::collections::HashMap;

use spinfeed_core::ChannelId;

/// Last successfully handed-off position per channel.
#[derive(Clone, Debug, Default)]
pub struct IngestCursor {
    marks: HashMap<ChannelId, i64>,
}

impl IngestCursor {
    /// Empty cursor; every channel starts at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mark for a channel (0 if never seen).
    #[must_use]
    pub fn get(&self, channel: &ChannelId) -> i64 {
        self.marks.get(channel).copied().unwrap_or(0)
    }

    /// Set a channel's mark unconditionally (used when priming to the
    /// feed tail at startup).
    pub fn set(&mut self, channel: ChannelId, sequence: i64) {
        let _ = self.marks.insert(channel, sequence);
    }

    /// Advance a channel's mark. Never moves backwards.
    pub fn advance(&mut self, channel: &ChannelId, sequence: i64) {
        let entry = self.marks.entry(channel.clone()).or_insert(0);
        if sequence > *entry {
            *entry = sequence;
        }
    }

    /// Number of channels tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// True if no channel has been tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
