//! The backing-store seam.
//!
//! The store is an external collaborator: it only has to expose "rows
//! with `sequence > X`, ascending" plus an optional change notification.
//! Both are traits here so the binary injects a SQLite provider and tests
//! inject fakes.

use async_trait::async_trait;

use spinfeed_core::{ChannelId, RawOutcome};

use crate::errors::IngestError;

/// Ordered reads from the backing store.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Channels currently being fed.
    async fn channels(&self) -> Result<Vec<ChannelId>, IngestError>;

    /// Rows with `sequence > after`, ascending, at most `limit`.
    async fn fetch_newer(
        &self,
        channel: &ChannelId,
        after: i64,
        limit: u32,
    ) -> Result<Vec<RawOutcome>, IngestError>;

    /// Highest stored sequence for a channel (0 if empty). Used to prime
    /// cursors to the feed tail so a restart does not replay history.
    async fn latest_sequence(&self, channel: &ChannelId) -> Result<i64, IngestError>;
}

/// Optional push-notification: resolves when the store may have new rows.
///
/// Spurious wake-ups are fine; the ingester always re-queries through the
/// cursor, so waking without data is just an empty fetch.
#[async_trait]
pub trait ChangeWaker: Send + Sync {
    /// Wait for the next change signal.
    async fn wait(&self);
}
