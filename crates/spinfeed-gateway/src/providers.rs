//! SQLite-backed implementations of the collaborator traits.
//!
//! The library crates only know the `ChangeSource`, `ChangeWaker`,
//! `SubscriptionStore`, and `HistorySource` seams; this module plugs the
//! pooled SQLite store into all four.

use std::fmt::Display;

use async_trait::async_trait;

use spinfeed_auth::{SubscriptionStore, SubscriptionStoreError};
use spinfeed_core::{ChannelId, RawOutcome, SubjectId, SubscriptionRecord};
use spinfeed_ingest::{ChangeSource, ChangeWaker, IngestError};
use spinfeed_server::{HistorySource, ServerError};
use spinfeed_store::{ChangeNotifier, ChannelRepo, ConnectionPool, OutcomeRepo, SubscriptionRepo};

fn upstream(e: impl Display) -> IngestError {
    IngestError::Upstream(e.to_string())
}

/// Ordered outcome reads over the pooled store.
pub struct SqliteChangeSource {
    pool: ConnectionPool,
}

impl SqliteChangeSource {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeSource for SqliteChangeSource {
    async fn channels(&self) -> Result<Vec<ChannelId>, IngestError> {
        let conn = self.pool.get().map_err(upstream)?;
        Ok(ChannelRepo::list_active(&conn)
            .map_err(upstream)?
            .into_iter()
            .map(|row| row.id)
            .collect())
    }

    async fn fetch_newer(
        &self,
        channel: &ChannelId,
        after: i64,
        limit: u32,
    ) -> Result<Vec<RawOutcome>, IngestError> {
        let conn = self.pool.get().map_err(upstream)?;
        OutcomeRepo::fetch_newer(&conn, channel, after, limit).map_err(upstream)
    }

    async fn latest_sequence(&self, channel: &ChannelId) -> Result<i64, IngestError> {
        let conn = self.pool.get().map_err(upstream)?;
        OutcomeRepo::latest_sequence(&conn, channel).map_err(upstream)
    }
}

/// Adapts the store's notify handle to the ingester's waker seam.
pub struct NotifierWaker(pub ChangeNotifier);

#[async_trait]
impl ChangeWaker for NotifierWaker {
    async fn wait(&self) {
        self.0.notified().await;
    }
}

/// Subscription lookups over the pooled store.
pub struct SqliteSubscriptionStore {
    pool: ConnectionPool,
}

impl SqliteSubscriptionStore {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn get(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<SubscriptionRecord>, SubscriptionStoreError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| SubscriptionStoreError(e.to_string()))?;
        SubscriptionRepo::get(&conn, subject).map_err(|e| SubscriptionStoreError(e.to_string()))
    }
}

/// History and health reads over the pooled store.
pub struct SqliteHistorySource {
    pool: ConnectionPool,
}

impl SqliteHistorySource {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistorySource for SqliteHistorySource {
    async fn history(
        &self,
        channel: &ChannelId,
        limit: Option<u32>,
    ) -> Result<Vec<RawOutcome>, ServerError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| ServerError::History(e.to_string()))?;
        OutcomeRepo::history(&conn, channel, limit).map_err(|e| ServerError::History(e.to_string()))
    }

    async fn store_connected(&self) -> bool {
        self.pool.get().is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
