//! The ingest loop.
//!
//! Each cycle fetches at most `batch_limit` rows per channel beyond the
//! channel's cursor, parses them, and delivers them to the sink in
//! sequence order. The cursor advances past delivered rows and past
//! malformed rows, but never past a row the sink refused, so handoff is
//! at-least-once and a sink hiccup is retried from the right position.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use spinfeed_core::OutcomeEvent;

use crate::cursor::IngestCursor;
use crate::errors::IngestError;
use crate::source::{ChangeSource, ChangeWaker};

/// Sink-side refusal of a handoff.
#[derive(Debug, Error)]
#[error("sink rejected event: {0}")]
pub struct SinkError(pub String);

/// Consumer of parsed outcomes, called in per-channel sequence order.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Accept one outcome. Returning an error leaves the cursor before
    /// this event so it is re-offered next cycle.
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), SinkError>;
}

/// Loop timing and batching knobs.
#[derive(Clone, Debug)]
pub struct IngesterConfig {
    /// Sleep between cycles (and the re-check floor in notified mode).
    pub poll_interval: Duration,
    /// Delay before retrying after an upstream or handoff error.
    pub retry_delay: Duration,
    /// Maximum rows per channel per cycle.
    pub batch_limit: u32,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            retry_delay: Duration::from_millis(2_000),
            batch_limit: 256,
        }
    }
}

/// The change ingester. Owns the cursor exclusively.
pub struct Ingester {
    source: Arc<dyn ChangeSource>,
    sink: Arc<dyn EventSink>,
    config: IngesterConfig,
    cursor: IngestCursor,
}

impl Ingester {
    /// Build an ingester with a fresh (all-zero) cursor.
    pub fn new(
        source: Arc<dyn ChangeSource>,
        sink: Arc<dyn EventSink>,
        config: IngesterConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            cursor: IngestCursor::new(),
        }
    }

    /// Current cursor position for inspection.
    #[must_use]
    pub fn cursor(&self) -> &IngestCursor {
        &self.cursor
    }

    /// Prime every channel's cursor to the current feed tail so only
    /// outcomes appended after startup are delivered.
    pub async fn prime_cursors(&mut self) -> Result<(), IngestError> {
        let channels = self.source.channels().await?;
        for channel in channels {
            let tail = self.source.latest_sequence(&channel).await?;
            self.cursor.set(channel.clone(), tail);
            debug!(channel = %channel, tail, "cursor primed");
        }
        info!(channels = self.cursor.len(), "ingest cursors primed");
        Ok(())
    }

    /// One full cycle over all channels. Returns how many outcomes were
    /// handed to the sink.
    pub async fn poll_once(&mut self) -> Result<usize, IngestError> {
        let channels = self.source.channels().await?;
        let mut delivered = 0;

        for channel in channels {
            let after = self.cursor.get(&channel);
            let rows = self
                .source
                .fetch_newer(&channel, after, self.config.batch_limit)
                .await?;
            if rows.is_empty() {
                continue;
            }

            let mut high_water = after;
            let mut handoff_failure = None;

            for row in rows {
                match row.parse() {
                    Ok(event) => match self.sink.deliver(&event).await {
                        Ok(()) => {
                            high_water = high_water.max(event.sequence_key);
                            delivered += 1;
                        }
                        Err(e) => {
                            handoff_failure = Some(IngestError::Handoff(e.to_string()));
                            break;
                        }
                    },
                    Err(e) => {
                        // One bad record must not wedge the feed.
                        warn!(
                            channel = %channel,
                            sequence = row.sequence,
                            error = %IngestError::Malformed(e.to_string()),
                            "skipping malformed record"
                        );
                        high_water = high_water.max(row.sequence);
                    }
                }
            }

            self.cursor.advance(&channel, high_water);
            if let Some(err) = handoff_failure {
                return Err(err);
            }
        }

        Ok(delivered)
    }

    /// Run until the token is cancelled. Errors are retried with a fixed
    /// delay; the loop never panics and never exits on its own.
    pub async fn run(mut self, waker: Option<Arc<dyn ChangeWaker>>, cancel: CancellationToken) {
        info!(
            batch_limit = self.config.batch_limit,
            notified = waker.is_some(),
            "ingester started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let wait = match self.poll_once().await {
                Ok(delivered) => {
                    if delivered > 0 {
                        debug!(delivered, "ingest cycle complete");
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    warn!(error = %e, "ingest cycle failed, retrying");
                    self.config.retry_delay
                }
            };

            match &waker {
                Some(waker) => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = waker.wait() => {}
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                None => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        info!("ingester stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spinfeed_core::{ChannelId, RawOutcome};
    use std::collections::HashMap;

    fn raw(channel: &str, seq: i64, value: i64) -> RawOutcome {
        RawOutcome {
            channel_id: channel.to_string(),
            channel_label: "Table".to_string(),
            value,
            sequence: seq,
            emitted_at: "2025-06-01T12:00:00Z".to_string(),
        }
    }

    struct FakeSource {
        rows: Mutex<HashMap<String, Vec<RawOutcome>>>,
        fail: Mutex<bool>,
    }

    impl FakeSource {
        fn with(channel: &str, rows: Vec<RawOutcome>) -> Self {
            let mut map = HashMap::new();
            let _ = map.insert(channel.to_string(), rows);
            Self {
                rows: Mutex::new(map),
                fail: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl ChangeSource for FakeSource {
        async fn channels(&self) -> Result<Vec<ChannelId>, IngestError> {
            if *self.fail.lock() {
                return Err(IngestError::Upstream("store offline".into()));
            }
            let mut ids: Vec<ChannelId> =
                self.rows.lock().keys().map(|k| ChannelId::from(k.as_str())).collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Ok(ids)
        }

        async fn fetch_newer(
            &self,
            channel: &ChannelId,
            after: i64,
            limit: u32,
        ) -> Result<Vec<RawOutcome>, IngestError> {
            if *self.fail.lock() {
                return Err(IngestError::Upstream("store offline".into()));
            }
            let rows = self.rows.lock();
            let mut out: Vec<RawOutcome> = rows
                .get(channel.as_str())
                .map(|v| v.iter().filter(|r| r.sequence > after).cloned().collect())
                .unwrap_or_default();
            out.sort_by_key(|r| r.sequence);
            out.truncate(limit as usize);
            Ok(out)
        }

        async fn latest_sequence(&self, channel: &ChannelId) -> Result<i64, IngestError> {
            Ok(self
                .rows
                .lock()
                .get(channel.as_str())
                .and_then(|v| v.iter().map(|r| r.sequence).max())
                .unwrap_or(0))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(String, i64)>>,
        fail_at: Mutex<Option<i64>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, event: &OutcomeEvent) -> Result<(), SinkError> {
            if *self.fail_at.lock() == Some(event.sequence_key) {
                return Err(SinkError("channel full".into()));
            }
            self.delivered
                .lock()
                .push((event.channel_id.to_string(), event.sequence_key));
            Ok(())
        }
    }

    fn ingester(source: FakeSource, sink: Arc<RecordingSink>) -> Ingester {
        Ingester::new(Arc::new(source), sink, IngesterConfig::default())
    }

    #[tokio::test]
    async fn delivers_rows_in_sequence_order_and_advances_cursor() {
        // Cursor 100; upstream has 101, 102, 103, 105 (104 missing).
        let rows = vec![
            raw("R1", 101, 7),
            raw("R1", 102, 0),
            raw("R1", 103, 32),
            raw("R1", 105, 14),
        ];
        let sink = Arc::new(RecordingSink::default());
        let mut ing = ingester(FakeSource::with("R1", rows), sink.clone());
        ing.cursor.set(ChannelId::from("R1"), 100);

        let delivered = ing.poll_once().await.unwrap();
        assert_eq!(delivered, 4);
        let seqs: Vec<i64> = sink.delivered.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(seqs, vec![101, 102, 103, 105]);
        assert_eq!(ing.cursor().get(&ChannelId::from("R1")), 105);
    }

    #[tokio::test]
    async fn second_cycle_redelivers_nothing() {
        let rows = vec![raw("R1", 1, 5), raw("R1", 2, 9)];
        let sink = Arc::new(RecordingSink::default());
        let mut ing = ingester(FakeSource::with("R1", rows), sink.clone());

        assert_eq!(ing.poll_once().await.unwrap(), 2);
        assert_eq!(ing.poll_once().await.unwrap(), 0);
        assert_eq!(sink.delivered.lock().len(), 2);
    }

    #[tokio::test]
    async fn malformed_row_is_skipped_and_cursor_advances_past_it() {
        let rows = vec![raw("R1", 1, 5), raw("R1", 2, 99), raw("R1", 3, 7)];
        let sink = Arc::new(RecordingSink::default());
        let mut ing = ingester(FakeSource::with("R1", rows), sink.clone());

        let delivered = ing.poll_once().await.unwrap();
        assert_eq!(delivered, 2);
        let seqs: Vec<i64> = sink.delivered.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(seqs, vec![1, 3]);
        assert_eq!(ing.cursor().get(&ChannelId::from("R1")), 3);
    }

    #[tokio::test]
    async fn handoff_failure_keeps_cursor_before_the_failed_row() {
        let rows = vec![raw("R1", 1, 5), raw("R1", 2, 9), raw("R1", 3, 7)];
        let sink = Arc::new(RecordingSink::default());
        *sink.fail_at.lock() = Some(2);
        let mut ing = ingester(FakeSource::with("R1", rows), sink.clone());

        let err = ing.poll_once().await.unwrap_err();
        assert!(matches!(err, IngestError::Handoff(_)));
        assert_eq!(ing.cursor().get(&ChannelId::from("R1")), 1);

        // Sink recovers; the undelivered rows are re-offered.
        *sink.fail_at.lock() = None;
        assert_eq!(ing.poll_once().await.unwrap(), 2);
        let seqs: Vec<i64> = sink.delivered.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn batch_limit_caps_one_cycle() {
        let rows = (1..=10).map(|s| raw("R1", s, 5)).collect();
        let sink = Arc::new(RecordingSink::default());
        let mut ing = Ingester::new(
            Arc::new(FakeSource::with("R1", rows)),
            sink.clone(),
            IngesterConfig {
                batch_limit: 4,
                ..IngesterConfig::default()
            },
        );

        assert_eq!(ing.poll_once().await.unwrap(), 4);
        assert_eq!(ing.cursor().get(&ChannelId::from("R1")), 4);
        assert_eq!(ing.poll_once().await.unwrap(), 4);
        assert_eq!(ing.poll_once().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upstream_error_is_returned_for_retry() {
        let source = FakeSource::with("R1", vec![raw("R1", 1, 5)]);
        *source.fail.lock() = true;
        let sink = Arc::new(RecordingSink::default());
        let mut ing = ingester(source, sink);

        let err = ing.poll_once().await.unwrap_err();
        assert!(matches!(err, IngestError::Upstream(_)));
    }

    #[tokio::test]
    async fn prime_cursors_skips_existing_history() {
        let rows = vec![raw("R1", 41, 5), raw("R1", 42, 9)];
        let sink = Arc::new(RecordingSink::default());
        let mut ing = ingester(FakeSource::with("R1", rows), sink.clone());

        ing.prime_cursors().await.unwrap();
        assert_eq!(ing.cursor().get(&ChannelId::from("R1")), 42);
        assert_eq!(ing.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let sink = Arc::new(RecordingSink::default());
        let ing = Ingester::new(
            Arc::new(FakeSource::with("R1", vec![])),
            sink,
            IngesterConfig {
                poll_interval: Duration::from_millis(5),
                ..IngesterConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ing.run(None, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(25)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run should exit after cancel")
            .unwrap();
    }
}
