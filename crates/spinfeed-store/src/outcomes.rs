//! Channel and outcome repositories over the ordered feed.
//!
//! Repositories are stateless; every method takes `&Connection`. Reads
//! return [`RawOutcome`] rows so one malformed record can be skipped by
//! the caller instead of failing a whole batch.

use rusqlite::{Connection, OptionalExtension, params};

use spinfeed_core::{ChannelId, OutcomeEvent, RawOutcome};

use crate::errors::Result;
use crate::notify::ChangeNotifier;

/// One channel as stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRow {
    /// Channel key.
    pub id: ChannelId,
    /// Display name.
    pub label: String,
    /// Inactive channels are not ingested.
    pub active: bool,
}

/// Channel repository.
pub struct ChannelRepo;

impl ChannelRepo {
    /// Insert or update a channel.
    pub fn upsert(conn: &Connection, id: &ChannelId, label: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO channels (id, label, active, created_at)
             VALUES (?1, ?2, 1, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET label = excluded.label",
            params![id.as_str(), label],
        )?;
        Ok(())
    }

    /// Mark a channel active or inactive.
    pub fn set_active(conn: &Connection, id: &ChannelId, active: bool) -> Result<()> {
        let _ = conn.execute(
            "UPDATE channels SET active = ?2 WHERE id = ?1",
            params![id.as_str(), i32::from(active)],
        )?;
        Ok(())
    }

    /// All active channels, ordered by id.
    pub fn list_active(conn: &Connection) -> Result<Vec<ChannelRow>> {
        let mut stmt =
            conn.prepare("SELECT id, label, active FROM channels WHERE active = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChannelRow {
                    id: ChannelId::from_string(row.get::<_, String>(0)?),
                    label: row.get(1)?,
                    active: row.get::<_, i32>(2)? == 1,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Outcome repository.
pub struct OutcomeRepo;

impl OutcomeRepo {
    /// Append one outcome to a channel's feed and ping the notifier so a
    /// push-notified ingester re-queries without waiting out its poll
    /// interval.
    pub fn insert(
        conn: &Connection,
        event: &OutcomeEvent,
        notifier: &ChangeNotifier,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO outcomes (channel_id, sequence, value, emitted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.channel_id.as_str(),
                event.sequence_key,
                i64::from(event.value),
                event.emitted_at.to_rfc3339(),
            ],
        )?;
        notifier.notify();
        Ok(())
    }

    /// Rows with `sequence > after`, ascending, capped at `limit`.
    pub fn fetch_newer(
        conn: &Connection,
        channel: &ChannelId,
        after: i64,
        limit: u32,
    ) -> Result<Vec<RawOutcome>> {
        let mut stmt = conn.prepare(
            "SELECT o.channel_id, c.label, o.value, o.sequence, o.emitted_at
             FROM outcomes o JOIN channels c ON c.id = o.channel_id
             WHERE o.channel_id = ?1 AND o.sequence > ?2
             ORDER BY o.sequence ASC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![channel.as_str(), after, limit], Self::map_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent `depth` rows for a channel, newest first.
    /// `None` means no cap.
    pub fn history(
        conn: &Connection,
        channel: &ChannelId,
        depth: Option<u32>,
    ) -> Result<Vec<RawOutcome>> {
        let mut sql = String::from(
            "SELECT o.channel_id, c.label, o.value, o.sequence, o.emitted_at
             FROM outcomes o JOIN channels c ON c.id = o.channel_id
             WHERE o.channel_id = ?1
             ORDER BY o.sequence DESC",
        );
        if let Some(depth) = depth {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {depth}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![channel.as_str()], Self::map_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest sequence stored for a channel, or 0 if the feed is empty.
    pub fn latest_sequence(conn: &Connection, channel: &ChannelId) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence) FROM outcomes WHERE channel_id = ?1",
                params![channel.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0))
    }

    fn map_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawOutcome> {
        Ok(RawOutcome {
            channel_id: row.get(0)?,
            channel_label: row.get(1)?,
            value: row.get(2)?,
            sequence: row.get(3)?,
            emitted_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use chrono::Utc;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        ChannelRepo::upsert(&conn, &ChannelId::from("r1"), "Roleta Brasileira").unwrap();
        conn
    }

    fn outcome(seq: i64, value: u8) -> OutcomeEvent {
        OutcomeEvent::new(ChannelId::from("r1"), "Roleta Brasileira", value, seq, Utc::now())
            .unwrap()
    }

    fn insert_one(conn: &Connection, event: &OutcomeEvent) -> crate::errors::Result<()> {
        OutcomeRepo::insert(conn, event, &ChangeNotifier::new())
    }

    #[test]
    fn insert_and_fetch_newer_ascending() {
        let conn = setup();
        for (seq, value) in [(101, 7), (102, 0), (103, 32), (105, 14)] {
            insert_one(&conn, &outcome(seq, value)).unwrap();
        }

        let rows =
            OutcomeRepo::fetch_newer(&conn, &ChannelId::from("r1"), 100, 256).unwrap();
        let seqs: Vec<i64> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![101, 102, 103, 105]);
        assert_eq!(rows[0].channel_label, "Roleta Brasileira");
    }

    #[test]
    fn fetch_newer_excludes_cursor_position() {
        let conn = setup();
        insert_one(&conn, &outcome(100, 1)).unwrap();
        insert_one(&conn, &outcome(101, 2)).unwrap();

        let rows =
            OutcomeRepo::fetch_newer(&conn, &ChannelId::from("r1"), 100, 256).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, 101);
    }

    #[test]
    fn fetch_newer_respects_limit() {
        let conn = setup();
        for seq in 1..=10 {
            insert_one(&conn, &outcome(seq, 5)).unwrap();
        }

        let rows = OutcomeRepo::fetch_newer(&conn, &ChannelId::from("r1"), 0, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].sequence, 3);
    }

    #[test]
    fn fetch_newer_empty_when_caught_up() {
        let conn = setup();
        insert_one(&conn, &outcome(5, 9)).unwrap();

        let rows = OutcomeRepo::fetch_newer(&conn, &ChannelId::from("r1"), 5, 256).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn history_is_newest_first_and_capped() {
        let conn = setup();
        for seq in 1..=10 {
            insert_one(&conn, &outcome(seq, 3)).unwrap();
        }

        let rows = OutcomeRepo::history(&conn, &ChannelId::from("r1"), Some(5)).unwrap();
        let seqs: Vec<i64> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![10, 9, 8, 7, 6]);
    }

    #[test]
    fn history_uncapped_returns_all() {
        let conn = setup();
        for seq in 1..=4 {
            insert_one(&conn, &outcome(seq, 3)).unwrap();
        }

        let rows = OutcomeRepo::history(&conn, &ChannelId::from("r1"), None).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn latest_sequence_defaults_to_zero() {
        let conn = setup();
        assert_eq!(
            OutcomeRepo::latest_sequence(&conn, &ChannelId::from("r1")).unwrap(),
            0
        );
    }

    #[test]
    fn latest_sequence_tracks_inserts() {
        let conn = setup();
        insert_one(&conn, &outcome(42, 0)).unwrap();
        assert_eq!(
            OutcomeRepo::latest_sequence(&conn, &ChannelId::from("r1")).unwrap(),
            42
        );
    }

    #[test]
    fn list_active_skips_inactive_channels() {
        let conn = setup();
        ChannelRepo::upsert(&conn, &ChannelId::from("r2"), "Lightning").unwrap();
        ChannelRepo::set_active(&conn, &ChannelId::from("r2"), false).unwrap();

        let channels = ChannelRepo::list_active(&conn).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id.as_str(), "r1");
    }

    #[test]
    fn upsert_updates_label() {
        let conn = setup();
        ChannelRepo::upsert(&conn, &ChannelId::from("r1"), "Renamed").unwrap();

        let channels = ChannelRepo::list_active(&conn).unwrap();
        assert_eq!(channels[0].label, "Renamed");
    }

    #[tokio::test]
    async fn insert_pings_the_notifier() {
        let conn = setup();
        let notifier = ChangeNotifier::new();
        OutcomeRepo::insert(&conn, &outcome(1, 5), &notifier).unwrap();

        tokio::time::timeout(std::time::Duration::from_millis(100), notifier.notified())
            .await
            .expect("an insert should leave a wake-up for the ingester");
    }

    #[test]
    fn fetched_rows_parse_into_events() {
        let conn = setup();
        insert_one(&conn, &outcome(7, 12)).unwrap();

        let rows = OutcomeRepo::fetch_newer(&conn, &ChannelId::from("r1"), 0, 10).unwrap();
        let event = rows[0].parse().unwrap();
        assert_eq!(event.value, 12);
        assert_eq!(event.sequence_key, 7);
    }
}
