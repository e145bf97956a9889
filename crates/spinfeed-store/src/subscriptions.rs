//! Subscription repository: the entitlement lookup table.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use spinfeed_core::{SubjectId, SubscriptionRecord, Tier};

use crate::errors::Result;

/// Subscription repository. Stateless; every method takes `&Connection`.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Look up the subscription for a subject.
    ///
    /// An unknown tier label or unparseable paid-through date degrades the
    /// record rather than failing the lookup: the tier becomes `None` and
    /// the date the UNIX epoch, so the caller resolves to the unpaid tier.
    pub fn get(conn: &Connection, subject: &SubjectId) -> Result<Option<SubscriptionRecord>> {
        let row = conn
            .query_row(
                "SELECT tier, paid_through, active FROM subscriptions WHERE subject_id = ?1",
                params![subject.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(tier, paid_through, active)| {
            let paid_through = DateTime::parse_from_rfc3339(&paid_through)
                .map_or(DateTime::<Utc>::UNIX_EPOCH, |d| d.with_timezone(&Utc));
            SubscriptionRecord {
                tier: Tier::from_label(&tier),
                paid_through,
                active: active == 1,
            }
        }))
    }

    /// Insert or replace a subject's subscription.
    pub fn upsert(
        conn: &Connection,
        subject: &SubjectId,
        record: &SubscriptionRecord,
    ) -> Result<()> {
        let tier = serde_json::to_value(record.tier)?;
        let tier = tier.as_str().unwrap_or("none").to_owned();
        let _ = conn.execute(
            "INSERT INTO subscriptions (subject_id, tier, paid_through, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(subject_id) DO UPDATE SET
               tier = excluded.tier,
               paid_through = excluded.paid_through,
               active = excluded.active,
               updated_at = excluded.updated_at",
            params![
                subject.as_str(),
                tier,
                record.paid_through.to_rfc3339(),
                i32::from(record.active),
            ],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
