//! Outcome events and their derived color classification.
//!
//! An [`OutcomeEvent`] is one spin result read from the backing store. It is
//! immutable once constructed and keyed by a per-channel monotonic
//! `sequence_key`. [`OutcomePayload`] is the public wire shape pushed to
//! clients; its field names are fixed by the existing client contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ChannelId;

/// The numbers that classify as red on a European wheel.
const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

/// Highest valid wheel value.
pub const MAX_WHEEL_VALUE: u8 = 36;

/// Errors constructing an outcome from raw store data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutcomeError {
    /// The raw value is outside the 0..=36 wheel range.
    #[error("wheel value {0} out of range 0..=36")]
    ValueOutOfRange(i64),
    /// The raw emission timestamp is not RFC 3339.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Color classification of a wheel value, derived and never stored raw.
///
/// Wire values are the Portuguese names the client contract expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorClass {
    /// Zero only.
    #[serde(rename = "verde")]
    Green,
    /// One of the eighteen red numbers.
    #[serde(rename = "vermelho")]
    Red,
    /// Everything else.
    #[serde(rename = "preto")]
    Black,
}

impl ColorClass {
    /// Derive the color class for a wheel value.
    ///
    /// Callers must have validated the range; out-of-range values classify
    /// as black, which [`OutcomeEvent::new`] prevents from ever happening.
    #[must_use]
    pub fn derive(value: u8) -> Self {
        if value == 0 {
            Self::Green
        } else if RED_NUMBERS.contains(&value) {
            Self::Red
        } else {
            Self::Black
        }
    }

    /// The wire string for this class.
    #[must_use]
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Self::Green => "verde",
            Self::Red => "vermelho",
            Self::Black => "preto",
        }
    }
}

/// One immutable spin result, ordered per channel by `sequence_key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    /// Channel (table) the outcome belongs to.
    pub channel_id: ChannelId,
    /// Human-readable table name.
    pub channel_label: String,
    /// Wheel value, 0..=36.
    pub value: u8,
    /// Derived color class.
    pub color: ColorClass,
    /// Monotonically non-decreasing per channel.
    pub sequence_key: i64,
    /// When the upstream recorded the spin.
    pub emitted_at: DateTime<Utc>,
}

impl OutcomeEvent {
    /// Build an outcome, validating the wheel range and deriving the color.
    pub fn new(
        channel_id: ChannelId,
        channel_label: impl Into<String>,
        value: u8,
        sequence_key: i64,
        emitted_at: DateTime<Utc>,
    ) -> Result<Self, OutcomeError> {
        if value > MAX_WHEEL_VALUE {
            return Err(OutcomeError::ValueOutOfRange(i64::from(value)));
        }
        Ok(Self {
            channel_id,
            channel_label: channel_label.into(),
            value,
            color: ColorClass::derive(value),
            sequence_key,
            emitted_at,
        })
    }
}

/// One unvalidated row as read from the backing store. Parsing may fail
/// per row; a bad row is skipped by the reader, never propagated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawOutcome {
    /// Channel key as stored.
    pub channel_id: String,
    /// Table display name.
    pub channel_label: String,
    /// Unvalidated wheel value.
    pub value: i64,
    /// Feed position.
    pub sequence: i64,
    /// RFC 3339 emission timestamp as stored.
    pub emitted_at: String,
}

impl RawOutcome {
    /// Validate and convert into an [`OutcomeEvent`].
    pub fn parse(&self) -> Result<OutcomeEvent, OutcomeError> {
        let value = u8::try_from(self.value)
            .map_err(|_| OutcomeError::ValueOutOfRange(self.value))?;
        let emitted_at = DateTime::parse_from_rfc3339(&self.emitted_at)
            .map_err(|_| OutcomeError::InvalidTimestamp(self.emitted_at.clone()))?
            .with_timezone(&Utc);
        OutcomeEvent::new(
            ChannelId::from(self.channel_id.as_str()),
            self.channel_label.clone(),
            value,
            self.sequence,
            emitted_at,
        )
    }
}

/// The client-facing data payload. Field names are part of the wire
/// contract and must not change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomePayload {
    /// Channel identifier.
    #[serde(rename = "roleta_id")]
    pub channel_id: ChannelId,
    /// Table display name.
    #[serde(rename = "roleta_nome")]
    pub channel_label: String,
    /// Wheel value.
    #[serde(rename = "numero")]
    pub value: u8,
    /// Derived color.
    #[serde(rename = "cor")]
    pub color: ColorClass,
    /// Upstream emission time.
    pub timestamp: DateTime<Utc>,
}

impl From<&OutcomeEvent> for OutcomePayload {
    fn from(event: &OutcomeEvent) -> Self {
        Self {
            channel_id: event.channel_id.clone(),
            channel_label: event.channel_label.clone(),
            value: event.value,
            color: event.color,
            timestamp: event.emitted_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
