//! Subscription tiers and the policies derived from them.
//!
//! Tier limits live in one versioned [`TierTable`] loaded at startup and
//! immutable afterwards. Every admission derives an [`EntitlementPolicy`]
//! from the table; the policy is attached to the connection and never
//! edited in place, so a tier upgrade only affects connections opened
//! after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SubjectId;

/// Subscription tier of a subject. `None` is the unpaid/anonymous tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No active subscription.
    None,
    /// Entry plan.
    Basic,
    /// Mid plan.
    Pro,
    /// Unlimited plan.
    Premium,
}

impl Tier {
    /// Parse a stored plan label, case-insensitively. Unknown labels map
    /// to `None` so a bad row degrades access instead of widening it.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "basic" => Self::Basic,
            "pro" => Self::Pro,
            "premium" => Self::Premium,
            _ => Self::None,
        }
    }
}

/// Verified identity extracted from a bearer credential.
///
/// Connection-scoped; never persisted by this subsystem.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    /// The credential's subject claim.
    pub subject_id: SubjectId,
    /// Remaining verified claims, kept for logging and future shaping.
    pub raw_claims: serde_json::Value,
}

/// What the external subscription store knows about a subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Purchased tier.
    pub tier: Tier,
    /// Paid-through instant. Expiry is always recomputed against the
    /// clock at resolution time; the stored `active` flag can be stale.
    pub paid_through: DateTime<Utc>,
    /// Stored status flag, informational only.
    pub active: bool,
}

/// Limits a tier grants. `None` in an `Option` field means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// How many channels one connection may subscribe to.
    pub max_visible_channels: Option<u32>,
    /// How many historical outcomes the pull endpoint returns.
    pub history_depth: Option<u32>,
    /// Whether outcomes are pushed live. History-only tiers poll instead.
    pub live_access: bool,
}

/// The data shaping attached to a connection at admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntitlementPolicy {
    /// Tier the policy was derived from.
    pub tier: Tier,
    /// Subscription cap, `None` = unbounded.
    pub max_visible_channels: Option<u32>,
    /// History cap, `None` = unbounded.
    pub history_depth: Option<u32>,
    /// Live push eligibility.
    pub live_access: bool,
}

impl EntitlementPolicy {
    /// Whether a connection already holding `current` subscriptions may
    /// add one more.
    #[must_use]
    pub fn allows_subscription(&self, current: usize) -> bool {
        match self.max_visible_channels {
            Some(cap) => current < cap as usize,
            None => true,
        }
    }
}

/// Versioned tier→limits table. Compiled defaults, overridable in
/// settings, loaded once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    /// Bumped whenever the limits change, for log correlation.
    pub version: u32,
    /// Limits for the unpaid tier.
    pub none: TierLimits,
    /// Limits for the entry plan.
    pub basic: TierLimits,
    /// Limits for the mid plan.
    pub pro: TierLimits,
    /// Limits for the unlimited plan.
    pub premium: TierLimits,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            version: 1,
            none: TierLimits {
                max_visible_channels: Some(1),
                history_depth: Some(5),
                live_access: false,
            },
            basic: TierLimits {
                max_visible_channels: Some(2),
                history_depth: Some(15),
                live_access: true,
            },
            pro: TierLimits {
                max_visible_channels: Some(5),
                history_depth: Some(50),
                live_access: true,
            },
            premium: TierLimits {
                max_visible_channels: None,
                history_depth: None,
                live_access: true,
            },
        }
    }
}

impl TierTable {
    /// Limits for a tier.
    #[must_use]
    pub fn limits(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::None => self.none,
            Tier::Basic => self.basic,
            Tier::Pro => self.pro,
            Tier::Premium => self.premium,
        }
    }

    /// Derive the immutable policy for a tier.
    #[must_use]
    pub fn policy_for(&self, tier: Tier) -> EntitlementPolicy {
        let limits = self.limits(tier);
        EntitlementPolicy {
            tier,
            max_visible_channels: limits.max_visible_channels,
            history_depth: limits.history_depth,
            live_access: limits.live_access,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
