//! Tier resolution: (identity, subscription record) → entitlement policy.
//!
//! Expiry is recomputed against the clock at resolution time; the stored
//! `active` flag is never trusted because the subscription row can lag
//! the payment provider's webhooks. Lookup failures and timeouts admit
//! the caller at the unpaid tier rather than rejecting the connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use spinfeed_core::{EntitlementPolicy, Identity, Tier, TierTable};

use crate::subscription::SubscriptionStore;

/// Resolves a verified identity into the policy its connection will carry.
pub struct EntitlementResolver {
    store: Arc<dyn SubscriptionStore>,
    tiers: TierTable,
    lookup_timeout: Duration,
}

impl EntitlementResolver {
    /// Build a resolver over a subscription store and the loaded tier
    /// table.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        tiers: TierTable,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tiers,
            lookup_timeout,
        }
    }

    /// The policy handed to connections without any subscription.
    #[must_use]
    pub fn unpaid_policy(&self) -> EntitlementPolicy {
        self.tiers.policy_for(Tier::None)
    }

    /// Resolve the policy for an identity. Idempotent, no side effects.
    pub async fn resolve(&self, identity: &Identity) -> EntitlementPolicy {
        let lookup = self.store.get(&identity.subject_id);
        let tier = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(record))) => {
                if record.paid_through <= Utc::now() {
                    debug!(
                        subject = %identity.subject_id,
                        paid_through = %record.paid_through,
                        "subscription lapsed, resolving to unpaid tier"
                    );
                    Tier::None
                } else {
                    record.tier
                }
            }
            Ok(Ok(None)) => Tier::None,
            Ok(Err(e)) => {
                warn!(subject = %identity.subject_id, error = %e, "subscription lookup failed, admitting at unpaid tier");
                Tier::None
            }
            Err(_) => {
                warn!(subject = %identity.subject_id, timeout_ms = self.lookup_timeout.as_millis() as u64, "subscription lookup timed out, admitting at unpaid tier");
                Tier::None
            }
        };

        self.tiers.policy_for(tier)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
