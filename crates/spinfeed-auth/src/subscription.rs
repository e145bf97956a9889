//! The external subscription lookup, behind a trait so the resolver can
//! be tested with fakes and the binary can inject a SQLite-backed
//! provider.

use async_trait::async_trait;
use thiserror::Error;

use spinfeed_core::{SubjectId, SubscriptionRecord};

/// Failure talking to the subscription store. The resolver treats any
/// store failure as "unknown subject" and fails safe to the unpaid tier.
#[derive(Debug, Error)]
#[error("subscription store error: {0}")]
pub struct SubscriptionStoreError(pub String);

/// Lookup of a subject's subscription state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Return the record for a subject, or `None` if the subject has no
    /// subscription at all.
    async fn get(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<SubscriptionRecord>, SubscriptionStoreError>;
}
