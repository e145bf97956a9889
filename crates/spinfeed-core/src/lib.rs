//! # spinfeed-core
//!
//! Foundation types shared by every spinfeed crate.
//!
//! - **Branded IDs**: `ChannelId`, `ConnectionId`, `SubjectId` newtypes
//! - **Outcomes**: `OutcomeEvent` with derived `ColorClass`, plus the
//!   public wire payload shape
//! - **Entitlements**: `Tier`, `EntitlementPolicy`, `Identity`,
//!   `SubscriptionRecord`, and the versioned `TierTable`

#![deny(unsafe_code)]

pub mod entitlement;
pub mod ids;
pub mod outcome;

pub use entitlement::{EntitlementPolicy, Identity, SubscriptionRecord, Tier, TierTable};
pub use ids::{ChannelId, ConnectionId, SubjectId};
pub use outcome::{ColorClass, OutcomeError, OutcomeEvent, OutcomePayload, RawOutcome};
