//! # spinfeed-auth
//!
//! Admission control for the spinfeed gateway.
//!
//! - [`TokenVerifier`]: HS256 bearer-token verification producing an
//!   [`spinfeed_core::Identity`]
//! - [`SubscriptionStore`]: trait over the external subscription lookup
//! - [`EntitlementResolver`]: (identity, subscription record) → policy,
//!   with resolution-time expiry and a fail-safe timeout
//! - [`AccessGate`]: the single admission path shared by both transports,
//!   parameterized by strict or degraded mode

#![deny(unsafe_code)]

pub mod errors;
pub mod gate;
pub mod resolver;
pub mod subscription;
pub mod token;

pub use errors::AccessError;
pub use gate::{AccessGate, Admission, bearer_token};
pub use resolver::EntitlementResolver;
pub use subscription::{SubscriptionStore, SubscriptionStoreError};
pub use token::{Claims, TokenVerifier};
