//! # spinfeed-store
//!
//! `SQLite` backing store for the spinfeed gateway.
//!
//! - **Connection pool**: `r2d2` + WAL mode, foreign keys, busy timeout
//! - **Migrations**: embedded SQL, versioned, idempotent
//! - **Repositories**: channels/outcomes (the ordered feed) and
//!   subscriptions (the entitlement lookup)
//! - **Change notification**: a [`ChangeNotifier`] that
//!   [`OutcomeRepo::insert`] pings on every append so the ingester can
//!   run push-notified instead of polling

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod notify;
pub mod outcomes;
pub mod subscriptions;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use notify::ChangeNotifier;
pub use outcomes::{ChannelRepo, ChannelRow, OutcomeRepo};
pub use subscriptions::SubscriptionRepo;
