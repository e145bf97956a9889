//! # spinfeed-server
//!
//! The gateway's live side: connection registry, fan-out dispatch,
//! heartbeat monitoring, wire framing, optional payload sealing, and the
//! Axum router with the stream, duplex, history, and health endpoints.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod frame;
pub mod health;
pub mod heartbeat;
pub mod registry;
pub mod seal;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::ServerConfig;
pub use connection::{ClientConnection, ConnectionState, TransportKind};
pub use dispatcher::Dispatcher;
pub use errors::{RegistryError, SealError, ServerError};
pub use frame::{ClientCommand, Frame};
pub use health::HealthResponse;
pub use heartbeat::{HeartbeatResult, run_heartbeat};
pub use registry::ConnectionRegistry;
pub use seal::{ChaChaSealer, PayloadSealer, PlainSealer, load_or_create_key};
pub use server::{AppState, HistorySource, router};
pub use shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownCoordinator};
