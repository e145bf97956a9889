//! HTTP transports: text stream and duplex.

pub mod sse;
pub mod ws;
