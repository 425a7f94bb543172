//! Token aggregator service
//!
//! Wires the sources, cache, query engine and live feed together behind a
//! single [`TokenService`] that an HTTP or WebSocket router can call into.

pub mod service;

pub use service::{HealthStatus, TokenService};
