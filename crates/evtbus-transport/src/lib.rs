//! # evtbus Transport
//!
//! Queue-backed backend for the evtbus core. Publishers push envelopes into
//! a bounded tokio channel; one dispatcher task drains it and delivers each
//! envelope through the bus, optionally ticking a heartbeat while idle.

pub mod backend;
pub mod config;
pub mod heartbeat;

pub use backend::TokioBackend;
pub use config::{ConfigError, TokioBackendConfig};
pub use heartbeat::HeartbeatStats;
