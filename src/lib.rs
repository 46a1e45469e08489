//! # evtbus
//!
//! Deterministic, bounded publish/subscribe event bus.
//!
//! ## Architecture
//!
//! The workspace is split into:
//!
//! 1. **evtbus-core** - Envelope, subscriber pool, subscription registry,
//!    dispatch engine and the backend capability trait
//! 2. **evtbus-transport** - Tokio queue backend with a dispatcher task and
//!    heartbeat instrumentation
//! 3. **evtbus** - This binary, wiring the two together

use std::path::Path;

use anyhow::Context;

pub use evtbus_core::{
    event_bus, init_event_bus, Backend, BackendError, BusError, Callback, Dispatcher,
    EnqueueError, Envelope, EventBus, EventId, Handle, MemoryBackend, MemoryBackendConfig,
    Result, INLINE_MAX, MAX_EVENT_IDS, MAX_HANDLES, MAX_SUBSCRIBERS_PER_EVENT,
};
pub use evtbus_transport::{ConfigError, HeartbeatStats, TokioBackend, TokioBackendConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming an optional JSON backend configuration file
pub const CONFIG_ENV: &str = "EVTBUS_CONFIG";

/// Initialize logging with the default configuration
///
/// Sets up structured logging with console output and `RUST_LOG` support.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Load the backend configuration from a JSON file.
///
/// Fields missing from the file keep their defaults. The result is validated
/// before it is returned.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<TokioBackendConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: TokioBackendConfig = serde_json::from_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Configuration from [`CONFIG_ENV`], or the defaults when it is unset
pub fn config_from_env() -> anyhow::Result<TokioBackendConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(path),
        None => Ok(TokioBackendConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_partial_file() {
        let path = std::env::temp_dir().join(format!("evtbus-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "heartbeat_ms": 500 }"#).unwrap();

        let config = load_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.heartbeat(), Some(std::time::Duration::from_millis(500)));
        assert_eq!(config.queue_depth, 16);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let path =
            std::env::temp_dir().join(format!("evtbus-bad-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "queue_depth": 0 }"#).unwrap();

        let result = load_config(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/evtbus.json").is_err());
    }
}
