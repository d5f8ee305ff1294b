//! Tracing initialization for binaries and tests
//!
//! TigerStyle: Explicit configuration, no surprises.

use tracing_subscriber::EnvFilter;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log level filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Include tracing span targets in output
    pub with_targets: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_targets: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new(log_level: impl Into<String>) -> Self {
        Self {
            log_level: log_level.into(),
            ..Default::default()
        }
    }

    pub fn with_targets(mut self) -> Self {
        self.with_targets = true;
        self
    }
}

/// Install the global tracing subscriber
///
/// Safe to call more than once: later calls are no-ops.
pub fn init_telemetry(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_targets)
        .try_init();
}
