// Logging setup
//
// Console logging through tracing-subscriber, filtered by RUST_LOG / LOG_LEVEL.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "gatehouse_api=debug,gatehouse_storage=debug,tower_http=debug";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log filter (e.g., "info", "debug", "gatehouse_api=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "gatehouse-api".to_string(),
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `SERVICE_NAME`: service name (default: "gatehouse-api")
    /// - `RUST_LOG` or `LOG_LEVEL`: log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "gatehouse-api".to_string()),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_telemetry(config: &TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();

    tracing::debug!(service = %config.service_name, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back_to_default() {
        let config = TelemetryConfig {
            log_filter: Some("gatehouse_api=loud".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.filter().to_string(),
            EnvFilter::new(DEFAULT_LOG_FILTER).to_string()
        );
    }

    #[test]
    fn test_explicit_filter() {
        let config = TelemetryConfig {
            log_filter: Some("warn".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "warn");
    }
}
