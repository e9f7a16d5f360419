//! Logging configuration.

use serde::Deserialize;

/// Logging settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
