//! Typed accessors for the environment knobs the engine reserves by convention.
//!
//! These are read, never written, by `load_and_apply` — call it first so that
//! `.env`/XDG values are visible to `std::env::var` before these accessors run.

use std::str::FromStr;

/// Text or structured log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

/// Snapshot of the reserved environment knobs, read once at process start.
#[derive(Debug, Clone)]
pub struct EnvKnobs {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for EnvKnobs {
    fn default() -> Self {
        Self::read("loomflow")
    }
}

impl EnvKnobs {
    /// Reads `LOOMFLOW_LOG_LEVEL`, `LOOMFLOW_LOG_FORMAT`, `LOOMFLOW_METRICS_ENABLED`,
    /// `LOOMFLOW_OTLP_ENDPOINT`, `LOOMFLOW_SERVICE_NAME` from the process environment.
    /// `service_name` defaults to `default_service_name` when unset.
    pub fn read(default_service_name: &str) -> Self {
        Self {
            log_level: std::env::var("LOOMFLOW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("LOOMFLOW_LOG_FORMAT")
                .ok()
                .and_then(|v| LogFormat::from_str(&v).ok())
                .unwrap_or(LogFormat::Pretty),
            metrics_enabled: std::env::var("LOOMFLOW_METRICS_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            otlp_endpoint: std::env::var("LOOMFLOW_OTLP_ENDPOINT").ok(),
            service_name: std::env::var("LOOMFLOW_SERVICE_NAME")
                .unwrap_or_else(|_| default_service_name.to_string()),
        }
    }
}
