//! # Dispatch Configuration
//!
//! Layered configuration built with the `config` crate. Later sources win:
//!
//! 1. built-in defaults
//! 2. an optional configuration file ([`DispatchConfig::load_from`])
//! 3. environment variables prefixed `DISPATCH`, with `__` separating nested keys
//!
//! ```bash
//! DISPATCH_DISTRIBUTED_TRACING_ENABLED=false
//! DISPATCH_TELEMETRY__ENABLED=true
//! DISPATCH_TELEMETRY__OTLP_ENDPOINT=http://collector:4317
//! ```

use crate::error::{ConfigResult, ConfigurationError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "DISPATCH";

/// Telemetry and structured logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Export traces and metrics over OTLP.
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
    /// Trace sampling ratio in `[0, 1]`.
    pub sample_rate: f64,
    /// `EnvFilter` directive; falls back to `RUST_LOG`, then the environment default.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "shared-dispatch".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            sample_rate: 1.0,
            log_level: None,
        }
    }
}

/// Root configuration for a dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Extract and inject trace context through object annotations.
    pub distributed_tracing_enabled: bool,
    pub telemetry: TelemetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            distributed_tracing_enabled: true,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Defaults overlaid with `DISPATCH_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::build(None)
    }

    /// Defaults, then `path` (format picked from its extension), then environment.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> ConfigResult<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default(
                "distributed_tracing_enabled",
                defaults.distributed_tracing_enabled,
            )?
            .set_default("telemetry.enabled", defaults.telemetry.enabled)?
            .set_default("telemetry.service_name", defaults.telemetry.service_name)?
            .set_default("telemetry.otlp_endpoint", defaults.telemetry.otlp_endpoint)?
            .set_default("telemetry.sample_rate", defaults.telemetry.sample_rate)?;

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading dispatch configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: DispatchConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let telemetry = &self.telemetry;
        if telemetry.service_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }
        if !(0.0..=1.0).contains(&telemetry.sample_rate) {
            return Err(ConfigurationError::invalid_value(
                "telemetry.sample_rate",
                format!("{} is outside [0, 1]", telemetry.sample_rate),
            ));
        }
        if telemetry.enabled && telemetry.otlp_endpoint.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "telemetry.otlp_endpoint",
                "required when telemetry is enabled",
            ));
        }
        Ok(())
    }
}

/// Current environment from `DISPATCH_ENV`, then `APP_ENV`, default `development`.
pub fn environment() -> String {
    std::env::var("DISPATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
