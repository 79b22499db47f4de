//! # Structured Logging Module
//!
//! Environment-aware structured logging with optional OpenTelemetry export.
//!
//! Console output always goes through `tracing-subscriber`. When
//! [`TelemetryConfig::enabled`] is set, spans and metrics are also exported over
//! OTLP (tonic) and the W3C trace-context propagator is installed globally, which is
//! what [`crate::propagation::extract`] and [`crate::propagation::inject`] use.
//!
//! Exporters are built lazily on a Tokio runtime, so call
//! [`init_structured_logging`] from within one when telemetry is enabled.

use crate::config::{environment, TelemetryConfig};
use crate::error::TelemetryError;
use chrono::Utc;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize logging (and telemetry export when enabled). Later calls are no-ops.
pub fn init_structured_logging(config: &TelemetryConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = environment();
        let filter = log_filter(config, &environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_filter(EnvFilter::new(filter.clone()));

        let telemetry = if config.enabled {
            match init_telemetry(config, &environment) {
                Ok(tracer_provider) => Some(
                    tracing_opentelemetry::layer()
                        .with_tracer(tracer_provider.tracer(config.service_name.clone()))
                        .with_filter(EnvFilter::new(filter.clone())),
                ),
                Err(e) => {
                    eprintln!("OpenTelemetry export disabled: {e}");
                    None
                }
            }
        } else {
            None
        };
        let telemetry_active = telemetry.is_some();

        // Embedding applications may already own the global subscriber.
        if tracing_subscriber::registry()
            .with(console)
            .with(telemetry)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            filter = %filter,
            telemetry = telemetry_active,
            service_name = %config.service_name,
            "Structured logging initialized"
        );
    });
}

/// Flush and shut down exporters installed by [`init_structured_logging`].
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(provider) = METER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
}

fn init_telemetry(
    config: &TelemetryConfig,
    environment: &str,
) -> Result<SdkTracerProvider, TelemetryError> {
    let (tracer_provider, meter_provider) = build_providers(config, environment)?;

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());
    opentelemetry::global::set_meter_provider(meter_provider.clone());
    let _ = TRACER_PROVIDER.set(tracer_provider.clone());
    let _ = METER_PROVIDER.set(meter_provider);

    Ok(tracer_provider)
}

/// Build both OTLP pipelines without installing anything globally.
fn build_providers(
    config: &TelemetryConfig,
    environment: &str,
) -> Result<(SdkTracerProvider, SdkMeterProvider), TelemetryError> {
    use opentelemetry_otlp::WithExportConfig;

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()
        .map_err(|e| TelemetryError::SpanExporter(e.to_string()))?;

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()
        .map_err(|e| TelemetryError::MetricExporter(e.to_string()))?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.to_string()),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .with_sampler(sampler(config.sample_rate))
        .build();

    let meter_provider = SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(metric_exporter)
                .with_interval(METRIC_EXPORT_INTERVAL)
                .build(),
        )
        .with_resource(resource)
        .build();

    Ok((tracer_provider, meter_provider))
}

fn sampler(sample_rate: f64) -> Sampler {
    let ratio = if sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sample_rate)
    };
    Sampler::ParentBased(Box::new(ratio))
}

fn log_filter(config: &TelemetryConfig, environment: &str) -> String {
    config
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| default_log_level(environment).to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    resource: &str,
    handler_id: Option<u64>,
    handler_name: Option<&str>,
    status: &str,
) {
    tracing::debug!(
        operation = %operation,
        resource = %resource,
        handler_id = handler_id,
        handler_name = handler_name,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "REGISTRY_OPERATION"
    );
}
