//! # Handler Metrics
//!
//! Minimal metrics sink consumed by the dispatcher: one execution counter and one
//! reconcile-duration histogram, both keyed by `(resource_type, handler_name, failed)`.
//!
//! [`OtelHandlerMetrics`] records through the global OpenTelemetry meter provider.
//! Until [`crate::logging::init_structured_logging`] installs an SDK provider the
//! global provider is a no-op, so recording is always safe.

use crate::constants::metrics::{
    HANDLER_EXECUTIONS_TOTAL, HANDLER_RECONCILE_DURATION, LABEL_FAILED, LABEL_HANDLER_NAME,
    LABEL_RESOURCE_TYPE, METER_NAME,
};
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;

/// Sink for per-handler execution metrics.
pub trait HandlerMetrics: Send + Sync {
    fn increment_handler_execution(&self, resource_type: &str, handler_name: &str, failed: bool);

    fn record_reconcile_duration(
        &self,
        resource_type: &str,
        handler_name: &str,
        failed: bool,
        seconds: f64,
    );
}

/// [`HandlerMetrics`] backed by OpenTelemetry instruments.
#[derive(Debug, Clone)]
pub struct OtelHandlerMetrics {
    executions: Counter<u64>,
    reconcile_duration: Histogram<f64>,
}

impl OtelHandlerMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);
        Self {
            executions: meter
                .u64_counter(HANDLER_EXECUTIONS_TOTAL)
                .with_description("Total number of shared handler executions")
                .build(),
            reconcile_duration: meter
                .f64_histogram(HANDLER_RECONCILE_DURATION)
                .with_description("Shared handler reconcile time in seconds")
                .with_unit("s")
                .build(),
        }
    }

    fn labels(resource_type: &str, handler_name: &str, failed: bool) -> [KeyValue; 3] {
        [
            KeyValue::new(LABEL_RESOURCE_TYPE, resource_type.to_string()),
            KeyValue::new(LABEL_HANDLER_NAME, handler_name.to_string()),
            KeyValue::new(LABEL_FAILED, failed),
        ]
    }
}

impl Default for OtelHandlerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerMetrics for OtelHandlerMetrics {
    fn increment_handler_execution(&self, resource_type: &str, handler_name: &str, failed: bool) {
        self.executions
            .add(1, &Self::labels(resource_type, handler_name, failed));
    }

    fn record_reconcile_duration(
        &self,
        resource_type: &str,
        handler_name: &str,
        failed: bool,
        seconds: f64,
    ) {
        self.reconcile_duration
            .record(seconds, &Self::labels(resource_type, handler_name, failed));
    }
}
