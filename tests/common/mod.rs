//! Shared fixtures for the dispatch integration tests.

#![allow(dead_code)]

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracer, SdkTracerProvider, SpanData};
use parking_lot::Mutex;
use shared_dispatch::metrics::HandlerMetrics;
use shared_dispatch::object::{DynamicObject, ObjectMeta};
use std::future::Future;
use std::time::Duration;

pub const PODS: &str = "/v1, Resource=pods";

/// A pod-shaped object with the given uid.
pub fn pod(name: &str, uid: &str) -> DynamicObject {
    DynamicObject::new(ObjectMeta::new("default", name).with_uid(uid))
}

/// SDK tracer whose finished spans can be read back.
pub struct RecordingTracer {
    pub provider: SdkTracerProvider,
    pub exporter: InMemorySpanExporter,
}

impl RecordingTracer {
    pub fn new() -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        Self { provider, exporter }
    }

    pub fn tracer(&self) -> SdkTracer {
        self.provider.tracer("dispatch-tests")
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap_or_default()
    }

    pub fn span(&self, name: &str) -> SpanData {
        self.spans()
            .into_iter()
            .find(|span| span.name == name)
            .unwrap_or_else(|| panic!("no finished span named {name}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub resource_type: String,
    pub handler_name: String,
    pub failed: bool,
}

/// [`HandlerMetrics`] that keeps every observation in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub executions: Mutex<Vec<Execution>>,
    pub durations: Mutex<Vec<(Execution, f64)>>,
}

impl RecordingMetrics {
    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().clone()
    }

    pub fn durations(&self) -> Vec<(Execution, f64)> {
        self.durations.lock().clone()
    }
}

impl HandlerMetrics for RecordingMetrics {
    fn increment_handler_execution(&self, resource_type: &str, handler_name: &str, failed: bool) {
        self.executions.lock().push(Execution {
            resource_type: resource_type.to_string(),
            handler_name: handler_name.to_string(),
            failed,
        });
    }

    fn record_reconcile_duration(
        &self,
        resource_type: &str,
        handler_name: &str,
        failed: bool,
        seconds: f64,
    ) {
        self.durations.lock().push((
            Execution {
                resource_type: resource_type.to_string(),
                handler_name: handler_name.to_string(),
                failed,
            },
            seconds,
        ));
    }
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
