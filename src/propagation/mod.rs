//! # Object-Carried Trace Propagation
//!
//! Embeds and recovers a distributed-trace context through an object's annotation
//! map, so correlation survives hand-offs (watch streams, queues, storage) where only
//! the object itself travels.
//!
//! - **Extract** reads from a *clone* of the object. Inbound objects are frequently
//!   shared with caches, so the read path must never be observable by the caller.
//! - **Inject** writes to the *live* object, so the fields are present when that exact
//!   instance is later persisted.
//!
//! ```rust
//! use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
//! use opentelemetry::Context;
//! use shared_dispatch::object::{DynamicObject, ObjectMeta};
//! use shared_dispatch::propagation::{has_parent, ObjectPropagator};
//!
//! let propagator = ObjectPropagator::trace_context();
//! let span_context = SpanContext::new(
//!     TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
//!     SpanId::from_hex("00f067aa0ba902b7").unwrap(),
//!     TraceFlags::SAMPLED,
//!     false,
//!     TraceState::default(),
//! );
//! let cx = Context::new().with_remote_span_context(span_context);
//!
//! let mut pod = DynamicObject::new(ObjectMeta::new("default", "pod-a"));
//! propagator.inject(&cx, Some(&mut pod));
//! assert!(pod.metadata.annotation("traceparent").is_some());
//!
//! let recovered = propagator.extract(&Context::new(), Some(&pod));
//! assert!(has_parent(&recovered));
//! ```

pub mod carrier;

pub use carrier::ObjectCarrier;

use crate::object::Object;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::sync::Arc;

/// Extract/inject over objects with a fixed text-map propagator.
#[derive(Debug, Clone)]
pub struct ObjectPropagator {
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl ObjectPropagator {
    pub fn new(propagator: impl TextMapPropagator + Send + Sync + 'static) -> Self {
        Self {
            propagator: Arc::new(propagator),
        }
    }

    /// W3C `traceparent` / `tracestate` propagation.
    pub fn trace_context() -> Self {
        Self::new(TraceContextPropagator::new())
    }

    /// Recover the context carried by `object`, layered on top of `cx`.
    pub fn extract<O: Object>(&self, cx: &Context, object: Option<&O>) -> Context {
        let mut copy = object.cloned();
        let carrier = ObjectCarrier::new(copy.as_mut());
        self.propagator.extract_with_context(cx, &carrier)
    }

    /// Write `cx` into `object`'s annotations in place.
    pub fn inject<O: Object>(&self, cx: &Context, object: Option<&mut O>) {
        let mut carrier = ObjectCarrier::new(object);
        self.propagator.inject_context(cx, &mut carrier);
    }
}

impl Default for ObjectPropagator {
    fn default() -> Self {
        Self::trace_context()
    }
}

/// [`ObjectPropagator::extract`] using the globally installed propagator.
pub fn extract<O: Object>(cx: &Context, object: Option<&O>) -> Context {
    let mut copy = object.cloned();
    let carrier = ObjectCarrier::new(copy.as_mut());
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract_with_context(cx, &carrier)
    })
}

/// [`ObjectPropagator::inject`] using the globally installed propagator.
pub fn inject<O: Object>(cx: &Context, object: Option<&mut O>) {
    let mut carrier = ObjectCarrier::new(object);
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut carrier)
    });
}

/// Whether `cx` continues a trace started in another process.
pub fn has_parent(cx: &Context) -> bool {
    let span = cx.span();
    let span_context = span.span_context();
    span_context.is_valid() && span_context.is_remote()
}
