//! # Shared Handler
//!
//! Fans one change notification out to every registered handler, in registration
//! order, and folds their failures into a single result.
//!
//! ## Dispatch pass
//!
//! 1. Recover the inbound trace context from the object's annotations and open the
//!    `SharedHandler.OnChange` span, linked to the remote parent when there is one.
//! 2. Snapshot the registry. An empty snapshot ends the pass with `Ok(())`.
//! 3. Run each handler under its own child span, after injecting that span's context
//!    into the current object. Failures are collected, never short-circuited.
//!    A replacement object is threaded to later handlers unless it has an empty uid,
//!    including when the same handler also reported an error.
//! 4. Fold the collected failures into `Ok`, one [`HandlerError`], or an aggregate.
//!
//! Handlers run sequentially so later handlers can rely on the transformations
//! of earlier ones. Concurrent passes for different keys are independent.

use crate::config::DispatchConfig;
use crate::constants::{attributes, spans, TRACER_NAME};
use crate::dispatch::handler::{Change, SharedControllerHandler};
use crate::error::{is_ignore, ChangeError, ErrorList, HandlerError};
use crate::metrics::{HandlerMetrics, OtelHandlerMetrics};
use crate::object::Object;
use crate::propagation::{has_parent, ObjectPropagator};
use crate::registry::{HandlerEntry, HandlerId, HandlerRegistry};
use crate::scope::Scope;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Link, Span, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Dispatcher for one resource type.
pub struct SharedHandler<O: Object> {
    controller_gvr: String,
    registry: HandlerRegistry<O>,
    tracer: Arc<BoxedTracer>,
    propagator: ObjectPropagator,
    metrics: Arc<dyn HandlerMetrics>,
    distributed_tracing_enabled: bool,
}

impl<O: Object> Clone for SharedHandler<O> {
    fn clone(&self) -> Self {
        Self {
            controller_gvr: self.controller_gvr.clone(),
            registry: self.registry.clone(),
            tracer: Arc::clone(&self.tracer),
            propagator: self.propagator.clone(),
            metrics: Arc::clone(&self.metrics),
            distributed_tracing_enabled: self.distributed_tracing_enabled,
        }
    }
}

impl<O: Object> std::fmt::Debug for SharedHandler<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandler")
            .field("controller_gvr", &self.controller_gvr)
            .field("handlers", &self.registry.handler_names())
            .field("distributed_tracing_enabled", &self.distributed_tracing_enabled)
            .finish()
    }
}

impl<O: Object> SharedHandler<O> {
    /// Dispatcher for the resource identified by `controller_gvr`, using the global
    /// tracer and meter providers and W3C trace-context propagation.
    pub fn new(controller_gvr: impl Into<String>) -> Self {
        let controller_gvr = controller_gvr.into();
        Self {
            controller_gvr: controller_gvr.clone(),
            registry: HandlerRegistry::for_resource(controller_gvr.clone()),
            tracer: Arc::new(opentelemetry::global::tracer(TRACER_NAME)),
            propagator: ObjectPropagator::default(),
            metrics: Arc::new(OtelHandlerMetrics::new()),
            distributed_tracing_enabled: true,
        }
    }

    pub fn with_config(mut self, config: &DispatchConfig) -> Self {
        self.distributed_tracing_enabled = config.distributed_tracing_enabled;
        self
    }

    pub fn with_tracer<T>(mut self, tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        self.tracer = Arc::new(BoxedTracer::new(Box::new(tracer)));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn HandlerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_propagator(mut self, propagator: ObjectPropagator) -> Self {
        self.propagator = propagator;
        self
    }

    pub fn controller_gvr(&self) -> &str {
        &self.controller_gvr
    }

    pub fn registry(&self) -> &HandlerRegistry<O> {
        &self.registry
    }

    /// Add a handler, active until `scope` is cancelled.
    pub fn register<H>(&self, scope: &Scope, name: impl Into<String>, handler: H) -> HandlerId
    where
        H: SharedControllerHandler<O> + 'static,
    {
        self.registry.register(scope, name, handler)
    }

    /// Run every registered handler against `obj`. See the module docs for the pass.
    ///
    /// The caller's current [`Context`] is the fallback parent when the object
    /// carries no trace context.
    pub async fn on_change(&self, key: &str, obj: Option<O>) -> Result<(), ChangeError> {
        let mut obj = obj;

        let parent = if self.distributed_tracing_enabled {
            self.propagator.extract(&Context::current(), obj.as_ref())
        } else {
            Context::current()
        };
        let dispatch_cx = self.start_dispatch_span(&parent, key, obj.as_ref());
        let dispatch_span = dispatch_cx.span();

        let handlers = self.registry.snapshot();
        dispatch_span.set_attribute(KeyValue::new(
            attributes::HANDLER_COUNT,
            handlers.len() as i64,
        ));
        if handlers.is_empty() {
            dispatch_span.set_status(Status::Ok);
            dispatch_span.end();
            return Ok(());
        }

        let mut errs = ErrorList::new();
        for entry in &handlers {
            if let Some(err) = self.invoke(&dispatch_cx, entry, key, &mut obj).await {
                errs.push(err);
            }
        }

        let result = errs.into_result();
        match &result {
            Ok(()) => dispatch_span.set_status(Status::Ok),
            Err(e) => {
                warn!(
                    controller_gvr = %self.controller_gvr,
                    key,
                    failures = e.handler_errors().len(),
                    error = %e,
                    "Shared handler dispatch failed"
                );
                dispatch_span.set_status(Status::error(e.to_string()));
            }
        }
        dispatch_span.end();
        result
    }

    fn start_dispatch_span(&self, parent: &Context, key: &str, obj: Option<&O>) -> Context {
        let mut builder = self.tracer.span_builder(spans::ON_CHANGE);
        if has_parent(parent) {
            builder = builder.with_links(vec![Link::with_context(
                parent.span().span_context().clone(),
            )]);
        }

        let mut span = self.tracer.build_with_context(builder, parent);
        span.set_attribute(KeyValue::new(
            attributes::CONTROLLER_GVR,
            self.controller_gvr.clone(),
        ));
        span.set_attribute(KeyValue::new(attributes::OBJECT_KEY, key.to_string()));
        if let Some(meta) = obj.and_then(|obj| obj.meta().ok()) {
            span.set_attribute(KeyValue::new(attributes::OBJECT_UID, meta.uid.clone()));
            span.set_attribute(KeyValue::new(attributes::OBJECT_NAME, meta.name.clone()));
            span.set_attribute(KeyValue::new(
                attributes::OBJECT_NAMESPACE,
                meta.namespace.clone(),
            ));
        }
        parent.with_span(span)
    }

    /// Run one handler and thread its replacement into `obj`. Returns its failure.
    async fn invoke(
        &self,
        dispatch_cx: &Context,
        entry: &HandlerEntry<O>,
        key: &str,
        obj: &mut Option<O>,
    ) -> Option<HandlerError> {
        let builder = self
            .tracer
            .span_builder(entry.name.clone())
            .with_attributes([
                KeyValue::new(attributes::HANDLER_ID, entry.id as i64),
                KeyValue::new(attributes::HANDLER_NAME, entry.name.clone()),
            ]);
        let handler_span = self.tracer.build_with_context(builder, dispatch_cx);
        let handler_cx = dispatch_cx.with_span(handler_span);
        if self.distributed_tracing_enabled {
            self.propagator.inject(&handler_cx, obj.as_mut());
        }

        let started = Instant::now();
        let outcome = entry.handler.on_change(&handler_cx, key, obj.as_ref()).await;
        let elapsed = started.elapsed().as_secs_f64();

        // Threading does not depend on whether the handler also reported an error.
        if let Change::Replace(next) = outcome.change {
            if adopt_replacement(&next) {
                *obj = Some(next);
            } else {
                debug!(handler = %entry.name, key, "Discarding replacement object with empty uid");
            }
        }

        let handler_span = handler_cx.span();
        let failure = match outcome.error {
            None => None,
            Some(e) if is_ignore(&e) => {
                debug!(handler = %entry.name, key, reason = %e, "Shared handler ignored change");
                None
            }
            Some(e) => {
                handler_span.record_error(&*e);
                handler_span.set_status(Status::error(e.to_string()));
                Some(HandlerError::new(entry.name.clone(), e))
            }
        };
        let failed = failure.is_some();
        if !failed {
            handler_span.set_status(Status::Ok);
        }

        self.metrics
            .increment_handler_execution(&self.controller_gvr, &entry.name, failed);
        self.metrics
            .record_reconcile_duration(&self.controller_gvr, &entry.name, failed, elapsed);

        handler_span.end();
        failure
    }
}

/// A replacement is adopted unless it is recognizably an empty placeholder.
fn adopt_replacement<O: Object>(candidate: &O) -> bool {
    match candidate.meta() {
        Ok(meta) => !meta.uid.is_empty(),
        // identity unknown: adopt
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{handler_fn, HandlerOutcome};
    use crate::error::{AccessorError, Ignore};
    use crate::object::{DynamicObject, ObjectMeta};
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    struct Opaque;

    impl Object for Opaque {
        fn meta(&self) -> Result<&ObjectMeta, AccessorError> {
            Err(AccessorError::new("opaque"))
        }

        fn meta_mut(&mut self) -> Result<&mut ObjectMeta, AccessorError> {
            Err(AccessorError::new("opaque"))
        }
    }

    fn pod(uid: &str) -> DynamicObject {
        DynamicObject::new(ObjectMeta::new("default", "pod-a").with_uid(uid))
    }

    #[test]
    fn test_adopt_replacement_policy() {
        assert!(adopt_replacement(&pod("u-2")));
        assert!(!adopt_replacement(&pod("")));
        assert!(adopt_replacement(&Opaque));
    }

    #[tokio::test]
    async fn test_no_handlers_is_ok() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        assert!(shared.on_change("default/pod-a", Some(pod("u-1"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let scope = Scope::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let calls = Arc::clone(&calls);
            shared.register(
                &scope,
                name,
                handler_fn(move |_key: &str, _obj: Option<&DynamicObject>| {
                    calls.lock().push(name);
                    Ok(Change::NoChange)
                }),
            );
        }

        shared.on_change("default/pod-a", Some(pod("u-1"))).await.unwrap();
        assert_eq!(*calls.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_short_circuit() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let scope = Scope::new();
        let ran_last = Arc::new(Mutex::new(false));

        shared.register(
            &scope,
            "h1",
            handler_fn(|_key: &str, _obj: Option<&DynamicObject>| anyhow::bail!("a")),
        );
        shared.register(
            &scope,
            "h2",
            handler_fn(|_key: &str, _obj: Option<&DynamicObject>| anyhow::bail!("b")),
        );
        let flag = Arc::clone(&ran_last);
        shared.register(
            &scope,
            "h3",
            handler_fn(move |_key: &str, _obj: Option<&DynamicObject>| {
                *flag.lock() = true;
                Ok(Change::NoChange)
            }),
        );

        let err = shared
            .on_change("default/pod-a", Some(pod("u-1")))
            .await
            .unwrap_err();
        assert!(*ran_last.lock());
        assert_eq!(err.to_string(), "handler h1: a, handler h2: b");
        assert_eq!(err.cause().handler_name(), "h1");
    }

    #[tokio::test]
    async fn test_ignore_is_not_reported() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        shared.register(
            &Scope::new(),
            "skip",
            handler_fn(|_key: &str, _obj: Option<&DynamicObject>| Err(Ignore.into())),
        );

        assert!(shared.on_change("default/pod-a", Some(pod("u-1"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_absent_object_is_dispatched() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        shared.register(
            &Scope::new(),
            "deleted",
            handler_fn(move |key: &str, obj: Option<&DynamicObject>| {
                *slot.lock() = Some((key.to_string(), obj.is_none()));
                Ok(Change::NoChange)
            }),
        );

        shared.on_change("default/pod-a", None).await.unwrap();
        assert_eq!(*seen.lock(), Some(("default/pod-a".to_string(), true)));
    }

    #[tokio::test]
    async fn test_noop_tracer_injects_nothing() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        shared.register(
            &Scope::new(),
            "observe",
            handler_fn(move |_key: &str, obj: Option<&DynamicObject>| {
                *slot.lock() = obj.and_then(|o| o.metadata.annotations.clone());
                Ok(Change::NoChange)
            }),
        );

        shared.on_change("default/pod-a", Some(pod("u-1"))).await.unwrap();
        // No SDK provider is installed, so there is no valid span context to write.
        assert!(seen.lock().is_none());
    }

    #[tokio::test]
    async fn test_tracing_disabled_leaves_object_untouched() {
        let config = DispatchConfig {
            distributed_tracing_enabled: false,
            ..Default::default()
        };
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.").with_config(&config);
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        shared.register(
            &Scope::new(),
            "observe",
            handler_fn(move |_key: &str, obj: Option<&DynamicObject>| {
                *slot.lock() = obj.cloned();
                Ok(Change::NoChange)
            }),
        );

        shared.on_change("default/pod-a", Some(pod("u-1"))).await.unwrap();
        assert_eq!(*seen.lock(), Some(pod("u-1")));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registration_is_logged_once_at_debug() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
            shared.register(
                &Scope::new(),
                "audit",
                handler_fn(|_key: &str, _obj: Option<&DynamicObject>| Ok(Change::NoChange)),
            );
        });

        let output = String::from_utf8(capture.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("REGISTRY_OPERATION"))
            .collect();
        assert_eq!(lines.len(), 1, "{output}");
        assert!(lines[0].contains("DEBUG"));
        assert!(lines[0].contains("resource=pods.v1."));
        assert!(lines[0].contains("handler_name=\"audit\""));
    }

    /// Persists a status update, then fails.
    struct PersistThenFail;

    #[async_trait::async_trait]
    impl SharedControllerHandler<DynamicObject> for PersistThenFail {
        async fn on_change(
            &self,
            _cx: &Context,
            _key: &str,
            _obj: Option<&DynamicObject>,
        ) -> HandlerOutcome<DynamicObject> {
            HandlerOutcome::replace(pod("u-2")).with_error(anyhow::anyhow!("requeue"))
        }
    }

    #[tokio::test]
    async fn test_replacement_is_threaded_when_handler_also_fails() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let scope = Scope::new();
        let seen = Arc::new(Mutex::new(None));

        shared.register(&scope, "persist", PersistThenFail);
        let slot = Arc::clone(&seen);
        shared.register(
            &scope,
            "observer",
            handler_fn(move |_key: &str, obj: Option<&DynamicObject>| {
                *slot.lock() = obj.map(|o| o.metadata.uid.clone());
                Ok(Change::NoChange)
            }),
        );

        let err = shared
            .on_change("default/pod-a", Some(pod("u-1")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "handler persist: requeue");
        assert_eq!(seen.lock().as_deref(), Some("u-2"));
    }

    #[tokio::test]
    async fn test_replacement_is_threaded_when_handler_ignores() {
        let shared = SharedHandler::<DynamicObject>::new("pods.v1.");
        let scope = Scope::new();
        let seen = Arc::new(Mutex::new(None));

        shared.register(&scope, "skip", IgnoreWith(pod("u-3")));
        let slot = Arc::clone(&seen);
        shared.register(
            &scope,
            "observer",
            handler_fn(move |_key: &str, obj: Option<&DynamicObject>| {
                *slot.lock() = obj.map(|o| o.metadata.uid.clone());
                Ok(Change::NoChange)
            }),
        );

        assert!(shared.on_change("default/pod-a", Some(pod("u-1"))).await.is_ok());
        assert_eq!(seen.lock().as_deref(), Some("u-3"));
    }

    /// Reports the ignore sentinel alongside a replacement.
    struct IgnoreWith(DynamicObject);

    #[async_trait::async_trait]
    impl SharedControllerHandler<DynamicObject> for IgnoreWith {
        async fn on_change(
            &self,
            _cx: &Context,
            _key: &str,
            _obj: Option<&DynamicObject>,
        ) -> HandlerOutcome<DynamicObject> {
            HandlerOutcome::replace(self.0.clone()).with_error(Ignore)
        }
    }
}
