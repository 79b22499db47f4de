//! Span attribute keys, span names and metric names used across the crate.

pub mod attributes {
    pub const OBJECT_UID: &str = "object.uid";
    pub const OBJECT_NAME: &str = "object.name";
    pub const OBJECT_NAMESPACE: &str = "object.namespace";
    pub const OBJECT_KEY: &str = "object.key";
    pub const CONTROLLER_GVR: &str = "controller.gvr";
    pub const HANDLER_COUNT: &str = "handler.count";
    pub const HANDLER_ID: &str = "handler.id";
    pub const HANDLER_NAME: &str = "handler.name";
}

pub mod spans {
    pub const ON_CHANGE: &str = "SharedHandler.OnChange";
}

pub mod metrics {
    pub const METER_NAME: &str = "shared-controller";
    pub const HANDLER_EXECUTIONS_TOTAL: &str = "controller.handler.executions.total";
    pub const HANDLER_RECONCILE_DURATION: &str = "controller.handler.reconcile.duration";

    pub const LABEL_RESOURCE_TYPE: &str = "resource_type";
    pub const LABEL_HANDLER_NAME: &str = "handler_name";
    pub const LABEL_FAILED: &str = "failed";
}

/// Name of the tracer the dispatcher obtains from the global provider.
pub const TRACER_NAME: &str = "shared-controller";
