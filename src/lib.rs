#![allow(clippy::doc_markdown)] // Allow technical terms like OpenTelemetry, GVR in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Shared Dispatch
//!
//! In-process change dispatch for controllers.
//!
//! ## Overview
//!
//! A controller watching one resource type usually hosts several independent
//! reconcilers. This crate lets each of them register as a named *shared handler*
//! bound to its own cancellable [`Scope`], and fans every change notification out to
//! all of them in registration order.
//!
//! ## Key Features
//!
//! - **Ordered, scope-bound registry** safe for concurrent registration and removal
//! - **No short-circuiting**: every handler runs once per change, failures are aggregated
//! - **Object threading**: a handler may replace the object seen by later handlers
//! - **Object-carried tracing**: W3C trace context rides in the object's annotations,
//!   so correlation survives watch and queue hand-offs
//! - **Per-handler metrics** through OpenTelemetry instruments
//!
//! ## Module Organization
//!
//! - [`dispatch`] - `SharedHandler` and the handler contract
//! - [`registry`] - scope-bound handler registration
//! - [`propagation`] - trace-context carrier over object annotations
//! - [`error`] - handler, aggregate and ambient errors
//! - [`object`] - the object capability set
//! - [`metrics`] - handler execution metrics sink
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging and telemetry bootstrap
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod object;
pub mod propagation;
pub mod registry;
pub mod scope;

pub use config::{DispatchConfig, TelemetryConfig};
pub use dispatch::{handler_fn, Change, HandlerOutcome, SharedControllerHandler, SharedHandler};
pub use error::{AggregateError, ChangeError, HandlerError, Ignore};
pub use metrics::{HandlerMetrics, OtelHandlerMetrics};
pub use object::{DynamicObject, Object, ObjectMeta};
pub use propagation::{ObjectCarrier, ObjectPropagator};
pub use registry::{HandlerId, HandlerRegistry};
pub use scope::Scope;
