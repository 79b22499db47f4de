//! # Shared Dispatch
//!
//! The entry point the watch/work-queue loop calls once per change notification.
//!
//! ```rust
//! use shared_dispatch::dispatch::{handler_fn, Change, SharedHandler};
//! use shared_dispatch::object::{DynamicObject, ObjectMeta};
//! use shared_dispatch::scope::Scope;
//!
//! # tokio_test::block_on(async {
//! let pods = SharedHandler::<DynamicObject>::new("/v1, Resource=pods");
//! let scope = Scope::new();
//!
//! pods.register(&scope, "label-owner", handler_fn(|_key: &str, obj: Option<&DynamicObject>| {
//!     let Some(obj) = obj else { return Ok(Change::NoChange) };
//!     let mut next = obj.clone();
//!     next.metadata = next.metadata.with_annotation("owner", "team-a");
//!     Ok(Change::Replace(next))
//! }));
//!
//! let pod = DynamicObject::new(ObjectMeta::new("default", "web-0").with_uid("8c1e"));
//! pods.on_change("default/web-0", Some(pod)).await.unwrap();
//! # });
//! ```

pub mod handler;
pub mod shared_handler;

pub use handler::{handler_fn, Change, HandlerFn, HandlerOutcome, SharedControllerHandler};
pub use shared_handler::SharedHandler;
