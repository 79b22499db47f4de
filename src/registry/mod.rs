//! # Registry Infrastructure
//!
//! Scope-bound registration of shared handlers.
//!
//! ## Usage
//!
//! ```rust
//! use shared_dispatch::dispatch::{handler_fn, Change};
//! use shared_dispatch::object::DynamicObject;
//! use shared_dispatch::registry::HandlerRegistry;
//! use shared_dispatch::scope::Scope;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = HandlerRegistry::<DynamicObject>::new();
//! let scope = Scope::new();
//!
//! registry.register(&scope, "audit", handler_fn(|_key: &str, _obj: Option<&DynamicObject>| {
//!     Ok(Change::NoChange)
//! }));
//! assert_eq!(registry.handler_names(), vec!["audit"]);
//!
//! // Cancelling the scope removes the registration asynchronously.
//! scope.cancel();
//! # }
//! ```

pub mod handler_registry;

pub use handler_registry::{HandlerEntry, HandlerId, HandlerRegistry};
