//! Handler contract for shared dispatch.

use crate::object::Object;
use async_trait::async_trait;
use opentelemetry::Context;
use std::marker::PhantomData;

/// What a handler did to the object it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<O> {
    /// Later handlers keep seeing the current object.
    NoChange,
    /// Later handlers see this object instead, unless it has an empty uid.
    Replace(O),
}

/// Result of one handler invocation.
///
/// The change and the error are independent: a handler that persisted an update and
/// then failed returns both, and later handlers still see the persisted object.
#[derive(Debug)]
pub struct HandlerOutcome<O> {
    pub change: Change<O>,
    pub error: Option<anyhow::Error>,
}

impl<O> HandlerOutcome<O> {
    pub fn no_change() -> Self {
        Self {
            change: Change::NoChange,
            error: None,
        }
    }

    pub fn replace(object: O) -> Self {
        Self {
            change: Change::Replace(object),
            error: None,
        }
    }

    /// Failure without a replacement.
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Self {
            change: Change::NoChange,
            error: Some(error.into()),
        }
    }

    /// Attach `error` while keeping the change.
    pub fn with_error(mut self, error: impl Into<anyhow::Error>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl<O> From<anyhow::Result<Change<O>>> for HandlerOutcome<O> {
    fn from(result: anyhow::Result<Change<O>>) -> Self {
        match result {
            Ok(change) => Self {
                change,
                error: None,
            },
            Err(error) => Self {
                change: Change::NoChange,
                error: Some(error),
            },
        }
    }
}

/// A named reconciliation unit invoked once per change notification.
///
/// `cx` carries the handler's own span; start child spans from it or hand it to
/// clients so their calls join the dispatch trace. `obj` is `None` when the
/// notification has no object (for example after a deletion).
///
/// Return [`crate::error::Ignore`] as the error to report nothing without failing the pass.
#[async_trait]
pub trait SharedControllerHandler<O: Object>: Send + Sync {
    async fn on_change(&self, cx: &Context, key: &str, obj: Option<&O>) -> HandlerOutcome<O>;
}

/// Adapter turning a synchronous closure into a [`SharedControllerHandler`].
///
/// The closure returns either a change or an error; implement the trait directly
/// to return both.
pub struct HandlerFn<O, F> {
    f: F,
    _object: PhantomData<fn(O)>,
}

/// Wrap `f` as a handler.
///
/// ```rust
/// use shared_dispatch::dispatch::{handler_fn, Change};
/// use shared_dispatch::object::DynamicObject;
///
/// let handler = handler_fn(|key: &str, _obj: Option<&DynamicObject>| {
///     tracing::debug!(key, "observed change");
///     Ok(Change::NoChange)
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<O, F>(f: F) -> HandlerFn<O, F>
where
    O: Object,
    F: Fn(&str, Option<&O>) -> anyhow::Result<Change<O>> + Send + Sync,
{
    HandlerFn {
        f,
        _object: PhantomData,
    }
}

#[async_trait]
impl<O, F> SharedControllerHandler<O> for HandlerFn<O, F>
where
    O: Object,
    F: Fn(&str, Option<&O>) -> anyhow::Result<Change<O>> + Send + Sync,
{
    async fn on_change(&self, _cx: &Context, key: &str, obj: Option<&O>) -> HandlerOutcome<O> {
        (self.f)(key, obj).into()
    }
}
