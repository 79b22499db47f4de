//! # Dispatch Errors
//!
//! Error taxonomy for a single change dispatch plus the ambient errors raised
//! while bootstrapping configuration and telemetry.
//!
//! A dispatch pass never stops on a handler failure. Every failure is wrapped in a
//! [`HandlerError`] carrying the handler's name, collected into an [`ErrorList`], and
//! folded once the pass is over:
//!
//! | failures | result                              |
//! |----------|-------------------------------------|
//! | 0        | `Ok(())`                            |
//! | 1        | `Err(ChangeError::Handler(..))`     |
//! | 2+       | `Err(ChangeError::Aggregate(..))`   |
//!
//! Handlers that have nothing to report can return [`Ignore`] (directly or anywhere in an
//! `anyhow` context chain). Ignored results are metered but never aggregated.

use std::fmt;

/// Sentinel a handler returns to signal "nothing to report".
///
/// ```rust
/// use shared_dispatch::error::{is_ignore, Ignore};
///
/// let err = anyhow::Error::new(Ignore).context("object not owned by this controller");
/// assert!(is_ignore(&err));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ignore handler error")]
pub struct Ignore;

/// Whether `err` is, or wraps, the [`Ignore`] sentinel.
pub fn is_ignore(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Ignore>())
}

/// One handler's failure, tagged with the handler name.
#[derive(Debug)]
pub struct HandlerError {
    handler_name: String,
    cause: anyhow::Error,
}

impl HandlerError {
    pub fn new(handler_name: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            handler_name: handler_name.into(),
            cause,
        }
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The error the handler returned.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    pub fn into_cause(self) -> anyhow::Error {
        self.cause
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler {}: {}", self.handler_name, self.cause)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

/// Two or more handler failures from the same pass, in invocation order.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<HandlerError>,
}

// Never empty: holds at least two failures.
#[allow(clippy::len_without_is_empty)]
impl AggregateError {
    /// The first failure of the pass.
    pub fn cause(&self) -> &HandlerError {
        // constructed only by ErrorList::into_result with len >= 2
        &self.errors[0]
    }

    pub fn errors(&self) -> &[HandlerError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_errors(self) -> Vec<HandlerError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Error returned by [`SharedHandler::on_change`](crate::dispatch::SharedHandler::on_change).
#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error(transparent)]
    Handler(HandlerError),
    #[error(transparent)]
    Aggregate(AggregateError),
}

impl ChangeError {
    /// The primary failure: the only one, or the first of several.
    pub fn cause(&self) -> &HandlerError {
        match self {
            ChangeError::Handler(err) => err,
            ChangeError::Aggregate(agg) => agg.cause(),
        }
    }

    /// Every failure of the pass, in invocation order.
    pub fn handler_errors(&self) -> &[HandlerError] {
        match self {
            ChangeError::Handler(err) => std::slice::from_ref(err),
            ChangeError::Aggregate(agg) => agg.errors(),
        }
    }
}

/// Accumulates handler failures during one dispatch pass.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<HandlerError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: HandlerError) {
        self.errors.push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold the collected failures into the dispatch result.
    pub fn into_result(mut self) -> Result<(), ChangeError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => match self.errors.pop() {
                Some(err) => Err(ChangeError::Handler(err)),
                None => Ok(()),
            },
            _ => Err(ChangeError::Aggregate(AggregateError {
                errors: self.errors,
            })),
        }
    }
}

/// Raised when the object's metadata cannot be read or written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("object metadata unavailable: {reason}")]
pub struct AccessorError {
    pub reason: String,
}

impl AccessorError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Telemetry exporter construction failures.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build span exporter: {0}")]
    SpanExporter(String),
    #[error("failed to build metric exporter: {0}")]
    MetricExporter(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn failure(name: &str, msg: &str) -> HandlerError {
        HandlerError::new(name, anyhow::anyhow!(msg.to_string()))
    }

    #[test]
    fn test_empty_list_is_ok() {
        assert!(ErrorList::new().into_result().is_ok());
    }

    #[test]
    fn test_single_failure_is_returned_as_is() {
        let mut errs = ErrorList::new();
        errs.push(failure("h1", "boom"));

        let err = errs.into_result().unwrap_err();
        assert!(matches!(err, ChangeError::Handler(_)));
        assert_eq!(err.to_string(), "handler h1: boom");
        assert_eq!(err.cause().handler_name(), "h1");
        assert_eq!(err.cause().cause().to_string(), "boom");
    }

    #[test]
    fn test_multiple_failures_are_aggregated_in_order() {
        let mut errs = ErrorList::new();
        errs.push(failure("h1", "a"));
        errs.push(failure("h2", "b"));

        let err = errs.into_result().unwrap_err();
        assert_eq!(err.to_string(), "handler h1: a, handler h2: b");
        assert_eq!(err.cause().handler_name(), "h1");
        assert_eq!(err.cause().cause().to_string(), "a");
        assert_eq!(err.handler_errors().len(), 2);
    }

    #[test]
    fn test_source_chain_reaches_handler_cause() {
        use std::error::Error as _;

        let err = failure("h1", "boom");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".into()));
    }

    #[test]
    fn test_ignore_detected_through_context() {
        assert!(is_ignore(&anyhow::Error::new(Ignore)));
        assert!(is_ignore(&anyhow::Error::new(Ignore).context("wrapped")));
        assert!(!is_ignore(&anyhow::anyhow!("ignore handler error")));
    }

    proptest! {
        #[test]
        fn prop_fold_shape_tracks_failure_count(count in 0usize..8) {
            let mut errs = ErrorList::new();
            for i in 0..count {
                errs.push(failure(&format!("h{i}"), "x"));
            }

            match (count, errs.into_result()) {
                (0, Ok(())) => {}
                (1, Err(ChangeError::Handler(_))) => {}
                (n, Err(ChangeError::Aggregate(agg))) if n >= 2 => {
                    prop_assert_eq!(agg.len(), n);
                    prop_assert_eq!(agg.to_string().matches("handler h").count(), n);
                    prop_assert_eq!(agg.cause().handler_name(), "h0");
                }
                (n, other) => prop_assert!(false, "unexpected fold for {}: {:?}", n, other),
            }
        }
    }
}
