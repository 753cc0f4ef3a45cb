//! Event handlers and their outcomes.
//!
//! A handler receives the event type and the (normalised) payload and returns
//! a tagged outcome. The value is discarded for broadcast events and
//! collected for requests; an `Err` marks a handler failure without relying
//! on unwinding.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<Value, HandlerError>;

type HandlerFn = dyn Fn(&str, &Value) -> HandlerResult;

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a failure with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Shared, identity-carrying handler function.
///
/// Cloning a handler keeps its identity: the registry treats clones as the
/// same handler, which is what duplicate detection and removal compare.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use umpe_events::Handler;
///
/// let pong = Handler::new(|_event_type, _payload| Ok(json!("pong")));
/// assert!(pong.same_as(&pong.clone()));
/// ```
#[derive(Clone)]
pub struct Handler {
    inner: Rc<HandlerFn>,
}

impl Handler {
    /// Wraps a function returning a value or a failure.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> HandlerResult + 'static,
    {
        Self {
            inner: Rc::new(handler),
        }
    }

    /// Wraps a function that only observes events.
    ///
    /// The handler contributes `null` when it serves a request.
    pub fn listener<F>(listener: F) -> Self
    where
        F: Fn(&str, &Value) + 'static,
    {
        Self::new(move |event_type, payload| {
            listener(event_type, payload);
            Ok(Value::Null)
        })
    }

    /// Returns `true` when both handles refer to the same handler.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn invoke(&self, event_type: &str, payload: &Value) -> HandlerResult {
        (self.inner)(event_type, payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Handler")
            .field("address", &Rc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}
