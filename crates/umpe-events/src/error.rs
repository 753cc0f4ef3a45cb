//! Error types raised by the event service.
//!
//! Errors are split by concern: registry misuse is reported synchronously to
//! the caller, codec failures are logged and the message dropped, and request
//! failures are delivered to every callback waiting on the request. Request
//! errors are `Clone` because a coalesced request fans the same outcome out to
//! several waiters.

use thiserror::Error;

use crate::handler::HandlerError;
use crate::transport::TransportError;

/// Errors raised while mutating the handler registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The same handler instance is already registered for the event type.
    #[error("cannot add existing event handler: {event_type}")]
    DuplicateHandler {
        /// Event type the handler was registered for.
        event_type: String,
    },
}

/// Errors raised while decoding an inbound message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message is not a JSON object of the expected shape.
    #[error("message is not a valid envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// A required envelope field is absent.
    #[error("message does not contain `{field}`")]
    MissingField {
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// The phase tag is not one the protocol defines.
    #[error("message has unknown phase tag `{tag}`")]
    UnknownPhase {
        /// Tag as received.
        tag: String,
    },

    /// The connection handshake did not carry a connection id.
    #[error("handshake `{raw}` is not a connection id")]
    InvalidHandshake {
        /// Handshake text as received.
        raw: String,
    },
}

/// Reasons a request resolves with an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request was cancelled by the caller.
    #[error("{message}")]
    Cancelled {
        /// Event type of the cancelled request.
        event_type: String,
        /// Cancellation message supplied by the caller.
        message: String,
    },

    /// No peer acknowledged the request within its budget.
    #[error("request {event_type} timed out after {elapsed_ms}ms (budget {timeout_ms}ms)")]
    TimedOut {
        /// Event type of the expired request.
        event_type: String,
        /// Time spent waiting for an acknowledgment.
        elapsed_ms: u64,
        /// Configured discovery budget.
        timeout_ms: u64,
    },

    /// A local handler failed while serving the request.
    #[error("handler for {event_type} failed: {source}")]
    HandlerFailed {
        /// Event type whose handler failed.
        event_type: String,
        /// Failure reported by the handler.
        #[source]
        source: HandlerError,
    },

    /// The request could not be written to the transport.
    #[error("request {event_type} could not be sent: {message}")]
    Transport {
        /// Event type of the failed request.
        event_type: String,
        /// Transport failure description.
        message: String,
    },

    /// The connection closed while the request was outstanding.
    #[error("request {event_type} abandoned because the connection closed")]
    ConnectionClosed {
        /// Event type of the abandoned request.
        event_type: String,
    },
}

impl RequestError {
    /// Event type of the request that failed.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Cancelled { event_type, .. }
            | Self::TimedOut { event_type, .. }
            | Self::HandlerFailed { event_type, .. }
            | Self::Transport { event_type, .. }
            | Self::ConnectionClosed { event_type } => event_type,
        }
    }
}

/// Errors surfaced synchronously by [`EventService`](crate::EventService)
/// operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Handler registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The transport rejected an outbound message.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outbound envelope could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
