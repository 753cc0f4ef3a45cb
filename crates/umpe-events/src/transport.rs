//! Outbound seam between the engine and the connection layer.
//!
//! The engine never owns a socket. The embedding process supplies a
//! [`Transport`] for outbound text frames and feeds inbound frames and
//! connection state changes back through
//! [`EventService::on_message`](crate::EventService::on_message) and its
//! siblings. Framing, reconnection and binary channels stay on the other side
//! of this trait.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Transport-layer failures.
///
/// I/O errors are wrapped in `Arc` so the error stays cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection is not open.
    #[error("transport is closed")]
    Closed,

    /// Reading or writing the underlying stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The connection layer refused the frame.
    #[error("transport rejected message: {message}")]
    Rejected {
        /// Reason given by the connection layer.
        message: String,
    },
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// Sends serialised envelopes to the host.
pub trait Transport {
    /// Begins establishing the connection.
    ///
    /// Completion is reported asynchronously through
    /// [`EventService::on_open`](crate::EventService::on_open) and the
    /// connection-id handshake. The default does nothing, for transports that
    /// are connected before the engine is constructed.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection cannot be initiated.
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the frame cannot be written.
    fn send(&mut self, message: &str) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        (**self).send(message)
    }
}
