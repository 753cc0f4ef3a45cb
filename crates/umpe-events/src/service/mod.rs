//! The protocol engine.
//!
//! [`EventService`] owns one peer's view of the protocol: its connection id,
//! its local handlers and its outstanding requests. It never touches a socket
//! directly. The embedding event loop forwards connection events through
//! [`EventService::on_open`], [`EventService::on_message`],
//! [`EventService::on_close`] and [`EventService::on_error`], and calls
//! [`EventService::sweep`] every turn so stale requests time out.
//!
//! Requests run in four phases. The requester broadcasts `request`; every
//! peer with handlers answers `requestAck`; the first acknowledgment wins and
//! receives `requestExecute` with the original payload; the fulfiller replies
//! `requestResult` with one entry per handler. Requests for an event type the
//! local peer can serve never touch the wire.

mod incoming;

use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use umpe_config::Config;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{Wildcard, collect_local, notify_local};
use crate::error::{CodecError, RegistryError, RequestError, ServiceError};
use crate::handler::Handler;
use crate::payload::normalise;
use crate::pending::{PendingRequest, PendingTable, RequestResult, ResponseCallback, millis};
use crate::protocol::{
    ConnectionId, Envelope, Phase, UNASSIGNED_CONNECTION, decode, decode_handshake, encode,
};
use crate::registry::{HandlerRegistry, Subscription};
use crate::transport::Transport;

pub(crate) const SERVICE_TARGET: &str = "umpe::service";
pub(crate) const CODEC_TARGET: &str = "umpe::codec";

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    request_timeout: Duration,
}

impl ServiceSettings {
    /// Creates settings with the given default request budget.
    #[must_use]
    pub const fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Extracts the engine settings from a loaded configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.request_timeout())
    }

    /// Discovery budget applied when a request does not set its own.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::new(umpe_config::default_request_timeout())
    }
}

/// Options for [`EventService::emit_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitOptions {
    /// Connection the event is addressed to; `None` broadcasts it.
    pub target: Option<ConnectionId>,
    /// Serialisation metadata forwarded with the payload.
    pub data_infos: Option<Value>,
}

/// Options for [`EventService::request_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Discovery budget; the engine default applies when `None`.
    pub timeout: Option<Duration>,
    /// Serialisation metadata forwarded with the payload.
    pub data_infos: Option<Value>,
}

/// One peer's protocol engine.
///
/// The engine is single-threaded: handlers, callbacks and subscriptions share
/// its registry through `Rc`, so it is neither `Send` nor `Sync`. Several
/// engines may coexist in one process, one per connection.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use serde_json::json;
/// use umpe_events::{EventService, Handler, Transport, TransportError};
///
/// struct Outbox(Vec<String>);
///
/// impl Transport for Outbox {
///     fn send(&mut self, message: &str) -> Result<(), TransportError> {
///         self.0.push(message.to_owned());
///         Ok(())
///     }
/// }
///
/// let mut service = EventService::new(Outbox(Vec::new()));
/// service.on_message("3").expect("handshake");
/// service
///     .on("ping", Handler::new(|_, _| Ok(json!("pong"))))
///     .expect("register");
///
/// let answer = Rc::new(RefCell::new(None));
/// let sink = Rc::clone(&answer);
/// service.request("ping", json!("hi"), move |outcome| {
///     *sink.borrow_mut() = Some(outcome);
/// });
///
/// assert_eq!(*answer.borrow(), Some(Ok(json!(["pong"]))));
/// assert!(service.transport().0.is_empty());
/// ```
pub struct EventService<T: Transport> {
    transport: T,
    registry: Rc<RefCell<HandlerRegistry>>,
    pending: PendingTable,
    clock: Box<dyn Clock>,
    settings: ServiceSettings,
    connection_id: ConnectionId,
    connected: bool,
}

impl<T: Transport> EventService<T> {
    /// Creates a disconnected engine using the wall clock and default
    /// settings.
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, ServiceSettings::default(), Box::new(SystemClock))
    }

    /// Creates a disconnected engine with explicit settings and time source.
    pub fn with_clock(transport: T, settings: ServiceSettings, clock: Box<dyn Clock>) -> Self {
        Self {
            transport,
            registry: Rc::new(RefCell::new(HandlerRegistry::new())),
            pending: PendingTable::default(),
            clock,
            settings,
            connection_id: UNASSIGNED_CONNECTION,
            connected: false,
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Asks the transport to connect.
    ///
    /// The engine becomes connected once the host's handshake arrives through
    /// [`EventService::on_message`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] when the transport cannot start
    /// connecting.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        self.transport.open()?;
        Ok(())
    }

    /// Forgets the connection and abandons every pending request.
    ///
    /// Waiting callbacks receive [`RequestError::ConnectionClosed`]. Local
    /// handlers stay registered.
    pub fn close(&mut self) {
        if self.connected {
            debug!(
                target: SERVICE_TARGET,
                connection_id = self.connection_id,
                "connection closed"
            );
        }
        self.connected = false;
        self.connection_id = UNASSIGNED_CONNECTION;
        self.clear();
    }

    /// Abandons every pending request without touching the connection.
    ///
    /// Waiting callbacks receive [`RequestError::ConnectionClosed`].
    pub fn clear(&mut self) {
        for entry in self.pending.drain() {
            let error = RequestError::ConnectionClosed {
                event_type: entry.event_type().to_owned(),
            };
            entry.reject(&error);
        }
    }

    /// Returns `true` once the host has assigned a connection id.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Connection id assigned by the host, or
    /// [`UNASSIGNED_CONNECTION`](crate::UNASSIGNED_CONNECTION).
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    // -----------------------------------------------------------------------
    // Local handlers
    // -----------------------------------------------------------------------

    /// Registers a handler for an event type.
    ///
    /// Handlers registered under [`WILDCARD_EVENT`](crate::WILDCARD_EVENT)
    /// observe every broadcast event but never serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] if the handler is already
    /// registered for `event_type`.
    pub fn on(
        &mut self,
        event_type: &str,
        handler: Handler,
    ) -> Result<Subscription, RegistryError> {
        let id = self.registry.borrow_mut().register(event_type, handler)?;
        Ok(Subscription::new(
            Rc::downgrade(&self.registry),
            event_type.to_owned(),
            id,
        ))
    }

    /// Removes a handler, returning `true` when it was registered.
    pub fn off(&mut self, event_type: &str, handler: &Handler) -> bool {
        self.registry.borrow_mut().remove(event_type, handler)
    }

    /// Returns `true` when a local handler serves `event_type`.
    ///
    /// Wildcard handlers do not count.
    #[must_use]
    pub fn has_handlers(&self, event_type: &str) -> bool {
        self.registry.borrow().has_handlers(event_type)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Broadcasts an event to local handlers and to every peer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the event cannot be encoded or sent.
    /// Local handlers have run by then.
    pub fn emit(&mut self, event_type: &str, payload: Value) -> Result<(), ServiceError> {
        self.emit_with(event_type, payload, EmitOptions::default())
    }

    /// Emits an event with an explicit target or payload metadata.
    ///
    /// Local handlers run whatever the target.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the event cannot be encoded or sent.
    pub fn emit_with(
        &mut self,
        event_type: &str,
        payload: Value,
        options: EmitOptions,
    ) -> Result<(), ServiceError> {
        let data = normalise(payload);
        notify_local(&self.registry, event_type, &data, Wildcard::Notify);

        let envelope = Envelope::new(Phase::Event, self.connection_id)
            .with_event_type(event_type)
            .with_target(options.target)
            .with_data(data)
            .with_data_infos(options.data_infos);
        self.send(&envelope)
    }

    /// Sends a diagnostic message for the host to log.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the message cannot be sent.
    pub fn log(&mut self, message: &str) -> Result<(), ServiceError> {
        let envelope =
            Envelope::new(Phase::Log, self.connection_id).with_data(Value::from(message));
        self.send(&envelope)
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Requests the result of the handlers for `event_type`.
    ///
    /// See [`EventService::request_with`].
    pub fn request<F>(&mut self, event_type: &str, payload: Value, callback: F)
    where
        F: FnOnce(RequestResult) + 'static,
    {
        self.request_with(event_type, payload, RequestOptions::default(), callback);
    }

    /// Requests the result of the handlers for `event_type`.
    ///
    /// The callback runs exactly once:
    ///
    /// - when a request for `event_type` is already in flight, it joins that
    ///   request and shares its outcome;
    /// - when local handlers exist, it runs synchronously with their results
    ///   and nothing is sent;
    /// - otherwise a `request` frame goes out and the callback waits for a
    ///   result, a cancellation, the timeout or the connection closing.
    pub fn request_with<F>(
        &mut self,
        event_type: &str,
        payload: Value,
        options: RequestOptions,
        callback: F,
    ) where
        F: FnOnce(RequestResult) + 'static,
    {
        let data = normalise(payload);
        let Err(waiter) = self.pending.attach(event_type, Box::new(callback)) else {
            debug!(target: SERVICE_TARGET, event_type, "joined pending request");
            return;
        };

        if self.has_handlers(event_type) {
            let outcomes = notify_local(&self.registry, event_type, &data, Wildcard::Skip);
            waiter(collect_local(event_type, outcomes));
            return;
        }

        self.send_request(event_type, data, options, waiter);
    }

    fn send_request(
        &mut self,
        event_type: &str,
        data: Value,
        options: RequestOptions,
        callback: ResponseCallback,
    ) {
        let id = self.pending.next_id();
        let started_at = self.clock.now();
        let envelope = Envelope::new(Phase::Request, self.connection_id)
            .with_event_type(event_type)
            .with_request_id(id)
            .with_data(data.clone())
            .with_data_infos(options.data_infos.clone());

        if let Err(error) = self.send(&envelope) {
            warn!(
                target: SERVICE_TARGET,
                event_type,
                request_id = id,
                error = %error,
                "failed to send request"
            );
            callback(Err(RequestError::Transport {
                event_type: event_type.to_owned(),
                message: error.to_string(),
            }));
            return;
        }

        let timeout = options.timeout.unwrap_or(self.settings.request_timeout);
        self.pending.insert(
            PendingRequest::new(event_type, id, callback, started_at, timeout)
                .with_payload(data, options.data_infos),
        );
    }

    /// Returns `true` while a request for `event_type` awaits its outcome.
    #[must_use]
    pub fn is_request_pending(&self, event_type: &str) -> bool {
        self.pending.contains(event_type)
    }

    /// Cancels the pending request for `event_type`.
    ///
    /// Every waiting callback receives [`RequestError::Cancelled`] with
    /// `message`, or `"Request <event_type> canceled"` when none is given.
    /// Nothing is sent to the fulfiller. Returns `false` when no request was
    /// pending.
    pub fn cancel_request(&mut self, event_type: &str, message: Option<&str>) -> bool {
        let Some(entry) = self.pending.remove(event_type) else {
            return false;
        };
        let error = RequestError::Cancelled {
            event_type: event_type.to_owned(),
            message: message.map_or_else(
                || format!("Request {event_type} canceled"),
                str::to_owned,
            ),
        };
        entry.reject(&error);
        true
    }

    /// Number of requests awaiting their outcome.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Times out unacknowledged requests that exceeded their budget.
    ///
    /// Acknowledged requests are left alone: once a fulfiller has taken the
    /// request only its result, a cancellation or the connection closing ends
    /// it. Does nothing while disconnected. Returns the number of requests
    /// that timed out.
    pub fn sweep(&mut self) -> usize {
        if !self.connected {
            return 0;
        }

        let now = self.clock.now();
        let expired = self.pending.take_expired(now);
        let count = expired.len();
        for entry in expired {
            let error = entry.timeout_error(now);
            warn!(
                target: SERVICE_TARGET,
                event_type = entry.event_type(),
                request_id = entry.id(),
                elapsed_ms = millis(entry.elapsed(now)),
                "request timed out"
            );
            entry.reject(&error);
        }
        count
    }

    // -----------------------------------------------------------------------
    // Driver callbacks
    // -----------------------------------------------------------------------

    /// Records that the transport opened. The engine stays disconnected until
    /// the handshake arrives.
    pub fn on_open(&mut self) {
        debug!(target: SERVICE_TARGET, "transport open, awaiting connection id");
    }

    /// Handles the transport closing.
    pub fn on_close(&mut self) {
        self.close();
    }

    /// Handles a transport failure by closing the connection.
    pub fn on_error(&mut self, error: &dyn Error) {
        warn!(target: SERVICE_TARGET, error = %error, "transport failed");
        self.close();
    }

    /// Handles one inbound text frame.
    ///
    /// Before the connection id is known the frame is the host's handshake.
    /// Afterwards it is an envelope. Malformed frames are logged and
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when a reply to the frame cannot be sent.
    pub fn on_message(&mut self, raw: &str) -> Result<(), ServiceError> {
        if !self.connected {
            self.accept_handshake(raw);
            return Ok(());
        }

        match decode(raw, self.connection_id) {
            Ok(Some(envelope)) => self.handle(envelope),
            Ok(None) => Ok(()),
            Err(error) => {
                log_malformed(&error);
                Ok(())
            }
        }
    }

    fn accept_handshake(&mut self, raw: &str) {
        match decode_handshake(raw) {
            Ok(connection_id) => {
                self.connection_id = connection_id;
                self.connected = true;
                info!(target: SERVICE_TARGET, connection_id, "connected to host");
            }
            Err(error) => log_malformed(&error),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Borrows the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrows the transport.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> ServiceSettings {
        self.settings
    }

    fn send(&mut self, envelope: &Envelope) -> Result<(), ServiceError> {
        let text = encode(envelope)?;
        self.transport.send(&text)?;
        Ok(())
    }
}

fn log_malformed(error: &CodecError) {
    warn!(target: CODEC_TARGET, error = %error, "dropping malformed message");
}

impl<T: Transport> fmt::Debug for EventService<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EventService")
            .field("connection_id", &self.connection_id)
            .field("connected", &self.connected)
            .field("settings", &self.settings)
            .field("handlers", &self.registry.borrow().len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
