//! Publish/subscribe and coordinated request/response between peer
//! processes.
//!
//! Peers connect to a host process that relays JSON envelopes between them.
//! Each peer runs an [`EventService`]: it registers local handlers for named
//! event types, broadcasts events, and asks other peers to serve requests
//! through a four-phase exchange (`request`, `requestAck`, `requestExecute`,
//! `requestResult`) that picks exactly one fulfiller.
//!
//! # Architecture
//!
//! The engine is driven by its embedding event loop. Outbound frames go
//! through a [`Transport`]; inbound frames and connection state changes come
//! back through the `on_*` callbacks on [`EventService`]. Time comes from a
//! [`Clock`] so request timeouts can be tested without sleeping. Hosts that
//! accept peer connections implement [`ChannelHost`].
//!
//! Logging goes through `tracing`; [`telemetry::initialise`] installs a
//! subscriber configured from [`umpe_config::Config`] for processes that do
//! not bring their own.

pub mod clock;
mod dispatch;
pub mod error;
pub mod handler;
pub mod host;
pub mod payload;
mod pending;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::error::{CodecError, RegistryError, RequestError, ServiceError};
pub use self::handler::{Handler, HandlerError, HandlerResult};
pub use self::host::{ChannelHost, ChannelId};
pub use self::payload::DataSerialization;
pub use self::pending::{RequestResult, ResponseCallback};
pub use self::protocol::{ConnectionId, Envelope, Phase, RequestId, UNASSIGNED_CONNECTION};
pub use self::registry::{RegistrationId, Subscription, WILDCARD_EVENT};
pub use self::service::{EmitOptions, EventService, RequestOptions, ServiceSettings};
pub use self::transport::{Transport, TransportError};
