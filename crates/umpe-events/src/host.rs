//! Interface for host implementations.
//!
//! The host accepts peer connections, assigns their connection ids and
//! relays text frames on named channels. [`EventService`](crate::EventService)
//! never calls this trait: an engine sees the host only as the far end of its
//! [`Transport`](crate::Transport). The trait is what a host process, or an
//! in-memory relay in tests, implements so that engines have something to
//! connect to. Its dispatcher and socket server stay behind it.

use std::error::Error;

use crate::protocol::ConnectionId;

/// Identifier of a channel registered with the host.
pub type ChannelId = u32;

/// Channel service run by the host process.
pub trait ChannelHost {
    /// Failure type reported by the host.
    type Error: Error + 'static;

    /// Starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the service cannot be started.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Stops the service and drops every connection.
    fn stop(&mut self);

    /// Returns `true` while the service accepts connections.
    fn is_running(&self) -> bool;

    /// Registers a channel by name, returning its id.
    ///
    /// Registering an existing name returns the id it already has.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the channel cannot be registered.
    fn register_channel(&mut self, name: &str) -> Result<ChannelId, Self::Error>;

    /// Sends a frame to one connection.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the connection is unknown or the frame
    /// cannot be delivered.
    fn send(&mut self, connection: ConnectionId, message: &str) -> Result<(), Self::Error>;

    /// Sends a frame to every connection on a channel.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the channel is unknown.
    fn broadcast(&mut self, channel: ChannelId, message: &str) -> Result<(), Self::Error>;
}
