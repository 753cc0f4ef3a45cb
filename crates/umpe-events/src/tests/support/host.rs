//! In-memory channel host.

use std::collections::VecDeque;

use thiserror::Error;

use crate::host::{ChannelHost, ChannelId};
use crate::protocol::ConnectionId;

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error("host is not running")]
    NotRunning,
    #[error("no connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("no channel {0}")]
    UnknownChannel(ChannelId),
    #[error("channel table is full")]
    TooManyChannels,
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    channel: ChannelId,
    inbox: VecDeque<String>,
}

/// Host that queues frames per connection until the test delivers them.
#[derive(Debug, Default)]
pub(crate) struct LoopbackHost {
    running: bool,
    channels: Vec<String>,
    connections: Vec<Connection>,
    last_connection: ConnectionId,
}

impl LoopbackHost {
    /// Accepts a peer on `channel` and queues its connection-id handshake.
    pub(crate) fn connect(&mut self, channel: ChannelId) -> Result<ConnectionId, HostError> {
        if !self.running {
            return Err(HostError::NotRunning);
        }
        if !self.has_channel(channel) {
            return Err(HostError::UnknownChannel(channel));
        }
        self.last_connection += 1;
        let id = self.last_connection;
        self.connections.push(Connection {
            id,
            channel,
            inbox: VecDeque::from([id.to_string()]),
        });
        Ok(id)
    }

    /// Pops the next frame queued for a connection.
    pub(crate) fn take(&mut self, connection: ConnectionId) -> Option<String> {
        self.connections
            .iter_mut()
            .find(|candidate| candidate.id == connection)
            .and_then(|found| found.inbox.pop_front())
    }

    fn has_channel(&self, channel: ChannelId) -> bool {
        usize::try_from(channel).is_ok_and(|index| index < self.channels.len())
    }
}

impl ChannelHost for LoopbackHost {
    type Error = HostError;

    fn start(&mut self) -> Result<(), HostError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.connections.clear();
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn register_channel(&mut self, name: &str) -> Result<ChannelId, HostError> {
        let index = match self.channels.iter().position(|existing| existing == name) {
            Some(index) => index,
            None => {
                self.channels.push(name.to_owned());
                self.channels.len() - 1
            }
        };
        ChannelId::try_from(index).map_err(|_| HostError::TooManyChannels)
    }

    fn send(&mut self, connection: ConnectionId, message: &str) -> Result<(), HostError> {
        let target = self
            .connections
            .iter_mut()
            .find(|candidate| candidate.id == connection)
            .ok_or(HostError::UnknownConnection(connection))?;
        target.inbox.push_back(message.to_owned());
        Ok(())
    }

    fn broadcast(&mut self, channel: ChannelId, message: &str) -> Result<(), HostError> {
        if !self.has_channel(channel) {
            return Err(HostError::UnknownChannel(channel));
        }
        for connection in self
            .connections
            .iter_mut()
            .filter(|candidate| candidate.channel == channel)
        {
            connection.inbox.push_back(message.to_owned());
        }
        Ok(())
    }
}

#[test]
fn host_assigns_increasing_connection_ids() {
    let mut host = LoopbackHost::default();
    host.start().expect("start");
    let channel = host.register_channel("event").expect("channel");

    let first = host.connect(channel).expect("first");
    let second = host.connect(channel).expect("second");

    assert_eq!((first, second), (1, 2));
    assert_eq!(host.take(first).as_deref(), Some("1"));
    assert_eq!(host.register_channel("event").expect("same channel"), channel);
}

#[test]
fn stopped_host_refuses_connections() {
    let mut host = LoopbackHost::default();
    host.start().expect("start");
    let channel = host.register_channel("event").expect("channel");
    host.stop();

    assert!(!host.is_running());
    assert!(matches!(host.connect(channel), Err(HostError::NotRunning)));
    assert!(matches!(
        host.send(1, "frame"),
        Err(HostError::UnknownConnection(1))
    ));
}
