//! Several engines wired together through a [`LoopbackHost`].

mod host;

use std::time::Duration;

use serde_json::Value;

pub(crate) use self::host::LoopbackHost;
use crate::clock::ManualClock;
use crate::host::{ChannelHost, ChannelId};
use crate::protocol::ConnectionId;
use crate::service::{EventService, ServiceSettings};
use crate::transport::{Transport, TransportError};

/// Transport that parks frames until the network routes them.
#[derive(Debug, Default)]
pub(crate) struct RelayTransport {
    outbox: Vec<String>,
}

impl Transport for RelayTransport {
    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.outbox.push(message.to_owned());
        Ok(())
    }
}

/// A frame the host relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Routed {
    pub(crate) from: ConnectionId,
    pub(crate) phase: String,
    pub(crate) target: Option<ConnectionId>,
}

struct Peer {
    name: String,
    connection: ConnectionId,
    service: EventService<RelayTransport>,
}

/// Peers connected through one host, sharing a manual clock.
pub(crate) struct Network {
    host: LoopbackHost,
    channel: ChannelId,
    clock: ManualClock,
    peers: Vec<Peer>,
    wire: Vec<Routed>,
    dropped_phases: Vec<String>,
}

impl Network {
    pub(crate) fn new() -> Self {
        let mut host = LoopbackHost::default();
        host.start().expect("host starts");
        let channel = host.register_channel("event").expect("channel registers");
        Self {
            host,
            channel,
            clock: ManualClock::new(),
            peers: Vec::new(),
            wire: Vec::new(),
            dropped_phases: Vec::new(),
        }
    }

    /// Connects a peer and delivers its handshake.
    pub(crate) fn join(&mut self, name: &str) {
        let connection = self.host.connect(self.channel).expect("peer connects");
        let mut service = EventService::with_clock(
            RelayTransport::default(),
            ServiceSettings::default(),
            Box::new(self.clock.clone()),
        );
        service.on_open();
        self.peers.push(Peer {
            name: name.to_owned(),
            connection,
            service,
        });
        self.pump();
    }

    pub(crate) fn peer(&mut self, name: &str) -> &mut EventService<RelayTransport> {
        self.peers
            .iter_mut()
            .find(|peer| peer.name == name)
            .map(|peer| &mut peer.service)
            .unwrap_or_else(|| panic!("no peer named {name}"))
    }

    /// Makes the host discard every frame of the given phase.
    pub(crate) fn drop_phase(&mut self, phase: &str) {
        self.dropped_phases.push(phase.to_owned());
    }

    /// Routes and delivers frames until every peer is idle.
    pub(crate) fn pump(&mut self) {
        loop {
            for peer in &mut self.peers {
                let outbox = &mut peer.service.transport_mut().outbox;
                let frames: Vec<String> = outbox.drain(..).collect();
                for frame in frames {
                    let routed = route(
                        &mut self.host,
                        self.channel,
                        &self.dropped_phases,
                        peer.connection,
                        &frame,
                    );
                    self.wire.push(routed);
                }
            }

            let mut delivered = false;
            for peer in &mut self.peers {
                while let Some(frame) = self.host.take(peer.connection) {
                    peer.service
                        .on_message(&frame)
                        .expect("peer handles frame");
                    delivered = true;
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Moves time forward and lets every peer sweep.
    pub(crate) fn advance(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        self.peers
            .iter_mut()
            .map(|peer| peer.service.sweep())
            .sum()
    }

    pub(crate) fn connection_of(&self, name: &str) -> ConnectionId {
        self.peers
            .iter()
            .find(|peer| peer.name == name)
            .map(|peer| peer.connection)
            .unwrap_or_else(|| panic!("no peer named {name}"))
    }

    pub(crate) fn wire(&self) -> &[Routed] {
        &self.wire
    }

    pub(crate) fn clear_wire(&mut self) {
        self.wire.clear();
    }
}

fn route(
    host: &mut LoopbackHost,
    channel: ChannelId,
    dropped_phases: &[String],
    from: ConnectionId,
    frame: &str,
) -> Routed {
    let envelope: Value = serde_json::from_str(frame).expect("engines send JSON");
    let phase = envelope
        .get("req")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let target = envelope.get("targetId").and_then(Value::as_i64);

    if !dropped_phases.contains(&phase) {
        match target {
            Some(connection) => host.send(connection, frame),
            None => host.broadcast(channel, frame),
        }
        .expect("host relays frame");
    }

    Routed {
        from,
        phase,
        target,
    }
}
