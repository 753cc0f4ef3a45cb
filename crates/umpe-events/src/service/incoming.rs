//! Handling of envelopes received from other peers.

use tracing::{debug, info, warn};

use super::{EventService, SERVICE_TARGET};
use crate::dispatch::{Wildcard, encode_remote, notify_local};
use crate::error::{RequestError, ServiceError};
use crate::pending::millis;
use crate::protocol::{Envelope, Phase, RequestId};
use crate::transport::Transport;

impl<T: Transport> EventService<T> {
    pub(super) fn handle(&mut self, envelope: Envelope) -> Result<(), ServiceError> {
        match envelope.phase() {
            Phase::Request => self.offer(&envelope),
            Phase::Acknowledge => self.execute_acknowledged(&envelope),
            Phase::Execute => self.fulfil(envelope),
            Phase::Result => {
                self.complete(envelope);
                Ok(())
            }
            Phase::Event => {
                let event_type = envelope.event_type().unwrap_or_default();
                notify_local(&self.registry, event_type, envelope.data(), Wildcard::Notify);
                Ok(())
            }
            Phase::Log => {
                info!(
                    target: SERVICE_TARGET,
                    sender_id = envelope.sender_id(),
                    message = %envelope.data(),
                    "peer log"
                );
                Ok(())
            }
        }
    }

    /// Acknowledges a request this peer can serve.
    fn offer(&mut self, request: &Envelope) -> Result<(), ServiceError> {
        let event_type = request.event_type().unwrap_or_default();
        if !self.has_handlers(event_type) {
            return Ok(());
        }

        let ack = Envelope::new(Phase::Acknowledge, self.connection_id)
            .with_event_type(event_type)
            .with_target(Some(request.sender_id()))
            .with_request_id(request.request_id().unwrap_or_default());
        self.send(&ack)
    }

    /// Sends the stored payload to the first peer that acknowledged.
    fn execute_acknowledged(&mut self, ack: &Envelope) -> Result<(), ServiceError> {
        let event_type = ack.event_type().unwrap_or_default();
        let id = ack.request_id().unwrap_or_default();
        let now = self.clock.now();
        let connection_id = self.connection_id;

        let Some(entry) = self.pending.matching_mut(event_type, id) else {
            debug!(
                target: SERVICE_TARGET,
                event_type,
                request_id = id,
                "ignoring acknowledgment for unknown request"
            );
            return Ok(());
        };
        if entry.is_acknowledged() {
            debug!(
                target: SERVICE_TARGET,
                event_type,
                request_id = id,
                sender_id = ack.sender_id(),
                "request already taken by another peer"
            );
            return Ok(());
        }

        entry.acknowledge(now);
        let execute = Envelope::new(Phase::Execute, connection_id)
            .with_event_type(event_type)
            .with_target(Some(ack.sender_id()))
            .with_request_id(id)
            .with_data(entry.data().clone())
            .with_data_infos(entry.data_infos().cloned());

        if let Err(error) = self.send(&execute) {
            self.abandon(event_type, id, &error);
            return Err(error);
        }
        Ok(())
    }

    fn abandon(&mut self, event_type: &str, id: RequestId, error: &ServiceError) {
        warn!(
            target: SERVICE_TARGET,
            event_type,
            request_id = id,
            error = %error,
            "failed to send execution"
        );
        if let Some(entry) = self.pending.take_matching(event_type, id) {
            entry.reject(&RequestError::Transport {
                event_type: event_type.to_owned(),
                message: error.to_string(),
            });
        }
    }

    /// Runs the local handlers for a remote requester and returns their
    /// results.
    fn fulfil(&mut self, execute: Envelope) -> Result<(), ServiceError> {
        let event_type = execute.event_type().unwrap_or_default().to_owned();
        let requester = execute.sender_id();
        let id = execute.request_id().unwrap_or_default();
        let (data, data_infos) = execute.into_payload();

        let outcomes = notify_local(&self.registry, &event_type, &data, Wildcard::Skip);
        let result = Envelope::new(Phase::Result, self.connection_id)
            .with_event_type(event_type)
            .with_target(Some(requester))
            .with_request_id(id)
            .with_data(encode_remote(outcomes))
            .with_data_infos(data_infos);
        self.send(&result)
    }

    /// Resolves the pending request a result belongs to.
    fn complete(&mut self, result: Envelope) {
        let event_type = result.event_type().unwrap_or_default().to_owned();
        let id = result.request_id().unwrap_or_default();
        let now = self.clock.now();

        let Some(entry) = self.pending.take_matching(&event_type, id) else {
            debug!(
                target: SERVICE_TARGET,
                event_type = event_type.as_str(),
                request_id = id,
                "dropping result for unknown request"
            );
            return;
        };

        info!(
            target: SERVICE_TARGET,
            event_type = event_type.as_str(),
            request_id = id,
            elapsed_ms = millis(entry.elapsed(now)),
            "request fulfilled"
        );
        let (data, _) = result.into_payload();
        entry.resolve(&data);
    }
}
