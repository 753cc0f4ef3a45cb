//! Wire envelopes exchanged between peers.
//!
//! Every frame after the connection handshake is one JSON object:
//!
//! ```text
//! {"req":"request","type":"ping","senderId":3,"requestId":1,"data":["hi"]}
//! ```
//!
//! `req` carries the [`Phase`], `type` the event type (absent for `log`),
//! `senderId` the sender's connection id, `targetId` the addressee (absent
//! for broadcasts), `requestId` the requester's id for request-phase frames,
//! `data` the payload and `dataInfos` optional serialisation metadata.
//!
//! The handshake that precedes the envelopes is a bare integer: the
//! connection id the host assigned to this peer.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::CodecError;
use crate::payload::DataSerialization;

/// Connection id assigned by the host.
pub type ConnectionId = i64;

/// Identifier of one outbound request, unique per engine instance.
pub type RequestId = u64;

/// Connection id held before the host's handshake arrives.
pub const UNASSIGNED_CONNECTION: ConnectionId = -1;

/// Position of a frame in the protocol.
///
/// The wire tag is the variant's string form; parse tags with
/// [`str::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
pub enum Phase {
    /// A requester looks for a peer able to serve an event type.
    #[strum(serialize = "request")]
    Request,
    /// A peer offers to serve a request.
    #[strum(serialize = "requestAck")]
    Acknowledge,
    /// The requester asks the first acknowledging peer to run its handlers.
    #[strum(serialize = "requestExecute")]
    Execute,
    /// The fulfiller returns its handler results.
    #[strum(serialize = "requestResult")]
    Result,
    /// Fire-and-forget broadcast.
    #[strum(serialize = "event")]
    Event,
    /// Diagnostic message for the host; no response is expected.
    #[strum(serialize = "log")]
    Log,
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "req")]
    phase: Phase,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    sender_id: ConnectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<ConnectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<RequestId>,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_infos: Option<Value>,
}

impl Envelope {
    /// Starts a frame with no event type, target, request id or payload.
    #[must_use]
    pub const fn new(phase: Phase, sender_id: ConnectionId) -> Self {
        Self {
            phase,
            event_type: None,
            sender_id,
            target_id: None,
            request_id: None,
            data: Value::Null,
            data_infos: None,
        }
    }

    /// Sets the event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Addresses the frame to one connection; `None` broadcasts it.
    #[must_use]
    pub const fn with_target(mut self, target_id: Option<ConnectionId>) -> Self {
        self.target_id = target_id;
        self
    }

    /// Sets the request id; zero is treated as "no request id".
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = (request_id != 0).then_some(request_id);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Sets the payload metadata.
    #[must_use]
    pub fn with_data_infos(mut self, data_infos: Option<Value>) -> Self {
        self.data_infos = data_infos;
        self
    }

    /// Protocol phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Event type, absent only for `log` frames.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// Connection id of the sender.
    #[must_use]
    pub const fn sender_id(&self) -> ConnectionId {
        self.sender_id
    }

    /// Addressee, `None` for broadcasts.
    #[must_use]
    pub const fn target_id(&self) -> Option<ConnectionId> {
        self.target_id
    }

    /// Requester's id for request-phase frames.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Payload.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Payload metadata.
    #[must_use]
    pub const fn data_infos(&self) -> Option<&Value> {
        self.data_infos.as_ref()
    }

    /// Serialisation the sender used for the payload.
    #[must_use]
    pub const fn serialization(&self) -> DataSerialization {
        DataSerialization::from_metadata(self.data_infos.as_ref())
    }

    /// Consumes the frame, returning its payload and metadata.
    #[must_use]
    pub fn into_payload(self) -> (Value, Option<Value>) {
        (self.data, self.data_infos)
    }
}

/// Inbound frame before validation. Every field is optional so missing ones
/// can be reported by name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    req: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    sender_id: Option<ConnectionId>,
    target_id: Option<ConnectionId>,
    request_id: Option<i64>,
    #[serde(default)]
    data: Value,
    data_infos: Option<Value>,
}

/// Serialises a frame to JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialised.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parses and validates an inbound frame.
///
/// Returns `Ok(None)` for frames sent by `local_id` itself, which a relaying
/// host may echo back. Non-positive request ids are treated as absent.
///
/// # Errors
///
/// Returns a [`CodecError`] when the text is not a JSON object, when `req`
/// or `senderId` is missing, when `type` is missing on a non-`log` frame, or
/// when the phase tag is unknown.
pub fn decode(raw: &str, local_id: ConnectionId) -> Result<Option<Envelope>, CodecError> {
    let message: RawEnvelope = serde_json::from_str(raw)?;

    let tag = message
        .req
        .ok_or(CodecError::MissingField { field: "req" })?;
    let Ok(phase) = tag.parse::<Phase>() else {
        return Err(CodecError::UnknownPhase { tag });
    };
    let sender_id = message
        .sender_id
        .ok_or(CodecError::MissingField { field: "senderId" })?;
    if phase != Phase::Log && message.event_type.is_none() {
        return Err(CodecError::MissingField { field: "type" });
    }

    if sender_id == local_id {
        return Ok(None);
    }

    Ok(Some(Envelope {
        phase,
        event_type: message.event_type,
        sender_id,
        target_id: message.target_id,
        request_id: message
            .request_id
            .and_then(|id| RequestId::try_from(id).ok())
            .filter(|id| *id != 0),
        data: message.data,
        data_infos: message.data_infos,
    }))
}

/// Parses the connection-id handshake.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHandshake`] unless the text is a
/// non-negative integer, surrounding whitespace aside.
pub fn decode_handshake(raw: &str) -> Result<ConnectionId, CodecError> {
    raw.trim()
        .parse::<ConnectionId>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| CodecError::InvalidHandshake {
            raw: raw.to_owned(),
        })
}
