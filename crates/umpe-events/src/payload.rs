//! Payload shaping shared by emit and request.

use serde_json::Value;

/// Wraps a scalar payload into a one-element array.
///
/// Arrays are sent as-is and `null` stands for "no payload", so handlers on
/// every peer see either `null` or an array.
#[must_use]
pub fn normalise(payload: Value) -> Value {
    match payload {
        Value::Null | Value::Array(_) => payload,
        scalar => Value::Array(vec![scalar]),
    }
}

/// How a payload was serialised by the sending peer.
///
/// Peers that attach `dataInfos` metadata serialise with the host's
/// type-aware serialiser; everyone else uses plain JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataSerialization {
    /// Plain JSON values.
    #[default]
    StandardJson,
    /// Values accompanied by `dataInfos` type metadata.
    JsonUtility,
}

impl DataSerialization {
    /// Infers the serialisation from the presence of payload metadata.
    #[must_use]
    pub const fn from_metadata(data_infos: Option<&Value>) -> Self {
        match data_infos {
            Some(_) => Self::JsonUtility,
            None => Self::StandardJson,
        }
    }
}
