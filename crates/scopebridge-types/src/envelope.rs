//! JSON envelopes exchanged with the backend over the point-to-point socket.
//!
//! Outbound traffic is always a `command` envelope:
//!
//! ```json
//! {"type": "command", "id": "set_trigger_level_0", "command": "set_trigger_level", "params": {"level": 0.5}}
//! ```
//!
//! Inbound traffic is tagged by `type` and is one of `handshake`, `reply` or
//! `status`.  Reply fields are kept as raw [`serde_json::Value`]s so that a
//! partially-populated or wrongly-typed reply still parses and can be
//! classified by the inbound loop instead of failing wholesale.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// Parameter map carried by an outbound command.
pub type Params = serde_json::Map<String, Value>;

/// Discriminator of outbound envelopes.  Only commands flow to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    Command,
}

/// A command addressed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    /// Per-dispatcher correlation id, e.g. `set_channel_scale_3`.
    pub id: String,
    /// Backend verb.
    pub command: String,
    pub params: Params,
}

impl OutboundEnvelope {
    /// Build a command envelope.
    pub fn command(id: impl Into<String>, verb: impl Into<String>, params: Params) -> Self {
        Self {
            kind: OutboundKind::Command,
            id: id.into(),
            command: verb.into(),
            params,
        }
    }

    /// Serialize to the compact JSON text sent as the last transport frame.
    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Body of a `reply` envelope.
///
/// `status` is `"ok"` on success and anything else on failure.  Every field
/// is optional on the wire; the inbound loop decides what a missing field
/// means.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyBody {
    pub id: Option<Value>,
    pub status: Option<Value>,
    pub payload: Option<Value>,
    pub message: Option<Value>,
}

impl ReplyBody {
    /// `true` when `status` is exactly the string `"ok"`.
    pub fn is_ok(&self) -> bool {
        matches!(&self.status, Some(Value::String(s)) if s == "ok")
    }

    /// The payload, when present and a string.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Value::as_str)
    }

    /// The error message, when present and a string.
    pub fn message_str(&self) -> Option<&str> {
        self.message.as_ref().and_then(Value::as_str)
    }
}

/// A message originated by the backend on the point-to-point socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEnvelope {
    /// First message of a backend session; announces its routing identity.
    Handshake { payload: Option<Value> },
    /// Outcome of a previously sent command.
    Reply(ReplyBody),
    /// Free-form liveness/status notice.
    Status { payload: Option<Value> },
}

impl InboundEnvelope {
    /// Parse the last frame of an inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedEnvelope`] for invalid JSON, a missing
    /// `type` tag, or an unknown tag.
    pub fn parse(bytes: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(bytes).map_err(|e| BridgeError::MalformedEnvelope(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_serializes_with_command_type() {
        let mut params = Params::new();
        params.insert("level".to_string(), json!(0.5));
        let env = OutboundEnvelope::command("set_trigger_level_0", "set_trigger_level", params);

        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["id"], "set_trigger_level_0");
        assert_eq!(value["command"], "set_trigger_level");
        assert_eq!(value["params"]["level"], 0.5);
    }

    #[test]
    fn parses_handshake() {
        let env = InboundEnvelope::parse(br#"{"type":"handshake","payload":"online"}"#).unwrap();
        assert!(matches!(env, InboundEnvelope::Handshake { .. }));
    }

    #[test]
    fn parses_ok_reply() {
        let env =
            InboundEnvelope::parse(br#"{"type":"reply","status":"ok","payload":"3.14"}"#).unwrap();
        let InboundEnvelope::Reply(body) = env else {
            panic!("expected reply");
        };
        assert!(body.is_ok());
        assert_eq!(body.payload_str(), Some("3.14"));
    }

    #[test]
    fn reply_with_missing_fields_still_parses() {
        let env = InboundEnvelope::parse(br#"{"type":"reply"}"#).unwrap();
        let InboundEnvelope::Reply(body) = env else {
            panic!("expected reply");
        };
        assert!(!body.is_ok());
        assert_eq!(body.payload_str(), None);
        assert_eq!(body.message_str(), None);
    }

    #[test]
    fn non_string_payload_is_not_exposed_as_text() {
        let env = InboundEnvelope::parse(br#"{"type":"reply","status":"ok","payload":42}"#).unwrap();
        let InboundEnvelope::Reply(body) = env else {
            panic!("expected reply");
        };
        assert_eq!(body.payload_str(), None);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let err = InboundEnvelope::parse(br#"{"type":"telemetry"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(_)));
    }

    #[test]
    fn missing_tag_is_malformed() {
        let err = InboundEnvelope::parse(br#"{"status":"ok","payload":"1"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = InboundEnvelope::parse(b"{not json").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(_)));
    }
}
