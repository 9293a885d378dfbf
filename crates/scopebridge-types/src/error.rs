use thiserror::Error;

use crate::args::CommandShape;

/// Error type spanning transport failures, malformed backend traffic and
/// configuration problems.
///
/// Only [`BridgeError::Bind`] is fatal; every other variant is reported
/// locally (reply service or log line) and the bridge keeps running.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Backend client not connected")]
    NotConnected,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Topic '{topic}' rejected: {reason}")]
    TopicIndex { topic: String, reason: String },

    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("Transport bind error on {endpoint}: {details}")]
    Bind { endpoint: String, details: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid {shape} arguments: {details}")]
    InvalidArguments { shape: CommandShape, details: String },

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}
