//! `scopebridge-types` – shared vocabulary of the bridge.
//!
//! Everything that crosses a crate boundary or the transport boundary lives
//! here: the JSON envelopes exchanged with the backend, the typed command
//! arguments delivered by the registry, protocol constants, and the single
//! [`BridgeError`] type.

pub mod args;
pub mod envelope;
pub mod error;

pub use args::{CommandArgs, CommandShape};
pub use envelope::{InboundEnvelope, OutboundEnvelope, Params, ReplyBody};
pub use error::BridgeError;

/// JSON field names used on the wire.
pub mod keys {
    pub const COMMAND: &str = "command";
    pub const QUERY: &str = "query";
    pub const CHANNEL: &str = "channel";
}

/// Backend verbs understood by the device process.
pub mod verbs {
    pub const SET_CHANNEL_ENABLED: &str = "set_channel_enabled";
    pub const SET_CHANNEL_SCALE: &str = "set_channel_scale";
    pub const SET_TRIGGER_CHANNEL: &str = "set_trigger_channel";
    pub const SET_TRIGGER_SLOPE: &str = "set_trigger_slope";
    pub const SET_TRIGGER_LEVEL: &str = "set_trigger_level";
    pub const SET_ACQUISITION_MODE: &str = "set_acquisition_mode";
    pub const SET_ACQUISITION_TIMEDIV: &str = "set_acquisition_timediv";
    pub const SET_ACQUISITION_TIMEOUT: &str = "set_acquisition_timeout";
    pub const SET_ACQUISITION_IGNORE: &str = "set_acquisition_ignore";
    pub const RAW_QUERY: &str = "raw_query";
    pub const RAW_WRITE: &str = "raw_write";
}

/// Fixed texts published on the reply service.
pub mod replies {
    /// Prefix for every error surfaced through the reply service.
    pub const ERROR_PREFIX: &str = "Error: ";
    /// Published when a command is issued before any backend has connected.
    pub const NOT_CONNECTED: &str = "Error: Backend client not connected.";
    /// Published for unparseable, untagged or incomplete inbound envelopes.
    pub const MALFORMED: &str = "Error: Malformed message from backend.";
    /// Published when the transport refuses an outbound command.
    pub const SEND_FAILED: &str = "Error: Failed to send command to backend.";
    /// Stands in for a missing `message` on an error reply.
    pub const NO_MESSAGE: &str = "[no msg]";
}

/// Character that marks a raw passthrough command as a query.
pub const QUERY_MARKER: char = '?';
