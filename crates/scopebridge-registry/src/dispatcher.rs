//! [`CommandDispatcher`] – the object the registry invokes per command.
//!
//! Invocation is fire-and-forget: arguments are decoded, turned into an
//! envelope with the next correlation id, and handed to the
//! [`OutboundChannel`].  The only way back to the client is the reply slot.

use std::sync::atomic::{AtomicU64, Ordering};

use scopebridge_middleware::OutboundChannel;
use scopebridge_types::{BridgeError, CommandArgs, replies};
use tracing::{debug, warn};

use crate::descriptor::CommandDescriptor;

/// A registered command bound to the outbound channel.
#[derive(Debug)]
pub struct CommandDispatcher {
    descriptor: CommandDescriptor,
    channel: OutboundChannel,
    next_seq: AtomicU64,
}

impl CommandDispatcher {
    pub fn new(descriptor: CommandDescriptor, channel: OutboundChannel) -> Self {
        Self {
            descriptor,
            channel,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.public_name()
    }

    /// Number of invocations that reached envelope construction.
    pub fn issued(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }

    /// Registry callback: decode `bytes` for the declared shape and send.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidArguments`] when `bytes` does not fit the shape
    /// (nothing is sent), otherwise whatever [`OutboundChannel::send`]
    /// reports.  Every error has already been published on the reply slot.
    pub fn invoke(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        let args = CommandArgs::decode(self.descriptor.shape(), bytes)
            .map_err(|e| self.reject(e))?;
        self.dispatch(&args)
    }

    /// Console entry point: parse `text` for the declared shape and send.
    ///
    /// # Errors
    ///
    /// As [`CommandDispatcher::invoke`].
    pub fn invoke_text(&self, text: &str) -> Result<(), BridgeError> {
        let args = CommandArgs::parse_text(self.descriptor.shape(), text)
            .map_err(|e| self.reject(e))?;
        self.dispatch(&args)
    }

    /// Send already-decoded arguments.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidArguments`] when `args` has a different shape
    /// than the descriptor, otherwise whatever the channel reports.
    pub fn dispatch(&self, args: &CommandArgs) -> Result<(), BridgeError> {
        let shape = self.descriptor.shape();
        if args.shape() != shape {
            return Err(self.reject(BridgeError::InvalidArguments {
                shape,
                details: format!("got {} arguments", args.shape()),
            }));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let envelope = self.descriptor.envelope(args, seq);
        debug!(command = self.name(), id = %envelope.id, "dispatching");
        self.channel.send(&envelope)
    }

    fn reject(&self, err: BridgeError) -> BridgeError {
        let details = match &err {
            BridgeError::InvalidArguments { details, .. } => details.clone(),
            other => other.to_string(),
        };
        warn!(command = self.name(), error = %err, "invalid command arguments");
        self.channel.reply().update(format!(
            "{}invalid arguments for {}: {details}",
            replies::ERROR_PREFIX,
            self.name()
        ));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scopebridge_middleware::{MemoryRouter, PeerIdentity, PublishedSlot, TracingNotifier};
    use scopebridge_types::{CommandShape, verbs};

    fn connected() -> (Arc<MemoryRouter>, OutboundChannel) {
        let router = Arc::new(MemoryRouter::new());
        let reply = Arc::new(PublishedSlot::new("SCOPE/REPLY", 2048, Arc::new(TracingNotifier)));
        let channel = OutboundChannel::new(router.clone(), reply);
        channel.session().replace(PeerIdentity::new(b"backend".to_vec()));
        (router, channel)
    }

    fn sent_json(router: &MemoryRouter, n: usize) -> serde_json::Value {
        serde_json::from_slice(&router.sent()[n][2]).unwrap()
    }

    #[test]
    fn counter_is_per_dispatcher_and_starts_at_zero() {
        let (router, channel) = connected();
        let level = CommandDispatcher::new(
            CommandDescriptor::float("SCOPE/TRIGGER/SET_LEVEL", verbs::SET_TRIGGER_LEVEL, "level"),
            channel.clone(),
        );
        let timediv = CommandDispatcher::new(
            CommandDescriptor::float(
                "SCOPE/ACQUISITION/SET_TIMEDIV",
                verbs::SET_ACQUISITION_TIMEDIV,
                "timediv",
            ),
            channel,
        );

        level.invoke(&0.1f32.to_le_bytes()).unwrap();
        level.invoke(&0.2f32.to_le_bytes()).unwrap();
        timediv.invoke(&1e-3f32.to_le_bytes()).unwrap();

        assert_eq!(sent_json(&router, 0)["id"], "set_trigger_level_0");
        assert_eq!(sent_json(&router, 1)["id"], "set_trigger_level_1");
        assert_eq!(sent_json(&router, 2)["id"], "set_acquisition_timediv_0");
        assert_eq!(level.issued(), 2);
    }

    #[test]
    fn short_buffer_is_reported_and_not_sent() {
        let (router, channel) = connected();
        let d = CommandDispatcher::new(
            CommandDescriptor::channel_float("SCOPE/CHANNEL/SET_SCALE", verbs::SET_CHANNEL_SCALE, "scale"),
            channel.clone(),
        );

        let err = d.invoke(&[1, 0, 0]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArguments { .. }));
        assert!(router.sent().is_empty());
        assert_eq!(d.issued(), 0);
        assert!(
            channel
                .reply()
                .text()
                .starts_with("Error: invalid arguments for SCOPE/CHANNEL/SET_SCALE:")
        );
    }

    #[test]
    fn invoke_text_parses_console_arguments() {
        let (router, channel) = connected();
        let d = CommandDispatcher::new(
            CommandDescriptor::channel_flag("SCOPE/CHANNEL/SET_ENABLED", verbs::SET_CHANNEL_ENABLED, "enabled"),
            channel,
        );

        d.invoke_text("3 1").unwrap();
        let json = sent_json(&router, 0);
        assert_eq!(json["params"]["channel"], 3);
        assert_eq!(json["params"]["enabled"], true);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let (router, channel) = connected();
        let d = CommandDispatcher::new(
            CommandDescriptor::int("SCOPE/TRIGGER/SET_CHANNEL", verbs::SET_TRIGGER_CHANNEL, "channel"),
            channel,
        );
        let err = d.dispatch(&CommandArgs::Str("1".to_string())).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArguments { shape: CommandShape::Int, .. }));
        assert!(router.sent().is_empty());
    }
}
