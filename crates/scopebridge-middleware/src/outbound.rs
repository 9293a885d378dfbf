//! [`OutboundChannel`] – sends command envelopes to the active backend.
//!
//! A send is a three-part message `[identity][empty][json]` addressed to the
//! peer currently held by the [`PeerSession`].  Failures never propagate to
//! the registry client directly; they are written to the reply slot, which
//! is the only path back to the caller.

use std::sync::Arc;

use scopebridge_types::{BridgeError, OutboundEnvelope, replies};
use tracing::{debug, error, warn};

use crate::session::PeerSession;
use crate::slot::PublishedSlot;
use crate::transport::RouterTransport;

/// Registry-side handle on the point-to-point socket.
///
/// Cheap to clone; all clones share the transport, the session and the
/// reply slot.
#[derive(Clone)]
pub struct OutboundChannel {
    transport: Arc<dyn RouterTransport>,
    session: Arc<PeerSession>,
    reply: Arc<PublishedSlot>,
}

impl OutboundChannel {
    pub fn new(transport: Arc<dyn RouterTransport>, reply: Arc<PublishedSlot>) -> Self {
        Self {
            transport,
            session: Arc::new(PeerSession::new()),
            reply,
        }
    }

    /// Session shared with the inbound loop.
    pub fn session(&self) -> &Arc<PeerSession> {
        &self.session
    }

    /// Slot that receives replies and send errors.
    pub fn reply(&self) -> &Arc<PublishedSlot> {
        &self.reply
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Serialize `envelope` and send it to the active peer.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotConnected`] when no backend has registered yet.
    ///   Nothing is sent and the reply slot reads
    ///   `Error: Backend client not connected.`
    /// - [`BridgeError::Serialization`] when the envelope cannot be encoded.
    /// - [`BridgeError::Transport`] when the socket refuses the message.
    ///   The reply slot reads `Error: Failed to send command to backend.`
    pub fn send(&self, envelope: &OutboundEnvelope) -> Result<(), BridgeError> {
        let Some(peer) = self.session.current() else {
            warn!(command = %envelope.command, id = %envelope.id, "no backend connected; command dropped");
            self.reply.update(replies::NOT_CONNECTED);
            return Err(BridgeError::NotConnected);
        };

        let json = envelope.to_json().inspect_err(|e| {
            error!(id = %envelope.id, error = %e, "failed to encode command");
        })?;

        if let Err(e) = self
            .transport
            .send_frames(&[peer.as_bytes(), b"", json.as_bytes()])
        {
            error!(peer = %peer, id = %envelope.id, error = %e, "failed to send command");
            self.reply.update(replies::SEND_FAILED);
            return Err(e);
        }
        debug!(peer = %peer, id = %envelope.id, command = %envelope.command, "command sent");
        Ok(())
    }
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("peer", &self.session.current())
            .field("reply", &self.reply.name())
            .finish()
    }
}
