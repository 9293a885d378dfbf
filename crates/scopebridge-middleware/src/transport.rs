//! Transport seam between the bridge loops and the message queue.
//!
//! The loops only ever perform non-blocking operations, expressed by two
//! traits:
//!
//! - [`RouterTransport`] – the identity-addressed point-to-point socket.
//!   Shared between the outbound channel (send) and the inbound loop
//!   (receive), hence `&self` methods and `Sync`.
//! - [`FanoutTransport`] – the subscribe side of the publish/subscribe
//!   socket.  Owned exclusively by the subscription loop.
//!
//! ZeroMQ implementations live in [`crate::zmq_transport`].  The in-process
//! [`MemoryRouter`] and [`MemoryFanout`] below let a backend be simulated
//! without any socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scopebridge_types::BridgeError;

/// A multi-part transport message.
pub type Frames = Vec<Vec<u8>>;

/// Most messages a loop takes from its transport before it yields and
/// re-checks its running flag.
pub const MAX_MESSAGES_PER_POLL: usize = 64;

/// Identity-addressed point-to-point socket.
pub trait RouterTransport: Send + Sync {
    /// Send one multi-part message without blocking.
    fn send_frames(&self, frames: &[&[u8]]) -> Result<(), BridgeError>;

    /// Receive one multi-part message if one is waiting.
    fn try_recv_frames(&self) -> Result<Option<Frames>, BridgeError>;
}

/// Subscribe side of a publish/subscribe socket.
pub trait FanoutTransport: Send {
    /// Receive one `[topic][payload]` message if one is waiting.
    fn try_recv_frames(&mut self) -> Result<Option<Frames>, BridgeError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process [`RouterTransport`].
///
/// Messages pushed with [`MemoryRouter::push_inbound`] are handed to the
/// inbound loop in order; everything sent is recorded for inspection.
#[derive(Debug, Default)]
pub struct MemoryRouter {
    inbound: Mutex<VecDeque<Frames>>,
    sent: Mutex<Vec<Frames>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message as if a peer had sent it.
    pub fn push_inbound(&self, frames: Frames) {
        lock(&self.inbound).push_back(frames);
    }

    /// Queue a `[identity][empty][payload]` message from `identity`.
    pub fn push_from_peer(&self, identity: &[u8], payload: impl AsRef<[u8]>) {
        self.push_inbound(vec![identity.to_vec(), Vec::new(), payload.as_ref().to_vec()]);
    }

    /// Copy of every message sent so far.
    pub fn sent(&self) -> Vec<Frames> {
        lock(&self.sent).clone()
    }

    /// Number of messages still waiting to be received.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.inbound).len()
    }
}

impl RouterTransport for MemoryRouter {
    fn send_frames(&self, frames: &[&[u8]]) -> Result<(), BridgeError> {
        lock(&self.sent).push(frames.iter().map(|f| f.to_vec()).collect());
        Ok(())
    }

    fn try_recv_frames(&self) -> Result<Option<Frames>, BridgeError> {
        Ok(lock(&self.inbound).pop_front())
    }
}

/// In-process [`FanoutTransport`].
///
/// Clones share one queue: keep a clone to publish into while the
/// subscription loop owns the other.
#[derive(Debug, Default, Clone)]
pub struct MemoryFanout {
    queue: Arc<Mutex<VecDeque<Frames>>>,
}

impl MemoryFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a `[topic][payload]` message.
    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) {
        self.push_frames(vec![topic.as_bytes().to_vec(), payload.as_ref().to_vec()]);
    }

    /// Queue an arbitrary multi-part message.
    pub fn push_frames(&self, frames: Frames) {
        lock(&self.queue).push_back(frames);
    }

    /// Number of messages not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl FanoutTransport for MemoryFanout {
    fn try_recv_frames(&mut self) -> Result<Option<Frames>, BridgeError> {
        Ok(lock(&self.queue).pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_router_records_sends_and_replays_inbound_in_order() {
        let router = MemoryRouter::new();
        router.push_from_peer(b"peer-1", "first");
        router.push_from_peer(b"peer-1", "second");

        let first = router.try_recv_frames().unwrap().unwrap();
        assert_eq!(first[2], b"first");
        let second = router.try_recv_frames().unwrap().unwrap();
        assert_eq!(second[2], b"second");
        assert!(router.try_recv_frames().unwrap().is_none());

        router.send_frames(&[b"peer-1", b"", b"{}"]).unwrap();
        assert_eq!(router.sent(), vec![vec![b"peer-1".to_vec(), vec![], b"{}".to_vec()]]);
    }

    #[test]
    fn memory_fanout_clones_share_a_queue() {
        let publisher = MemoryFanout::new();
        let mut subscriber = publisher.clone();

        publisher.publish("backend_state", "IDLE");
        assert_eq!(subscriber.pending(), 1);

        let frames = subscriber.try_recv_frames().unwrap().unwrap();
        assert_eq!(frames, vec![b"backend_state".to_vec(), b"IDLE".to_vec()]);
        assert_eq!(publisher.pending(), 0);
    }
}
