//! [`InboundLoop`] – backend-to-bridge traffic on the point-to-point socket.
//!
//! For every message received:
//!
//! 1. the first frame becomes the active [`PeerIdentity`] (last writer wins);
//! 2. the last frame is parsed as an [`InboundEnvelope`];
//! 3. replies are written to the reply slot, everything else is logged.
//!
//! Malformed traffic is reported on the reply slot and never stops the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopebridge_types::{BridgeError, InboundEnvelope, replies};
use tracing::{debug, info, warn};

use crate::session::{PeerIdentity, PeerSession};
use crate::slot::PublishedSlot;
use crate::transport::{MAX_MESSAGES_PER_POLL, RouterTransport};

/// Sleep between polls when no message is waiting.
pub const DEFAULT_INBOUND_POLL: Duration = Duration::from_millis(100);

/// What one inbound message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Handshake,
    Status,
    /// Text published to the reply slot for a `reply` envelope.
    Reply(String),
    /// Unparseable, untagged or incomplete envelope.
    Malformed,
}

/// Decide what an envelope means without touching any state.
pub fn classify(payload: &[u8]) -> InboundOutcome {
    match InboundEnvelope::parse(payload) {
        Ok(InboundEnvelope::Handshake { .. }) => InboundOutcome::Handshake,
        Ok(InboundEnvelope::Status { .. }) => InboundOutcome::Status,
        Ok(InboundEnvelope::Reply(body)) if body.is_ok() => match body.payload_str() {
            Some(text) => InboundOutcome::Reply(text.to_string()),
            None => InboundOutcome::Malformed,
        },
        Ok(InboundEnvelope::Reply(body)) => InboundOutcome::Reply(format!(
            "{}{}",
            replies::ERROR_PREFIX,
            body.message_str().unwrap_or(replies::NO_MESSAGE)
        )),
        Err(_) => InboundOutcome::Malformed,
    }
}

/// Polls a [`RouterTransport`] and feeds the session and reply slot.
pub struct InboundLoop {
    transport: Arc<dyn RouterTransport>,
    session: Arc<PeerSession>,
    reply: Arc<PublishedSlot>,
    poll_interval: Duration,
}

impl InboundLoop {
    pub fn new(
        transport: Arc<dyn RouterTransport>,
        session: Arc<PeerSession>,
        reply: Arc<PublishedSlot>,
    ) -> Self {
        Self {
            transport,
            session,
            reply,
            poll_interval: DEFAULT_INBOUND_POLL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Process one received message.
    pub fn handle_frames(&self, frames: &[Vec<u8>]) -> InboundOutcome {
        let [identity, .., payload] = frames else {
            warn!(frames = frames.len(), "inbound message without identity frame");
            self.reply.update(replies::MALFORMED);
            return InboundOutcome::Malformed;
        };

        let peer = PeerIdentity::new(identity.clone());
        if self.session.replace(peer.clone()) {
            info!(peer = %peer, "backend peer registered");
        }

        let outcome = classify(payload);
        match &outcome {
            InboundOutcome::Handshake => info!(peer = %peer, "backend handshake"),
            InboundOutcome::Status => debug!(peer = %peer, "backend status"),
            InboundOutcome::Reply(text) => {
                debug!(peer = %peer, bytes = text.len(), "backend reply");
                self.reply.update(text);
            }
            InboundOutcome::Malformed => {
                warn!(peer = %peer, payload = %String::from_utf8_lossy(payload), "malformed backend message");
                self.reply.update(replies::MALFORMED);
            }
        }
        outcome
    }

    /// Handle up to [`MAX_MESSAGES_PER_POLL`] waiting messages.  Returns how
    /// many were handled.
    ///
    /// # Errors
    ///
    /// Propagates the first transport receive error.
    pub fn poll_once(&self) -> Result<usize, BridgeError> {
        let mut handled = 0;
        while handled < MAX_MESSAGES_PER_POLL {
            let Some(frames) = self.transport.try_recv_frames()? else {
                break;
            };
            self.handle_frames(&frames);
            handled += 1;
        }
        Ok(handled)
    }

    /// Poll until `running` is cleared.
    pub async fn run(self, running: Arc<AtomicBool>) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "inbound loop started");
        while running.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => tokio::task::yield_now().await,
                Err(e) => {
                    warn!(error = %e, "inbound receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        info!("inbound loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::TracingNotifier;
    use crate::transport::{Frames, MemoryRouter};

    fn fixture() -> (Arc<MemoryRouter>, InboundLoop) {
        let router = Arc::new(MemoryRouter::new());
        let reply = Arc::new(PublishedSlot::new("SCOPE/REPLY", 2048, Arc::new(TracingNotifier)));
        let inbound = InboundLoop::new(router.clone(), Arc::new(PeerSession::new()), reply);
        (router, inbound)
    }

    fn frames(identity: &[u8], payload: &str) -> Vec<Vec<u8>> {
        vec![identity.to_vec(), Vec::new(), payload.as_bytes().to_vec()]
    }

    /// Backend that always has another status message waiting.
    struct ChattyBackend;

    impl RouterTransport for ChattyBackend {
        fn send_frames(&self, _frames: &[&[u8]]) -> Result<(), BridgeError> {
            Ok(())
        }

        fn try_recv_frames(&self) -> Result<Option<Frames>, BridgeError> {
            Ok(Some(frames(b"be", r#"{"type":"status","payload":"busy"}"#)))
        }
    }

    fn chatty_fixture() -> (Arc<PeerSession>, InboundLoop) {
        let session = Arc::new(PeerSession::new());
        let reply = Arc::new(PublishedSlot::new("SCOPE/REPLY", 2048, Arc::new(TracingNotifier)));
        let inbound = InboundLoop::new(Arc::new(ChattyBackend), Arc::clone(&session), reply);
        (session, inbound)
    }

    #[test]
    fn ok_reply_publishes_payload() {
        let (_, inbound) = fixture();
        let outcome =
            inbound.handle_frames(&frames(b"be", r#"{"type":"reply","status":"ok","payload":"3.14"}"#));
        assert_eq!(outcome, InboundOutcome::Reply("3.14".to_string()));
        assert_eq!(inbound.reply.text(), "3.14");
    }

    #[test]
    fn ok_reply_without_payload_is_malformed() {
        let (_, inbound) = fixture();
        let outcome = inbound.handle_frames(&frames(b"be", r#"{"type":"reply","status":"ok"}"#));
        assert_eq!(outcome, InboundOutcome::Malformed);
        assert_eq!(inbound.reply.text(), replies::MALFORMED);
    }

    #[test]
    fn error_reply_prefixes_message() {
        let (_, inbound) = fixture();
        inbound.handle_frames(&frames(
            b"be",
            r#"{"type":"reply","status":"error","message":"VISA timeout"}"#,
        ));
        assert_eq!(inbound.reply.text(), "Error: VISA timeout");
    }

    #[test]
    fn error_reply_without_message_uses_placeholder() {
        let (_, inbound) = fixture();
        inbound.handle_frames(&frames(b"be", r#"{"type":"reply","status":"error"}"#));
        assert_eq!(inbound.reply.text(), "Error: [no msg]");
    }

    #[test]
    fn handshake_registers_peer_without_touching_reply() {
        let (_, inbound) = fixture();
        inbound.reply.update("previous");
        let outcome = inbound.handle_frames(&frames(b"backend-7", r#"{"type":"handshake"}"#));

        assert_eq!(outcome, InboundOutcome::Handshake);
        assert_eq!(inbound.session.current(), Some(PeerIdentity::new(b"backend-7".to_vec())));
        assert_eq!(inbound.reply.text(), "previous");
    }

    #[test]
    fn any_message_replaces_identity() {
        let (_, inbound) = fixture();
        inbound.handle_frames(&frames(b"first", r#"{"type":"handshake"}"#));
        inbound.handle_frames(&frames(b"second", r#"{"type":"status","payload":"alive"}"#));
        assert_eq!(inbound.session.current(), Some(PeerIdentity::new(b"second".to_vec())));
    }

    #[test]
    fn unknown_tag_and_bad_json_are_malformed() {
        let (_, inbound) = fixture();
        assert_eq!(
            inbound.handle_frames(&frames(b"be", r#"{"type":"telemetry"}"#)),
            InboundOutcome::Malformed
        );
        assert_eq!(inbound.handle_frames(&frames(b"be", "not json")), InboundOutcome::Malformed);
        assert_eq!(inbound.reply.text(), replies::MALFORMED);
    }

    #[test]
    fn single_frame_message_does_not_touch_identity() {
        let (_, inbound) = fixture();
        let outcome = inbound.handle_frames(&[br#"{"type":"handshake"}"#.to_vec()]);
        assert_eq!(outcome, InboundOutcome::Malformed);
        assert!(!inbound.session.is_connected());
    }

    #[test]
    fn middle_frames_are_ignored() {
        let (_, inbound) = fixture();
        let msg = vec![
            b"be".to_vec(),
            b"extra".to_vec(),
            Vec::new(),
            br#"{"type":"reply","status":"ok","payload":"done"}"#.to_vec(),
        ];
        inbound.handle_frames(&msg);
        assert_eq!(inbound.reply.text(), "done");
    }

    #[test]
    fn poll_once_drains_queue_in_order() {
        let (router, inbound) = fixture();
        router.push_from_peer(b"be", r#"{"type":"reply","status":"ok","payload":"1"}"#);
        router.push_from_peer(b"be", r#"{"type":"reply","status":"ok","payload":"2"}"#);

        assert_eq!(inbound.poll_once().unwrap(), 2);
        assert_eq!(inbound.reply.text(), "2");
        assert_eq!(router.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn run_exits_when_flag_cleared() {
        let (router, inbound) = fixture();
        let reply = Arc::clone(&inbound.reply);
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(
            inbound
                .with_poll_interval(Duration::from_millis(5))
                .run(Arc::clone(&running)),
        );

        router.push_from_peer(b"be", r#"{"type":"reply","status":"ok","payload":"live"}"#);
        tokio::time::timeout(Duration::from_secs(2), async {
            while reply.text() != "live" {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reply should be published");

        running.store(false, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop")
            .unwrap();
    }

    #[test]
    fn poll_once_stops_at_batch_limit() {
        let (session, inbound) = chatty_fixture();
        assert_eq!(inbound.poll_once().unwrap(), MAX_MESSAGES_PER_POLL);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn run_stops_while_backend_keeps_sending() {
        let (session, inbound) = chatty_fixture();
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(inbound.run(Arc::clone(&running)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.is_connected());

        running.store(false, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop under continuous traffic")
            .unwrap();
    }
}
