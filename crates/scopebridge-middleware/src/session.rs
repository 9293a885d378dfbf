//! One-slot register for the active backend peer.
//!
//! The bridge talks to exactly one backend at a time.  Every inbound message
//! on the point-to-point socket replaces the stored identity, so the most
//! recent sender is the one commands are addressed to.  Multi-backend fan-in
//! is not supported.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque routing token of a backend connection, as prepended by the
/// `ROUTER` socket.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity(Vec<u8>);

impl PeerIdentity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({self})")
    }
}

/// Guarded register holding the current [`PeerIdentity`].
///
/// Written only by the inbound loop, read only by the outbound channel.
/// The lock covers the identity field alone and is held for one clone or
/// assignment.
#[derive(Debug, Default)]
pub struct PeerSession {
    current: Mutex<Option<PeerIdentity>>,
}

impl PeerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `identity` as the active peer.
    ///
    /// Returns `true` when it differs from the previous one (including the
    /// first registration).
    pub fn replace(&self, identity: PeerIdentity) -> bool {
        let mut current = self.lock();
        let changed = current.as_ref() != Some(&identity);
        *current = Some(identity);
        changed
    }

    /// Copy of the active identity, if any.
    pub fn current(&self) -> Option<PeerIdentity> {
        self.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PeerIdentity>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let session = PeerSession::new();
        assert!(!session.is_connected());
        assert!(session.current().is_none());
    }

    #[test]
    fn last_writer_wins() {
        let session = PeerSession::new();
        assert!(session.replace(PeerIdentity::new(b"a".to_vec())));
        assert!(session.replace(PeerIdentity::new(b"b".to_vec())));
        assert_eq!(session.current(), Some(PeerIdentity::new(b"b".to_vec())));
    }

    #[test]
    fn same_identity_is_not_a_change() {
        let session = PeerSession::new();
        session.replace(PeerIdentity::new(vec![0, 1]));
        assert!(!session.replace(PeerIdentity::new(vec![0, 1])));
    }

    #[test]
    fn identity_displays_as_hex() {
        let id = PeerIdentity::new(vec![0x00, 0x6b, 0x8b, 0x45, 0x67]);
        assert_eq!(id.to_string(), "006b8b4567");
    }
}
