//! `scopebridge-middleware` – moves messages between the registry side and
//! the backend side without interpreting device semantics.
//!
//! # Modules
//!
//! - [`slot`] – capacity-bounded published values with per-slot locking.
//! - [`services`] – the full set of published slots and their names.
//! - [`transport`] – non-blocking transport traits plus in-process
//!   implementations.
//! - [`zmq_transport`] – ZeroMQ `ROUTER` and `SUB` transports.
//! - [`session`] – the single active backend peer.
//! - [`outbound`] – addressed command sends with errors on the reply slot.
//! - [`inbound`] – replies, handshakes and status from the backend.
//! - [`subscription`] – topic fan-out into state and waveform slots.
//! - [`bridge`] – lifecycle of both loops.

pub mod bridge;
pub mod inbound;
pub mod outbound;
pub mod services;
pub mod session;
pub mod slot;
pub mod subscription;
pub mod transport;
pub mod zmq_transport;

pub use bridge::{Bridge, BridgeConfig};
pub use inbound::{InboundLoop, InboundOutcome};
pub use outbound::OutboundChannel;
pub use services::{ServiceConfig, ServiceSet};
pub use session::{PeerIdentity, PeerSession};
pub use slot::{PublishedSlot, ServiceNotifier, TracingNotifier};
pub use subscription::{SubscriptionLoop, TopicConfig, TopicRouter};
pub use transport::{
    FanoutTransport, MAX_MESSAGES_PER_POLL, MemoryFanout, MemoryRouter, RouterTransport,
};
