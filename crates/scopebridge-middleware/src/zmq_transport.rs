//! ZeroMQ implementations of the transport traits.
//!
//! - [`ZmqRouter`] binds a `ROUTER` socket: the backend connects with a
//!   `DEALER` and is addressed by the identity frame ZeroMQ prepends.
//! - [`ZmqSubscriber`] connects a `SUB` socket to the backend's `PUB`
//!   endpoint and subscribes to a fixed topic list.
//!
//! ZeroMQ sockets are not thread-safe.  The router is shared between the
//! registry callback context and the inbound loop, so it sits behind a mutex
//! that is held for exactly one `DONTWAIT` operation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use scopebridge_types::BridgeError;
use tracing::{debug, info};

use crate::transport::{FanoutTransport, Frames, RouterTransport};

fn bind_error(endpoint: &str, e: zmq::Error) -> BridgeError {
    BridgeError::Bind {
        endpoint: endpoint.to_string(),
        details: e.to_string(),
    }
}

/// Bound ZeroMQ `ROUTER` socket.
pub struct ZmqRouter {
    socket: Mutex<zmq::Socket>,
    endpoint: String,
}

impl ZmqRouter {
    /// Create a `ROUTER` socket on `context` and bind it to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] when the socket cannot be created or
    /// the endpoint cannot be bound.
    pub fn bind(context: &zmq::Context, endpoint: &str) -> Result<Self, BridgeError> {
        let socket = context
            .socket(zmq::ROUTER)
            .map_err(|e| bind_error(endpoint, e))?;
        socket.set_linger(0).map_err(|e| bind_error(endpoint, e))?;
        socket.bind(endpoint).map_err(|e| bind_error(endpoint, e))?;
        info!(endpoint, "ROUTER socket bound");
        Ok(Self {
            socket: Mutex::new(socket),
            endpoint: endpoint.to_string(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, zmq::Socket> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RouterTransport for ZmqRouter {
    fn send_frames(&self, frames: &[&[u8]]) -> Result<(), BridgeError> {
        self.lock()
            .send_multipart(frames.iter().copied(), zmq::DONTWAIT)
            .map_err(|e| BridgeError::Transport(format!("send on {}: {e}", self.endpoint)))
    }

    fn try_recv_frames(&self) -> Result<Option<Frames>, BridgeError> {
        match self.lock().recv_multipart(zmq::DONTWAIT) {
            Ok(frames) => Ok(Some(frames)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(BridgeError::Transport(format!(
                "receive on {}: {e}",
                self.endpoint
            ))),
        }
    }
}

/// Connected ZeroMQ `SUB` socket.
pub struct ZmqSubscriber {
    socket: zmq::Socket,
    endpoint: String,
}

impl ZmqSubscriber {
    /// Create a `SUB` socket, connect it to `endpoint` and subscribe to
    /// every entry of `topics`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] when the socket cannot be created,
    /// connected, or subscribed.
    pub fn connect(
        context: &zmq::Context,
        endpoint: &str,
        topics: &[String],
    ) -> Result<Self, BridgeError> {
        let socket = context.socket(zmq::SUB).map_err(|e| bind_error(endpoint, e))?;
        socket.set_linger(0).map_err(|e| bind_error(endpoint, e))?;
        socket.connect(endpoint).map_err(|e| bind_error(endpoint, e))?;
        for topic in topics {
            socket
                .set_subscribe(topic.as_bytes())
                .map_err(|e| bind_error(endpoint, e))?;
            debug!(endpoint, topic = %topic, "subscribed");
        }
        info!(endpoint, topics = topics.len(), "SUB socket connected");
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }
}

impl FanoutTransport for ZmqSubscriber {
    fn try_recv_frames(&mut self) -> Result<Option<Frames>, BridgeError> {
        match self.socket.recv_multipart(zmq::DONTWAIT) {
            Ok(frames) => Ok(Some(frames)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(BridgeError::Transport(format!(
                "receive on {}: {e}",
                self.endpoint
            ))),
        }
    }
}
