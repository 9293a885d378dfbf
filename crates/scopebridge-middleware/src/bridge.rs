//! [`Bridge`] – owns both transport loops and the outbound channel.
//!
//! ```text
//!  registry ──▶ OutboundChannel ──▶ ROUTER ──▶ backend
//!                     ▲                │
//!                PeerSession ◀── InboundLoop ──▶ reply slot
//!
//!  backend ──▶ PUB ──▶ SUB ──▶ SubscriptionLoop ──▶ state / waveform slots
//! ```
//!
//! Both loops run as Tokio tasks sharing one running flag.  Clearing the
//! flag stops them after their next poll; [`Bridge::shutdown`] does that and
//! waits for both tasks before the sockets are released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopebridge_types::BridgeError;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

use crate::inbound::{DEFAULT_INBOUND_POLL, InboundLoop};
use crate::outbound::OutboundChannel;
use crate::services::ServiceSet;
use crate::subscription::{DEFAULT_SUBSCRIPTION_POLL, SubscriptionLoop, TopicConfig, TopicRouter};
use crate::transport::{FanoutTransport, RouterTransport};
use crate::zmq_transport::{ZmqRouter, ZmqSubscriber};

/// Endpoints, topics and poll timing of a [`Bridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Endpoint the `ROUTER` socket binds, e.g. `tcp://*:5555`.
    pub router_endpoint: String,
    /// Endpoint the `SUB` socket connects to, e.g. `tcp://localhost:5558`.
    pub sub_endpoint: String,
    pub topics: TopicConfig,
    pub inbound_poll: Duration,
    pub subscription_poll: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            router_endpoint: "tcp://*:5555".to_string(),
            sub_endpoint: "tcp://localhost:5558".to_string(),
            topics: TopicConfig::default(),
            inbound_poll: DEFAULT_INBOUND_POLL,
            subscription_poll: DEFAULT_SUBSCRIPTION_POLL,
        }
    }
}

/// Running bridge.
pub struct Bridge {
    outbound: OutboundChannel,
    services: Arc<ServiceSet>,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Bind the `ROUTER` socket, connect the `SUB` socket and start both
    /// loops.  Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if either socket cannot be set up.
    /// Nothing is started in that case.
    pub fn connect(config: &BridgeConfig, services: Arc<ServiceSet>) -> Result<Self, BridgeError> {
        let context = zmq::Context::new();
        let router = ZmqRouter::bind(&context, &config.router_endpoint)?;
        let filters = TopicRouter::new(config.topics.clone(), Arc::clone(&services)).subscriptions();
        let subscriber = ZmqSubscriber::connect(&context, &config.sub_endpoint, &filters)?;
        Ok(Self::start(config, services, Arc::new(router), subscriber))
    }

    /// Start both loops over caller-supplied transports.
    pub fn start<F>(
        config: &BridgeConfig,
        services: Arc<ServiceSet>,
        router: Arc<dyn RouterTransport>,
        fanout: F,
    ) -> Self
    where
        F: FanoutTransport + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let outbound = OutboundChannel::new(Arc::clone(&router), Arc::clone(services.reply()));

        let inbound = InboundLoop::new(
            router,
            Arc::clone(outbound.session()),
            Arc::clone(services.reply()),
        )
        .with_poll_interval(config.inbound_poll);
        let subscription = SubscriptionLoop::new(
            fanout,
            TopicRouter::new(config.topics.clone(), Arc::clone(&services)),
        )
        .with_poll_interval(config.subscription_poll);

        let tasks = vec![
            tokio::spawn(
                inbound
                    .run(Arc::clone(&running))
                    .instrument(info_span!("inbound_loop")),
            ),
            tokio::spawn(
                subscription
                    .run(Arc::clone(&running))
                    .instrument(info_span!("subscription_loop")),
            ),
        ];
        info!(
            router = %config.router_endpoint,
            sub = %config.sub_endpoint,
            channels = services.channel_count(),
            "bridge started"
        );

        Self {
            outbound,
            services,
            running,
            tasks,
        }
    }

    /// Handle used by command dispatchers.
    pub fn outbound(&self) -> &OutboundChannel {
        &self.outbound
    }

    pub fn services(&self) -> &Arc<ServiceSet> {
        &self.services
    }

    /// Shared running flag; clearing it stops both loops.
    pub fn running(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop both loops and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.running.store(false, Ordering::Release);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "bridge loop ended abnormally");
            }
        }
        info!("bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceConfig;
    use crate::session::PeerIdentity;
    use crate::slot::TracingNotifier;
    use crate::transport::{MemoryFanout, MemoryRouter};
    use scopebridge_types::{OutboundEnvelope, Params};

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            inbound_poll: Duration::from_millis(2),
            subscription_poll: Duration::from_millis(2),
            ..BridgeConfig::default()
        }
    }

    fn services() -> Arc<ServiceSet> {
        Arc::new(ServiceSet::new(&ServiceConfig::default(), Arc::new(TracingNotifier)))
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn handshake_then_command_then_reply() {
        let router = Arc::new(MemoryRouter::new());
        let fanout = MemoryFanout::new();
        let bridge = Bridge::start(&fast_config(), services(), router.clone(), fanout.clone());

        router.push_from_peer(b"backend", r#"{"type":"handshake"}"#);
        wait_for(|| bridge.outbound().is_connected()).await;
        assert_eq!(
            bridge.outbound().session().current(),
            Some(PeerIdentity::new(b"backend".to_vec()))
        );

        let env = OutboundEnvelope::command("raw_query_0", "raw_query", Params::new());
        bridge.outbound().send(&env).unwrap();
        assert_eq!(router.sent()[0][0], b"backend");

        router.push_from_peer(b"backend", r#"{"type":"reply","status":"ok","payload":"ACME,DSO"}"#);
        let reply = Arc::clone(bridge.services().reply());
        wait_for(|| reply.text() == "ACME,DSO").await;

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn fanout_reaches_slots() {
        let fanout = MemoryFanout::new();
        let bridge = Bridge::start(
            &fast_config(),
            services(),
            Arc::new(MemoryRouter::new()),
            fanout.clone(),
        );

        fanout.publish("backend_state", "TRIGGERED");
        fanout.publish("waveform_ch2", "0.0,0.5");
        let services = Arc::clone(bridge.services());
        wait_for(|| services.state().text() == "TRIGGERED").await;
        wait_for(|| services.waveform(2).map(|s| s.text()).as_deref() == Some("0.0,0.5")).await;

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_clears_flag_and_joins() {
        let bridge = Bridge::start(
            &fast_config(),
            services(),
            Arc::new(MemoryRouter::new()),
            MemoryFanout::new(),
        );
        let running = Arc::clone(bridge.running());
        assert!(bridge.is_running());

        tokio::time::timeout(Duration::from_secs(2), bridge.shutdown())
            .await
            .expect("shutdown should join both loops");
        assert!(!running.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn drop_stops_loops() {
        let bridge = Bridge::start(
            &fast_config(),
            services(),
            Arc::new(MemoryRouter::new()),
            MemoryFanout::new(),
        );
        let running = Arc::clone(bridge.running());
        drop(bridge);
        assert!(!running.load(Ordering::Acquire));
    }
}
