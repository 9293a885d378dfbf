//! [`SubscriptionLoop`] – backend state fan-out into published slots.
//!
//! Each `[topic][payload]` message is routed by [`TopicRouter`]:
//!
//! - the state and time-increment topics match exactly;
//! - waveform topics match by prefix, and the suffix is a 1-based channel
//!   index checked against the configured channel count.
//!
//! Anything that does not route is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopebridge_types::BridgeError;
use tracing::{info, trace, warn};

use crate::services::ServiceSet;
use crate::slot::PublishedSlot;
use crate::transport::{FanoutTransport, MAX_MESSAGES_PER_POLL};

/// Sleep between polls when no message is waiting.
pub const DEFAULT_SUBSCRIPTION_POLL: Duration = Duration::from_millis(10);

/// Topic names published by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub state: String,
    pub time_increment: String,
    /// Prefix of the per-channel topics; `waveform_ch` gives `waveform_ch1`…
    pub waveform_prefix: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            state: "backend_state".to_string(),
            time_increment: "waveform_timediv".to_string(),
            waveform_prefix: "waveform_ch".to_string(),
        }
    }
}

/// Maps topics onto the slots of a [`ServiceSet`].
#[derive(Debug)]
pub struct TopicRouter {
    topics: TopicConfig,
    services: Arc<ServiceSet>,
}

impl TopicRouter {
    pub fn new(topics: TopicConfig, services: Arc<ServiceSet>) -> Self {
        Self { topics, services }
    }

    /// Subscription filters to install on the fan-out socket.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut filters = vec![self.topics.state.clone(), self.topics.time_increment.clone()];
        filters.extend(
            (1..=self.services.channel_count())
                .map(|ch| format!("{}{ch}", self.topics.waveform_prefix)),
        );
        filters
    }

    /// Slot bound to `topic`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::TopicIndex`] for a waveform topic whose suffix is not
    ///   a number or is outside `1..=channel_count`.
    /// - [`BridgeError::UnknownTopic`] for anything else that matches no
    ///   binding.
    pub fn resolve(&self, topic: &str) -> Result<&Arc<PublishedSlot>, BridgeError> {
        if topic == self.topics.state {
            return Ok(self.services.state());
        }
        if topic == self.topics.time_increment {
            return Ok(self.services.time_increment());
        }
        let Some(suffix) = topic.strip_prefix(self.topics.waveform_prefix.as_str()) else {
            return Err(BridgeError::UnknownTopic(topic.to_string()));
        };
        let index_error = |reason: String| BridgeError::TopicIndex {
            topic: topic.to_string(),
            reason,
        };
        let channel = suffix
            .parse::<usize>()
            .map_err(|e| index_error(format!("suffix '{suffix}': {e}")))?;
        self.services.waveform(channel).ok_or_else(|| {
            index_error(format!(
                "channel {channel} outside 1..={}",
                self.services.channel_count()
            ))
        })
    }

    /// Route one fan-out message.  Returns the slot name it updated.
    ///
    /// # Errors
    ///
    /// [`BridgeError::MalformedEnvelope`] when the message is not exactly
    /// two frames or the topic is not UTF-8, otherwise as
    /// [`TopicRouter::resolve`].
    pub fn route(&self, frames: &[Vec<u8>]) -> Result<&str, BridgeError> {
        let [topic, payload] = frames else {
            return Err(BridgeError::MalformedEnvelope(format!(
                "expected [topic][payload], got {} frame(s)",
                frames.len()
            )));
        };
        let topic = std::str::from_utf8(topic)
            .map_err(|_| BridgeError::UnknownTopic(String::from_utf8_lossy(topic).into_owned()))?;
        let slot = self.resolve(topic)?;
        let stored = slot.update(payload);
        trace!(topic, service = slot.name(), bytes = stored, "topic routed");
        Ok(slot.name())
    }
}

/// Polls a [`FanoutTransport`] and writes every routed value.
pub struct SubscriptionLoop<F> {
    transport: F,
    router: TopicRouter,
    poll_interval: Duration,
}

impl<F: FanoutTransport> SubscriptionLoop<F> {
    pub fn new(transport: F, router: TopicRouter) -> Self {
        Self {
            transport,
            router,
            poll_interval: DEFAULT_SUBSCRIPTION_POLL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Route up to [`MAX_MESSAGES_PER_POLL`] waiting messages.  Routing
    /// failures are logged and do not stop the drain.  Returns how many
    /// messages were received.
    ///
    /// # Errors
    ///
    /// Propagates the first transport receive error.
    pub fn poll_once(&mut self) -> Result<usize, BridgeError> {
        let mut received = 0;
        while received < MAX_MESSAGES_PER_POLL {
            let Some(frames) = self.transport.try_recv_frames()? else {
                break;
            };
            received += 1;
            if let Err(e) = self.router.route(&frames) {
                warn!(error = %e, "fan-out message dropped");
            }
        }
        Ok(received)
    }

    /// Poll until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            topics = ?self.router.subscriptions(),
            "subscription loop started"
        );
        while running.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => tokio::task::yield_now().await,
                Err(e) => {
                    warn!(error = %e, "fan-out receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        info!("subscription loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceConfig;
    use crate::slot::TracingNotifier;
    use crate::transport::{Frames, MemoryFanout};

    fn router() -> TopicRouter {
        let services = ServiceSet::new(&ServiceConfig::default(), Arc::new(TracingNotifier));
        TopicRouter::new(TopicConfig::default(), Arc::new(services))
    }

    fn msg(topic: &str, payload: &str) -> Vec<Vec<u8>> {
        vec![topic.as_bytes().to_vec(), payload.as_bytes().to_vec()]
    }

    /// Publisher that always has another state update waiting.
    struct Flood;

    impl FanoutTransport for Flood {
        fn try_recv_frames(&mut self) -> Result<Option<Frames>, BridgeError> {
            Ok(Some(msg("backend_state", "RUN")))
        }
    }

    #[test]
    fn subscriptions_cover_every_channel() {
        assert_eq!(
            router().subscriptions(),
            [
                "backend_state",
                "waveform_timediv",
                "waveform_ch1",
                "waveform_ch2",
                "waveform_ch3",
                "waveform_ch4"
            ]
        );
    }

    #[test]
    fn scalar_topics_match_exactly() {
        let r = router();
        assert_eq!(r.route(&msg("backend_state", "ARMED")).unwrap(), "SCOPE/STATE");
        assert_eq!(r.route(&msg("waveform_timediv", "1e-6")).unwrap(), "SCOPE/TIME_INCREMENT");
        assert_eq!(r.services.state().text(), "ARMED");
        assert_eq!(r.services.time_increment().text(), "1e-6");
    }

    #[test]
    fn waveform_topic_updates_only_its_channel() {
        let r = router();
        r.route(&msg("waveform_ch3", "0.1,0.2,0.3")).unwrap();

        assert_eq!(r.services.waveform(3).unwrap().text(), "0.1,0.2,0.3");
        for ch in [1, 2, 4] {
            assert!(r.services.waveform(ch).unwrap().is_empty(), "channel {ch} touched");
        }
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let r = router();
        let err = r.route(&msg("waveform_ch9", "x")).unwrap_err();
        assert!(matches!(err, BridgeError::TopicIndex { .. }));
        assert!(matches!(r.resolve("waveform_ch0"), Err(BridgeError::TopicIndex { .. })));
        assert!(r.services.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn non_numeric_suffix_is_rejected() {
        let r = router();
        assert!(matches!(r.resolve("waveform_chX"), Err(BridgeError::TopicIndex { .. })));
        assert!(matches!(r.resolve("waveform_ch"), Err(BridgeError::TopicIndex { .. })));
    }

    #[test]
    fn unknown_topic_and_bad_framing_are_rejected() {
        let r = router();
        assert!(matches!(r.resolve("heartbeat"), Err(BridgeError::UnknownTopic(_))));
        let three = vec![b"backend_state".to_vec(), b"a".to_vec(), b"b".to_vec()];
        assert!(matches!(r.route(&three), Err(BridgeError::MalformedEnvelope(_))));
    }

    #[test]
    fn poll_once_keeps_going_after_bad_topic() {
        let fanout = MemoryFanout::new();
        fanout.publish("waveform_ch9", "dropped");
        fanout.publish("backend_state", "RUNNING");

        let mut sub = SubscriptionLoop::new(fanout.clone(), router());
        assert_eq!(sub.poll_once().unwrap(), 2);
        assert_eq!(sub.router.services.state().text(), "RUNNING");
    }

    #[tokio::test]
    async fn run_routes_until_stopped() {
        let fanout = MemoryFanout::new();
        let r = router();
        let services = Arc::clone(&r.services);
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(
            SubscriptionLoop::new(fanout.clone(), r)
                .with_poll_interval(Duration::from_millis(2))
                .run(Arc::clone(&running)),
        );

        fanout.publish("waveform_ch1", "1,2,3");
        tokio::time::timeout(Duration::from_secs(2), async {
            while services.waveform(1).map(|s| s.text()).as_deref() != Some("1,2,3") {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("waveform should be published");

        running.store(false, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop")
            .unwrap();
    }

    #[test]
    fn poll_once_stops_at_batch_limit() {
        let mut sub = SubscriptionLoop::new(Flood, router());
        assert_eq!(sub.poll_once().unwrap(), MAX_MESSAGES_PER_POLL);
        assert_eq!(sub.router.services.state().text(), "RUN");
    }

    #[tokio::test]
    async fn run_stops_while_publisher_never_goes_quiet() {
        let r = router();
        let services = Arc::clone(&r.services);
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(SubscriptionLoop::new(Flood, r).run(Arc::clone(&running)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(services.state().text(), "RUN");

        running.store(false, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop under continuous traffic")
            .unwrap();
    }
}
