//! [`ServiceSet`] – the complete published surface of the bridge.
//!
//! | Service | Default name | Fed by |
//! |---|---|---|
//! | reply | `SCOPE/REPLY` | inbound loop, outbound channel errors |
//! | state | `SCOPE/STATE` | state topic |
//! | time increment | `SCOPE/TIME_INCREMENT` | time-increment topic |
//! | waveform *n* | `SCOPE/ACQUISITION/CH<n>` | waveform topic *n* |

use std::sync::Arc;

use crate::slot::{PublishedSlot, ServiceNotifier};

/// Default number of oscilloscope channels.
pub const DEFAULT_CHANNEL_COUNT: usize = 4;
/// Default reply buffer size in bytes.
pub const DEFAULT_REPLY_CAPACITY: usize = 2048;
/// Default state / time-increment buffer size in bytes.
pub const DEFAULT_STATE_CAPACITY: usize = 256;
/// Default per-channel waveform buffer size in bytes.
pub const DEFAULT_WAVEFORM_CAPACITY: usize = 130_000;

/// Names and sizes of the published services.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Prefix shared by every service and command name, e.g. `SCOPE`.
    pub prefix: String,
    pub channel_count: usize,
    pub reply_capacity: usize,
    pub state_capacity: usize,
    pub waveform_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            prefix: "SCOPE".to_string(),
            channel_count: DEFAULT_CHANNEL_COUNT,
            reply_capacity: DEFAULT_REPLY_CAPACITY,
            state_capacity: DEFAULT_STATE_CAPACITY,
            waveform_capacity: DEFAULT_WAVEFORM_CAPACITY,
        }
    }
}

impl ServiceConfig {
    pub fn reply_name(&self) -> String {
        format!("{}/REPLY", self.prefix)
    }

    pub fn state_name(&self) -> String {
        format!("{}/STATE", self.prefix)
    }

    pub fn time_increment_name(&self) -> String {
        format!("{}/TIME_INCREMENT", self.prefix)
    }

    /// Name of the waveform service for 1-based `channel`.
    pub fn waveform_name(&self, channel: usize) -> String {
        format!("{}/ACQUISITION/CH{channel}", self.prefix)
    }
}

/// Owns one [`PublishedSlot`] per published service.
#[derive(Debug)]
pub struct ServiceSet {
    reply: Arc<PublishedSlot>,
    state: Arc<PublishedSlot>,
    time_increment: Arc<PublishedSlot>,
    waveforms: Vec<Arc<PublishedSlot>>,
}

impl ServiceSet {
    /// Build every slot described by `config`, all reporting to `notifier`.
    pub fn new(config: &ServiceConfig, notifier: Arc<dyn ServiceNotifier>) -> Self {
        let slot = |name: String, capacity: usize| {
            Arc::new(PublishedSlot::new(name, capacity, Arc::clone(&notifier)))
        };
        Self {
            reply: slot(config.reply_name(), config.reply_capacity),
            state: slot(config.state_name(), config.state_capacity),
            time_increment: slot(config.time_increment_name(), config.state_capacity),
            waveforms: (1..=config.channel_count)
                .map(|ch| slot(config.waveform_name(ch), config.waveform_capacity))
                .collect(),
        }
    }

    pub fn reply(&self) -> &Arc<PublishedSlot> {
        &self.reply
    }

    pub fn state(&self) -> &Arc<PublishedSlot> {
        &self.state
    }

    pub fn time_increment(&self) -> &Arc<PublishedSlot> {
        &self.time_increment
    }

    /// Waveform slot for 1-based `channel`, or `None` when out of range.
    pub fn waveform(&self, channel: usize) -> Option<&Arc<PublishedSlot>> {
        channel.checked_sub(1).and_then(|i| self.waveforms.get(i))
    }

    pub fn channel_count(&self) -> usize {
        self.waveforms.len()
    }

    /// All slots: reply, state, time increment, then waveforms in channel order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PublishedSlot>> {
        [&self.reply, &self.state, &self.time_increment]
            .into_iter()
            .chain(self.waveforms.iter())
    }

    /// Look a slot up by its published name.
    pub fn find(&self, name: &str) -> Option<&Arc<PublishedSlot>> {
        self.iter().find(|s| s.name() == name)
    }
}
