//! Configuration vault – reads/writes `~/.scopebridge/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scopebridge_middleware::services::{
    DEFAULT_CHANNEL_COUNT, DEFAULT_REPLY_CAPACITY, DEFAULT_STATE_CAPACITY,
    DEFAULT_WAVEFORM_CAPACITY,
};
use scopebridge_middleware::{BridgeConfig, ServiceConfig, TopicConfig};
use scopebridge_types::BridgeError;

/// Persisted bridge configuration stored in `~/.scopebridge/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name under which the bridge announces itself.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Endpoint the `ROUTER` socket binds for commands and replies.
    #[serde(default = "default_router_endpoint")]
    pub router_endpoint: String,

    /// Backend `PUB` endpoint the `SUB` socket connects to.
    #[serde(default = "default_sub_endpoint")]
    pub sub_endpoint: String,

    /// Prefix of every command and service name.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,

    #[serde(default = "default_channel_count")]
    pub channel_count: usize,

    #[serde(default = "default_reply_capacity")]
    pub reply_capacity: usize,

    #[serde(default = "default_state_capacity")]
    pub state_capacity: usize,

    #[serde(default = "default_waveform_capacity")]
    pub waveform_capacity: usize,

    #[serde(default = "default_state_topic")]
    pub state_topic: String,

    #[serde(default = "default_time_increment_topic")]
    pub time_increment_topic: String,

    #[serde(default = "default_waveform_topic_prefix")]
    pub waveform_topic_prefix: String,

    #[serde(default = "default_inbound_poll_ms")]
    pub inbound_poll_ms: u64,

    #[serde(default = "default_subscription_poll_ms")]
    pub subscription_poll_ms: u64,
}

fn default_server_name() -> String {
    "SCOPE_BRIDGE".to_string()
}
fn default_router_endpoint() -> String {
    "tcp://*:5555".to_string()
}
fn default_sub_endpoint() -> String {
    "tcp://localhost:5558".to_string()
}
fn default_service_prefix() -> String {
    "SCOPE".to_string()
}
fn default_channel_count() -> usize {
    DEFAULT_CHANNEL_COUNT
}
fn default_reply_capacity() -> usize {
    DEFAULT_REPLY_CAPACITY
}
fn default_state_capacity() -> usize {
    DEFAULT_STATE_CAPACITY
}
fn default_waveform_capacity() -> usize {
    DEFAULT_WAVEFORM_CAPACITY
}
fn default_state_topic() -> String {
    TopicConfig::default().state
}
fn default_time_increment_topic() -> String {
    TopicConfig::default().time_increment
}
fn default_waveform_topic_prefix() -> String {
    TopicConfig::default().waveform_prefix
}
fn default_inbound_poll_ms() -> u64 {
    100
}
fn default_subscription_poll_ms() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            router_endpoint: default_router_endpoint(),
            sub_endpoint: default_sub_endpoint(),
            service_prefix: default_service_prefix(),
            channel_count: default_channel_count(),
            reply_capacity: default_reply_capacity(),
            state_capacity: default_state_capacity(),
            waveform_capacity: default_waveform_capacity(),
            state_topic: default_state_topic(),
            time_increment_topic: default_time_increment_topic(),
            waveform_topic_prefix: default_waveform_topic_prefix(),
            inbound_poll_ms: default_inbound_poll_ms(),
            subscription_poll_ms: default_subscription_poll_ms(),
        }
    }
}

impl Config {
    /// Names and sizes of the published services.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            prefix: self.service_prefix.clone(),
            channel_count: self.channel_count,
            reply_capacity: self.reply_capacity,
            state_capacity: self.state_capacity,
            waveform_capacity: self.waveform_capacity,
        }
    }

    /// Endpoints, topics and poll timing of the bridge loops.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            router_endpoint: self.router_endpoint.clone(),
            sub_endpoint: self.sub_endpoint.clone(),
            topics: TopicConfig {
                state: self.state_topic.clone(),
                time_increment: self.time_increment_topic.clone(),
                waveform_prefix: self.waveform_topic_prefix.clone(),
            },
            inbound_poll: Duration::from_millis(self.inbound_poll_ms),
            subscription_poll: Duration::from_millis(self.subscription_poll_ms),
        }
    }
}

/// Return the path to `~/.scopebridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".scopebridge").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, BridgeError> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `SCOPEBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SCOPEBRIDGE_ROUTER_ENDPOINT` | `router_endpoint` |
/// | `SCOPEBRIDGE_SUB_ENDPOINT` | `sub_endpoint` |
/// | `SCOPEBRIDGE_SERVICE_PREFIX` | `service_prefix` |
/// | `SCOPEBRIDGE_CHANNEL_COUNT` | `channel_count` (ignored unless numeric) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SCOPEBRIDGE_ROUTER_ENDPOINT") {
        cfg.router_endpoint = v;
    }
    if let Ok(v) = std::env::var("SCOPEBRIDGE_SUB_ENDPOINT") {
        cfg.sub_endpoint = v;
    }
    if let Ok(v) = std::env::var("SCOPEBRIDGE_SERVICE_PREFIX") {
        cfg.service_prefix = v;
    }
    if let Ok(v) = std::env::var("SCOPEBRIDGE_CHANNEL_COUNT")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.channel_count = n;
    }
}

/// Save the config to disk, creating `~/.scopebridge/` if necessary.
pub fn save(cfg: &Config) -> Result<(), BridgeError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Config(format!("failed to create config directory: {e}")))?;
        // Owner-only directory (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                BridgeError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| BridgeError::Config(format!("failed to write {}: {e}", path.display()));
    // Owner-only file (rw-------).
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
