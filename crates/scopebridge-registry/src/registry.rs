//! [`CommandRegistry`] – the command surface exposed to registry clients.
//!
//! [`command_table`] is the single declarative list of supported commands.
//! Adding a command means adding one row there; nothing else changes.

use std::collections::HashMap;

use scopebridge_middleware::OutboundChannel;
use scopebridge_types::{BridgeError, verbs};
use tracing::info;

use crate::descriptor::CommandDescriptor;
use crate::dispatcher::CommandDispatcher;

/// Every supported command, with names under `prefix` (e.g. `SCOPE`).
pub fn command_table(prefix: &str) -> Vec<CommandDescriptor> {
    let name = |suffix: &str| format!("{prefix}/{suffix}");
    vec![
        CommandDescriptor::raw(name("RAW")),
        CommandDescriptor::channel_flag(
            name("CHANNEL/SET_ENABLED"),
            verbs::SET_CHANNEL_ENABLED,
            "enabled",
        ),
        CommandDescriptor::channel_float(
            name("CHANNEL/SET_SCALE"),
            verbs::SET_CHANNEL_SCALE,
            "scale",
        ),
        CommandDescriptor::int(name("TRIGGER/SET_CHANNEL"), verbs::SET_TRIGGER_CHANNEL, "channel"),
        CommandDescriptor::string(name("TRIGGER/SET_SLOPE"), verbs::SET_TRIGGER_SLOPE, "slope"),
        CommandDescriptor::float(name("TRIGGER/SET_LEVEL"), verbs::SET_TRIGGER_LEVEL, "level"),
        CommandDescriptor::string(
            name("ACQUISITION/SET_MODE"),
            verbs::SET_ACQUISITION_MODE,
            "mode",
        ),
        CommandDescriptor::float(
            name("ACQUISITION/SET_TIMEDIV"),
            verbs::SET_ACQUISITION_TIMEDIV,
            "timediv",
        ),
        CommandDescriptor::int(
            name("ACQUISITION/SET_TIMEOUT"),
            verbs::SET_ACQUISITION_TIMEOUT,
            "timeout",
        ),
        CommandDescriptor::int_flag(
            name("ACQUISITION/IGNORE_TIMEOUT"),
            verbs::SET_ACQUISITION_IGNORE,
            "ignore",
        ),
    ]
}

/// Dispatchers keyed by public name, in registration order.
#[derive(Debug)]
pub struct CommandRegistry {
    channel: OutboundChannel,
    dispatchers: Vec<CommandDispatcher>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Empty registry whose dispatchers will send through `channel`.
    pub fn new(channel: OutboundChannel) -> Self {
        Self {
            channel,
            dispatchers: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registry holding one dispatcher per row of [`command_table`].
    pub fn bootstrap(channel: OutboundChannel, prefix: &str) -> Self {
        let mut registry = Self::new(channel);
        for descriptor in command_table(prefix) {
            registry.register(descriptor);
        }
        info!(prefix, commands = registry.len(), "command registry ready");
        registry
    }

    /// Register a command.  A descriptor with an existing public name
    /// replaces the previous dispatcher, counter included.
    pub fn register(&mut self, descriptor: CommandDescriptor) {
        let name = descriptor.public_name().to_string();
        let dispatcher = CommandDispatcher::new(descriptor, self.channel.clone());
        match self.by_name.get(&name) {
            Some(&i) => self.dispatchers[i] = dispatcher,
            None => {
                self.by_name.insert(name, self.dispatchers.len());
                self.dispatchers.push(dispatcher);
            }
        }
    }

    /// Channel every dispatcher sends through.
    pub fn channel(&self) -> &OutboundChannel {
        &self.channel
    }

    pub fn get(&self, name: &str) -> Option<&CommandDispatcher> {
        self.by_name.get(name).map(|&i| &self.dispatchers[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDispatcher> {
        self.dispatchers.iter()
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Invoke `name` with registry-native argument bytes.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownCommand`] for an unregistered name, otherwise
    /// as [`CommandDispatcher::invoke`].
    pub fn invoke(&self, name: &str, bytes: &[u8]) -> Result<(), BridgeError> {
        self.lookup(name)?.invoke(bytes)
    }

    /// Invoke `name` with console text arguments.
    ///
    /// # Errors
    ///
    /// As [`CommandRegistry::invoke`].
    pub fn invoke_text(&self, name: &str, text: &str) -> Result<(), BridgeError> {
        self.lookup(name)?.invoke_text(text)
    }

    fn lookup(&self, name: &str) -> Result<&CommandDispatcher, BridgeError> {
        self.get(name)
            .ok_or_else(|| BridgeError::UnknownCommand(name.to_string()))
    }
}
