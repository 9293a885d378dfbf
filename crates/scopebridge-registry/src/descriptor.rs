//! [`CommandDescriptor`] – declarative link between a public command name
//! and a backend verb.
//!
//! A descriptor names the command, declares the argument shape the registry
//! delivers, and says how the decoded arguments become the `params` map of
//! the outbound envelope.  Descriptors are immutable once registered.

use std::fmt;
use std::sync::Arc;

use scopebridge_types::{
    CommandArgs, CommandShape, OutboundEnvelope, Params, QUERY_MARKER, keys, verbs,
};
use serde_json::Value;

/// Fills an empty parameter map from decoded arguments.
///
/// The closure must agree with the descriptor's shape; arguments of any
/// other shape leave the map untouched.
pub type Populate = Arc<dyn Fn(&CommandArgs, &mut Params) + Send + Sync>;

/// How a descriptor turns arguments into an envelope.
#[derive(Clone)]
pub enum Route {
    /// Fixed backend verb with a populate function.
    Verb { verb: String, populate: Populate },
    /// Free-form instrument text, classified as query or write per call.
    RawPassthrough,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Verb { verb, .. } => f.debug_struct("Verb").field("verb", verb).finish(),
            Route::RawPassthrough => f.write_str("RawPassthrough"),
        }
    }
}

/// Classify raw instrument text: anything containing `?` is a query.
///
/// Returns the backend verb and the parameter key carrying the text.
pub fn classify_raw(text: &str) -> (&'static str, &'static str) {
    if text.contains(QUERY_MARKER) {
        (verbs::RAW_QUERY, keys::QUERY)
    } else {
        (verbs::RAW_WRITE, keys::COMMAND)
    }
}

/// One entry of the command table.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    public_name: String,
    shape: CommandShape,
    route: Route,
}

impl CommandDescriptor {
    /// Descriptor with an arbitrary populate function.
    pub fn custom<F>(
        public_name: impl Into<String>,
        shape: CommandShape,
        verb: impl Into<String>,
        populate: F,
    ) -> Self
    where
        F: Fn(&CommandArgs, &mut Params) + Send + Sync + 'static,
    {
        Self {
            public_name: public_name.into(),
            shape,
            route: Route::Verb {
                verb: verb.into(),
                populate: Arc::new(populate),
            },
        }
    }

    /// `I` command emitting `{field: int}`.
    pub fn int(public_name: impl Into<String>, verb: impl Into<String>, field: &str) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::Int, verb, move |args, params| {
            if let CommandArgs::Int(v) = args {
                params.insert(field.clone(), Value::from(*v));
            }
        })
    }

    /// `I` command emitting `{field: bool}`; any non-zero value is `true`.
    pub fn int_flag(public_name: impl Into<String>, verb: impl Into<String>, field: &str) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::Int, verb, move |args, params| {
            if let CommandArgs::Int(v) = args {
                params.insert(field.clone(), Value::Bool(*v != 0));
            }
        })
    }

    /// `F` command emitting `{field: float}`.
    pub fn float(public_name: impl Into<String>, verb: impl Into<String>, field: &str) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::Float, verb, move |args, params| {
            if let CommandArgs::Float(v) = args {
                params.insert(field.clone(), Value::from(*v));
            }
        })
    }

    /// `C` command emitting `{field: string}`.
    pub fn string(public_name: impl Into<String>, verb: impl Into<String>, field: &str) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::Str, verb, move |args, params| {
            if let CommandArgs::Str(s) = args {
                params.insert(field.clone(), Value::from(s.as_str()));
            }
        })
    }

    /// `I:1;F:1` command emitting `{channel: int, field: float}`.
    pub fn channel_float(
        public_name: impl Into<String>,
        verb: impl Into<String>,
        field: &str,
    ) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::ChannelValue, verb, move |args, params| {
            if let CommandArgs::ChannelValue { channel, value } = args {
                params.insert(keys::CHANNEL.to_string(), Value::from(*channel));
                params.insert(field.clone(), Value::from(*value));
            }
        })
    }

    /// `I:1;F:1` command emitting `{channel: int, field: bool}`; any
    /// non-zero value is `true`.
    pub fn channel_flag(
        public_name: impl Into<String>,
        verb: impl Into<String>,
        field: &str,
    ) -> Self {
        let field = field.to_string();
        Self::custom(public_name, CommandShape::ChannelValue, verb, move |args, params| {
            if let CommandArgs::ChannelValue { channel, value } = args {
                params.insert(keys::CHANNEL.to_string(), Value::from(*channel));
                params.insert(field.clone(), Value::Bool(*value != 0.0));
            }
        })
    }

    /// `C` passthrough of raw instrument text.
    pub fn raw(public_name: impl Into<String>) -> Self {
        Self {
            public_name: public_name.into(),
            shape: CommandShape::Str,
            route: Route::RawPassthrough,
        }
    }

    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    pub fn shape(&self) -> CommandShape {
        self.shape
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Backend verb, or `None` for raw passthrough where it depends on the
    /// text.
    pub fn verb(&self) -> Option<&str> {
        match &self.route {
            Route::Verb { verb, .. } => Some(verb),
            Route::RawPassthrough => None,
        }
    }

    /// Build the envelope for `args` using correlation number `seq`.
    pub fn envelope(&self, args: &CommandArgs, seq: u64) -> OutboundEnvelope {
        let mut params = Params::new();
        match &self.route {
            Route::Verb { verb, populate } => {
                populate(args, &mut params);
                OutboundEnvelope::command(format!("{verb}_{seq}"), verb.as_str(), params)
            }
            Route::RawPassthrough => {
                let id = format!("raw_cmd_{seq}");
                let CommandArgs::Str(text) = args else {
                    return OutboundEnvelope::command(id, verbs::RAW_WRITE, params);
                };
                let (verb, key) = classify_raw(text);
                params.insert(key.to_string(), Value::String(text.clone()));
                OutboundEnvelope::command(id, verb, params)
            }
        }
    }
}
