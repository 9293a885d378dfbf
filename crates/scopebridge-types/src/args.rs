//! Typed arguments of an inbound registry command.
//!
//! The registry delivers each command as a byte buffer laid out according to
//! a format string declared at registration time.  Four layouts are used:
//!
//! | [`CommandShape`] | Format | Layout |
//! |---|---|---|
//! | `Int` | `I` | 4-byte little-endian `i32` |
//! | `Float` | `F` | 4-byte little-endian `f32` |
//! | `Str` | `C` | NUL-terminated (or unterminated) UTF-8 text |
//! | `ChannelValue` | `I:1;F:1` | `i32` channel followed by `f32` value |

use std::fmt;

use crate::error::BridgeError;

/// Wire shape a command declares to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandShape {
    Int,
    Float,
    Str,
    ChannelValue,
}

impl CommandShape {
    /// Registry format string for this shape.
    pub fn format(self) -> &'static str {
        match self {
            CommandShape::Int => "I",
            CommandShape::Float => "F",
            CommandShape::Str => "C",
            CommandShape::ChannelValue => "I:1;F:1",
        }
    }
}

impl fmt::Display for CommandShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format())
    }
}

/// Decoded fields of one inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArgs {
    Int(i32),
    Float(f32),
    Str(String),
    ChannelValue { channel: i32, value: f32 },
}

impl CommandArgs {
    /// The shape these arguments satisfy.
    pub fn shape(&self) -> CommandShape {
        match self {
            CommandArgs::Int(_) => CommandShape::Int,
            CommandArgs::Float(_) => CommandShape::Float,
            CommandArgs::Str(_) => CommandShape::Str,
            CommandArgs::ChannelValue { .. } => CommandShape::ChannelValue,
        }
    }

    /// Decode the registry's native byte layout for `shape`.
    ///
    /// Trailing bytes beyond the declared layout are ignored.  Strings stop
    /// at the first NUL and invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArguments`] when `bytes` is shorter than
    /// the numeric layout requires.
    pub fn decode(shape: CommandShape, bytes: &[u8]) -> Result<Self, BridgeError> {
        match shape {
            CommandShape::Int => Ok(CommandArgs::Int(i32::from_le_bytes(word(shape, bytes, 0)?))),
            CommandShape::Float => {
                Ok(CommandArgs::Float(f32::from_le_bytes(word(shape, bytes, 0)?)))
            }
            CommandShape::Str => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Ok(CommandArgs::Str(String::from_utf8_lossy(&bytes[..end]).into_owned()))
            }
            CommandShape::ChannelValue => Ok(CommandArgs::ChannelValue {
                channel: i32::from_le_bytes(word(shape, bytes, 0)?),
                value: f32::from_le_bytes(word(shape, bytes, 4)?),
            }),
        }
    }

    /// Parse whitespace-separated text for `shape`, as typed at a console.
    ///
    /// For [`CommandShape::Str`] the whole trimmed text is the argument, so
    /// embedded spaces survive (`CH1:SCALE 1.0`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArguments`] when a numeric field does not
    /// parse or the token count is wrong.
    pub fn parse_text(shape: CommandShape, text: &str) -> Result<Self, BridgeError> {
        let invalid = |details: String| BridgeError::InvalidArguments { shape, details };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match shape {
            CommandShape::Str => Ok(CommandArgs::Str(text.trim().to_string())),
            CommandShape::Int | CommandShape::Float => {
                let [token] = tokens.as_slice() else {
                    return Err(invalid(format!("expected 1 value, got {}", tokens.len())));
                };
                if shape == CommandShape::Int {
                    token
                        .parse::<i32>()
                        .map(CommandArgs::Int)
                        .map_err(|e| invalid(format!("'{token}': {e}")))
                } else {
                    token
                        .parse::<f32>()
                        .map(CommandArgs::Float)
                        .map_err(|e| invalid(format!("'{token}': {e}")))
                }
            }
            CommandShape::ChannelValue => {
                let [channel, value] = tokens.as_slice() else {
                    return Err(invalid(format!(
                        "expected <channel> <value>, got {} token(s)",
                        tokens.len()
                    )));
                };
                Ok(CommandArgs::ChannelValue {
                    channel: channel
                        .parse::<i32>()
                        .map_err(|e| invalid(format!("channel '{channel}': {e}")))?,
                    value: value
                        .parse::<f32>()
                        .map_err(|e| invalid(format!("value '{value}': {e}")))?,
                })
            }
        }
    }

    /// Encode into the registry's native byte layout.  Inverse of
    /// [`CommandArgs::decode`]; strings gain a NUL terminator.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CommandArgs::Int(v) => v.to_le_bytes().to_vec(),
            CommandArgs::Float(v) => v.to_le_bytes().to_vec(),
            CommandArgs::Str(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
                out
            }
            CommandArgs::ChannelValue { channel, value } => {
                let mut out = channel.to_le_bytes().to_vec();
                out.extend_from_slice(&value.to_le_bytes());
                out
            }
        }
    }
}

// Read the 4-byte word at `offset`.
fn word(shape: CommandShape, bytes: &[u8], offset: usize) -> Result<[u8; 4], BridgeError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|w| w.try_into().ok())
        .ok_or_else(|| BridgeError::InvalidArguments {
            shape,
            details: format!("expected at least {} bytes, got {}", offset + 4, bytes.len()),
        })
}
