//! Structured parsing of comma-delimited multi-field replies.
//!
//! Replies such as the bulk status (`GLG`) are a tag followed by
//! comma-separated fields, many of them empty:
//!
//! ```text
//! GLG,01705000,FM,,0,,,,0,1,,422
//! ```
//!
//! The layout is undocumented and variable-length. Fields are named by
//! position after the tag; anything past the named positions is kept raw.
//! Where the position of a value is not reliable (the channel), a
//! [`ChannelFieldPolicy`] picks it.

use tracing::debug;

use scanlib_core::error::{Error, Result};

use crate::protocol::FIELD_SEPARATOR;

/// Name under which the tag itself is available from [`DelimitedReply::get`].
pub const FIELD_COMMAND: &str = "command";
/// Name of the raw frequency field (digits in units of 100 Hz).
pub const FIELD_RAW_FREQUENCY: &str = "raw_frequency";
/// Name of the modulation mode field.
pub const FIELD_MODE: &str = "mode";
/// Name under which the policy-selected channel is available.
pub const FIELD_CHANNEL: &str = "channel";

/// Divisor turning the raw frequency digits into MHz.
const FREQUENCY_DIVISOR: f64 = 10_000.0;

/// Convert a raw frequency field to MHz.
///
/// The device sends frequencies as digits in units of 100 Hz, so
/// `01705000` is 170.5 MHz. Anything other than a non-empty run of ASCII
/// digits yields `None`.
pub fn parse_frequency_mhz(raw: &str) -> Option<f64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().map(|v| v as f64 / FREQUENCY_DIVISOR)
}

// ---------------------------------------------------------------------------
// Channel heuristic
// ---------------------------------------------------------------------------

/// Picks which field of a split reply holds the channel.
///
/// `fields[0]` is the tag. Returns the index of the chosen field, or `None`
/// if no field qualifies.
pub trait ChannelFieldPolicy: Send + Sync + 'static {
    fn channel_index(&self, fields: &[&str]) -> Option<usize>;
}

/// Heuristic: the channel is the last non-empty field after the tag.
///
/// Holds for every bulk status reply seen so far, but nothing guarantees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastNonEmptyField;

impl ChannelFieldPolicy for LastNonEmptyField {
    fn channel_index(&self, fields: &[&str]) -> Option<usize> {
        fields
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|(_, f)| !f.is_empty())
            .map(|(i, _)| i)
    }
}

/// Channel at a fixed position, for devices whose layout is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedField(pub usize);

impl ChannelFieldPolicy for FixedField {
    fn channel_index(&self, fields: &[&str]) -> Option<usize> {
        match fields.get(self.0) {
            Some(f) if self.0 > 0 && !f.is_empty() => Some(self.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed reply
// ---------------------------------------------------------------------------

/// A reply split into its tag and fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedReply {
    fields: Vec<String>,
    names: Vec<String>,
    channel: Option<usize>,
}

impl DelimitedReply {
    /// The reply tag (field 0).
    pub fn tag(&self) -> &str {
        &self.fields[0]
    }

    /// All fields including the tag, empty ones preserved.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Field at `index` (0 is the tag), absent if missing or empty.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(String::as_str)
            .filter(|f| !f.is_empty())
    }

    /// Look up a field by name.
    ///
    /// `command` is the tag and `channel` is the policy-selected channel;
    /// every other name refers to the position it was given at parse time.
    /// Unknown names, missing fields and empty fields are all `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            FIELD_COMMAND => Some(self.tag()),
            FIELD_CHANNEL => self.channel(),
            _ => {
                let pos = self.names.iter().position(|n| n == name)?;
                self.field(pos + 1)
            }
        }
    }

    /// The raw frequency field converted to MHz.
    pub fn frequency_mhz(&self) -> Option<f64> {
        self.get(FIELD_RAW_FREQUENCY).and_then(parse_frequency_mhz)
    }

    pub fn mode(&self) -> Option<&str> {
        self.get(FIELD_MODE)
    }

    /// The channel as selected by the parser's [`ChannelFieldPolicy`].
    pub fn channel(&self) -> Option<&str> {
        self.channel.and_then(|i| self.field(i))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parser for tagged, comma-delimited replies.
pub struct ReplyParser {
    channel_policy: Box<dyn ChannelFieldPolicy>,
}

impl ReplyParser {
    /// A parser using [`LastNonEmptyField`] for the channel.
    pub fn new() -> Self {
        ReplyParser {
            channel_policy: Box::new(LastNonEmptyField),
        }
    }

    /// Replace the channel heuristic.
    pub fn with_channel_policy(mut self, policy: Box<dyn ChannelFieldPolicy>) -> Self {
        self.channel_policy = policy;
        self
    }

    /// Parse `response`, failing with [`Error::ParseMismatch`] if its tag is
    /// not `expected_tag`.
    ///
    /// `field_names` name the fields after the tag, in order.
    pub fn try_parse(
        &self,
        response: &str,
        expected_tag: &str,
        field_names: &[&str],
    ) -> Result<DelimitedReply> {
        let split: Vec<&str> = response.split(FIELD_SEPARATOR).collect();
        if split[0] != expected_tag {
            return Err(Error::ParseMismatch {
                expected: expected_tag.to_string(),
                found: split[0].to_string(),
            });
        }

        let channel = self.channel_policy.channel_index(&split);
        Ok(DelimitedReply {
            fields: split.into_iter().map(str::to_string).collect(),
            names: field_names.iter().map(|n| n.to_string()).collect(),
            channel,
        })
    }

    /// Parse `response`; a tag mismatch yields `None` and is only logged.
    pub fn parse(
        &self,
        response: &str,
        expected_tag: &str,
        field_names: &[&str],
    ) -> Option<DelimitedReply> {
        match self.try_parse(response, expected_tag, field_names) {
            Ok(reply) => Some(reply),
            Err(e) => {
                debug!(response, error = %e, "reply not parsed");
                None
            }
        }
    }
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse with the default channel heuristic; see [`ReplyParser::parse`].
pub fn parse_delimited_reply(
    response: &str,
    expected_tag: &str,
    field_names: &[&str],
) -> Option<DelimitedReply> {
    ReplyParser::new().parse(response, expected_tag, field_names)
}
