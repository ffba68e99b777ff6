//! Typed view of the bulk status (`GLG`) reply.
//!
//! Only frequency, mode and channel are extracted. The remaining positions
//! of the reply vary between firmware states and are left in
//! [`StatusRecord::fields`] untouched.

use scanlib_text_io::reply::{DelimitedReply, ReplyParser, FIELD_MODE, FIELD_RAW_FREQUENCY};

use crate::commands::CMD_BULK_STATUS;

/// Tag of a bulk status reply.
pub const BULK_STATUS_TAG: &str = CMD_BULK_STATUS;

/// Named positions of a bulk status reply after the tag.
pub const BULK_STATUS_FIELDS: &[&str] = &[FIELD_RAW_FREQUENCY, FIELD_MODE];

/// What the scanner is currently tuned to.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    /// Frequency digits as sent, in units of 100 Hz.
    pub raw_frequency: Option<String>,
    /// Frequency in MHz, if the raw field was numeric.
    pub frequency_mhz: Option<f64>,
    /// Modulation (`AM`, `FM`, `NFM`, ...).
    pub mode: Option<String>,
    /// Channel, chosen by the parser's channel heuristic.
    pub channel: Option<String>,
    /// Every field of the reply, tag included.
    pub fields: Vec<String>,
    /// `true` if the reply may be cut short (its continuation read timed out).
    pub partial: bool,
}

impl StatusRecord {
    /// Build a record from an already parsed reply.
    pub fn from_reply(reply: &DelimitedReply, partial: bool) -> Self {
        StatusRecord {
            raw_frequency: reply.get(FIELD_RAW_FREQUENCY).map(str::to_string),
            frequency_mhz: reply.frequency_mhz(),
            mode: reply.mode().map(str::to_string),
            channel: reply.channel().map(str::to_string),
            fields: reply.fields().to_vec(),
            partial,
        }
    }

    /// Whether the scanner reported no frequency (idle between channels).
    pub fn is_idle(&self) -> bool {
        self.raw_frequency.is_none()
    }
}

/// Parse bulk status text; `None` if it is not a `GLG` reply.
pub fn parse_status(parser: &ReplyParser, text: &str, partial: bool) -> Option<StatusRecord> {
    parser
        .parse(text, BULK_STATUS_TAG, BULK_STATUS_FIELDS)
        .map(|reply| StatusRecord::from_reply(&reply, partial))
}
