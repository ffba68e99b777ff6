//! Uniden command builders and reply helpers.
//!
//! Builders return the command text without the `\r` terminator; the
//! session parses and frames it. All functions are pure.
//!
//! # Reply shape
//!
//! Replies echo the verb followed by comma-separated values:
//!
//! ```text
//! MDL      -> MDL,UBC125XLT
//! VOL      -> VOL,8
//! RF 422   -> RF,01705000
//! KEY,PSE  -> KEY,OK
//! ```
//!
//! Commands the scanner does not understand are answered with `ERR`, and
//! commands it cannot accept in its current mode with `NG`.

/// Model query.
pub const CMD_MODEL: &str = "MDL";
/// Firmware version query.
pub const CMD_VERSION: &str = "VER";
/// Volume level query.
pub const CMD_VOLUME: &str = "VOL";
/// Battery query.
pub const CMD_BATTERY: &str = "BAT";
/// Display status query.
pub const CMD_STATUS: &str = "STS";
/// Bulk reception status query.
pub const CMD_BULK_STATUS: &str = "GLG";
/// Squelch level query.
pub const CMD_SQUELCH: &str = "SQ";
/// Backlight setting query.
pub const CMD_BACKLIGHT: &str = "BLT";
/// Channel detail query.
pub const CMD_CHANNEL_DETAIL: &str = "CIN";
/// Keypress simulation.
pub const CMD_KEY: &str = "KEY";
/// Per-channel frequency query.
pub const CMD_CHANNEL_FREQUENCY: &str = "RF";
/// Per-channel memory query.
pub const CMD_CHANNEL_MEMORY: &str = "PM";

/// Key code for the Hold/Pause key.
pub const KEY_PAUSE: &str = "PSE";
/// Key code for the Scan key.
pub const KEY_SCAN: &str = "SCN";

/// Reply to a command the scanner does not recognise.
pub const REPLY_ERROR: &str = "ERR";
/// Reply to a command the scanner cannot execute right now.
pub const REPLY_NOT_GOOD: &str = "NG";

/// Build a "read channel frequency" command (`RF {channel}`).
pub fn cmd_channel_frequency(channel: u16) -> String {
    format!("{CMD_CHANNEL_FREQUENCY} {channel}")
}

/// Build a "read channel memory" command (`PM {channel}`).
pub fn cmd_channel_info(channel: u16) -> String {
    format!("{CMD_CHANNEL_MEMORY} {channel}")
}

/// Build a keypress command (`KEY,{code}`).
pub fn cmd_key(code: &str) -> String {
    format!("{CMD_KEY},{code}")
}

/// The values of a reply after its echoed verb.
///
/// `reply_payload("MDL,UBC125XLT", "MDL")` is `Some("UBC125XLT")`. A reply
/// that does not start with `verb,` yields `None`.
pub fn reply_payload<'a>(reply: &'a str, verb: &str) -> Option<&'a str> {
    reply.strip_prefix(verb)?.strip_prefix(',')
}

/// Whether the scanner rejected the command (`ERR` or `NG`).
pub fn is_rejection(reply: &str) -> bool {
    reply == REPLY_ERROR || reply == REPLY_NOT_GOOD
}

/// Parse an `MDL` reply into the model string.
pub fn parse_model_response(reply: &str) -> Option<&str> {
    reply_payload(reply, CMD_MODEL).filter(|m| !m.is_empty())
}

/// Parse a single-number level reply such as `VOL,8` or `SQ,2`.
pub fn parse_level_response(reply: &str, verb: &str) -> Option<u8> {
    reply_payload(reply, verb)?.trim().parse().ok()
}
