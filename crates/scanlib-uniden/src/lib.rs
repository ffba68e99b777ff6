//! Uniden scanner backend for scanlib.
//!
//! Uniden handheld scanners expose a text command port over USB bulk
//! endpoints. This crate provides:
//!
//! - **Model definitions** ([`models`]) -- USB identifiers and endpoint
//!   layout for supported scanners (UBC125XLT).
//! - **Command builders** ([`commands`]) -- the command vocabulary and
//!   helpers for the `VERB,value` reply shape.
//! - **Status record** ([`status`]) -- typed view of the `GLG` bulk status
//!   reply.
//! - **Session** ([`session`]) -- lifecycle state machine and the named
//!   command API.
//! - **Builder** ([`builder`]) -- fluent construction of
//!   [`ScannerSession`] with defaults from the model.
//!
//! # Example
//!
//! ```
//! use scanlib_uniden::commands::{cmd_channel_frequency, parse_model_response};
//! use scanlib_uniden::status::parse_status;
//! use scanlib_text_io::reply::ReplyParser;
//!
//! assert_eq!(cmd_channel_frequency(422), "RF 422");
//! assert_eq!(parse_model_response("MDL,UBC125XLT"), Some("UBC125XLT"));
//!
//! let status = parse_status(&ReplyParser::new(), "GLG,01705000,FM,,0,,,,0,1,,422", false).unwrap();
//! assert_eq!(status.frequency_mhz, Some(170.5));
//! assert_eq!(status.channel.as_deref(), Some("422"));
//! ```

pub mod builder;
pub mod commands;
pub mod models;
pub mod session;
pub mod status;

// Re-export the primary types for ergonomic `use scanlib_uniden::*`.
pub use builder::SessionBuilder;
pub use models::UnidenModel;
pub use session::{ProbeOutcome, ScannerSession, DEFAULT_PROBE_COMMANDS, DEFAULT_PROBE_PAUSE};
pub use status::StatusRecord;
