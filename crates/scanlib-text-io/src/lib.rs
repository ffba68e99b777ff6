//! Command/response engine for text-protocol USB scanners.
//!
//! The scanner speaks ASCII: commands are `\r`-terminated, replies carry no
//! terminator and end wherever the bulk transfer ends. This crate turns that
//! into a reliable request/response exchange on top of a
//! [`UsbTransport`](scanlib_core::UsbTransport).
//!
//! # Architecture
//!
//! - [`protocol`] -- command framing and reply decoding
//! - [`channel`] -- the transport bound to one interface and endpoint pair
//! - [`io`] -- drain, write, settle, read and continuation read
//! - [`reply`] -- parsing of tagged comma-delimited replies

pub mod channel;
pub mod io;
pub mod protocol;
pub mod reply;

pub use channel::{ChannelConfig, TransportChannel, DEFAULT_TIMEOUT};
pub use io::{
    Continuation, DrainReport, ExchangeConfig, Response, ResponseAssembler, TrailingSeparator,
    TruncationPolicy,
};
pub use protocol::{decode_response, encode_command, ArgStyle, Command};
pub use reply::{
    parse_delimited_reply, parse_frequency_mhz, ChannelFieldPolicy, DelimitedReply, FixedField,
    LastNonEmptyField, ReplyParser,
};
