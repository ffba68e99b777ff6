//! Command framing for the scanner's carriage-return text protocol.
//!
//! Outbound frames are the ASCII command text followed by a single `\r`; there
//! is no checksum and no length prefix. Inbound frames carry no terminator at
//! all: a reply ends wherever the USB bulk transfer ends, so decoding is just
//! lossy ASCII conversion plus trimming.
//!
//! Commands have the shape `VERB[ ARG][,ARG...]` where the verb is one to four
//! uppercase ASCII letters. Two argument styles are in use:
//!
//! - space style, `RF 422`, `PM 1`
//! - comma style, `KEY,PSE`

use std::fmt;

use scanlib_core::error::{Error, Result};

/// The carriage-return byte that terminates every outbound frame.
pub const TERMINATOR: u8 = b'\r';

/// Separator between fields of a multi-field reply and between arguments.
pub const FIELD_SEPARATOR: char = ',';

/// Maximum verb length in characters.
pub const MAX_VERB_LEN: usize = 4;

/// How the first argument is joined to the verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStyle {
    /// `VERB ARG[,ARG...]`
    Space,
    /// `VERB,ARG[,ARG...]`
    Comma,
}

/// A validated scanner command.
///
/// Construct with [`Command::new`], [`Command::with_args`] or
/// [`Command::parse`]; all of them reject verbs that are not 1-4 uppercase
/// ASCII letters and any non-ASCII text, so a `Command` always encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<String>,
    style: ArgStyle,
}

impl Command {
    /// A bare command with no arguments (e.g. `MDL`).
    pub fn new(verb: &str) -> Result<Self> {
        validate_verb(verb)?;
        Ok(Command {
            verb: verb.to_string(),
            args: Vec::new(),
            style: ArgStyle::Space,
        })
    }

    /// A command with arguments joined in the given style.
    pub fn with_args<S: AsRef<str>>(verb: &str, style: ArgStyle, args: &[S]) -> Result<Self> {
        validate_verb(verb)?;
        let args = args
            .iter()
            .map(|a| {
                let a = a.as_ref();
                validate_arg(a)?;
                Ok(a.to_string())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Command {
            verb: verb.to_string(),
            args,
            style,
        })
    }

    /// Parse command text such as `"RF 422"` or `"KEY,PSE"`.
    ///
    /// Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if !text.is_ascii() {
            return Err(Error::Encoding(format!(
                "command {text:?} contains non-ASCII characters"
            )));
        }

        let verb_end = text
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let verb = &text[..verb_end];
        validate_verb(verb)?;

        let rest = &text[verb_end..];
        let (style, arg_text) = match rest.as_bytes().first() {
            None => {
                return Ok(Command {
                    verb: verb.to_string(),
                    args: Vec::new(),
                    style: ArgStyle::Space,
                })
            }
            Some(b' ') => (ArgStyle::Space, &rest[1..]),
            Some(b',') => (ArgStyle::Comma, &rest[1..]),
            Some(_) => {
                return Err(Error::InvalidCommand(format!(
                    "{text:?}: verb must be followed by a space or a comma"
                )))
            }
        };

        let args = arg_text.split(FIELD_SEPARATOR).collect::<Vec<_>>();
        Self::with_args(verb, style, &args)
    }

    /// The command verb (e.g. `"RF"`).
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The arguments in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// How arguments are joined to the verb.
    pub fn style(&self) -> ArgStyle {
        self.style
    }

    /// The serialized command text without the terminator.
    pub fn text(&self) -> String {
        if self.args.is_empty() {
            return self.verb.clone();
        }
        let joiner = match self.style {
            ArgStyle::Space => ' ',
            ArgStyle::Comma => FIELD_SEPARATOR,
        };
        let mut s = String::with_capacity(self.verb.len() + 1 + self.args.len() * 4);
        s.push_str(&self.verb);
        s.push(joiner);
        s.push_str(&self.args.join(","));
        s
    }

    /// The wire frame: command text plus `\r`.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = self.text().into_bytes();
        frame.push(TERMINATOR);
        frame
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

fn validate_verb(verb: &str) -> Result<()> {
    if verb.is_empty() || verb.len() > MAX_VERB_LEN || !verb.bytes().all(|b| b.is_ascii_uppercase())
    {
        return Err(Error::InvalidCommand(format!(
            "verb {verb:?} must be 1-{MAX_VERB_LEN} uppercase ASCII letters"
        )));
    }
    Ok(())
}

fn validate_arg(arg: &str) -> Result<()> {
    if !arg.is_ascii() {
        return Err(Error::Encoding(format!(
            "argument {arg:?} contains non-ASCII characters"
        )));
    }
    if arg.contains(FIELD_SEPARATOR) || arg.bytes().any(|b| b.is_ascii_control()) {
        return Err(Error::InvalidCommand(format!(
            "argument {arg:?} contains a separator or control character"
        )));
    }
    Ok(())
}

/// Frame raw command text: append `\r` and return the ASCII bytes.
///
/// Fails with [`Error::Encoding`] if the text is not pure ASCII. Unlike
/// [`Command::parse`] this does not check the verb shape, so it can frame
/// anything the device might accept.
///
/// # Examples
///
/// ```
/// use scanlib_text_io::protocol::encode_command;
///
/// assert_eq!(encode_command("RF 422").unwrap(), b"RF 422\r");
/// assert!(encode_command("RF é").is_err());
/// ```
pub fn encode_command(text: &str) -> Result<Vec<u8>> {
    if !text.is_ascii() {
        return Err(Error::Encoding(format!(
            "command {text:?} contains non-ASCII characters"
        )));
    }
    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(TERMINATOR);
    Ok(frame)
}

/// Decode a raw bulk-read payload into reply text.
///
/// Bytes outside 7-bit ASCII become U+FFFD rather than failing the decode.
/// Leading and trailing whitespace and control characters (including the
/// `\r` the scanner appends and any NUL padding) are removed.
///
/// # Examples
///
/// ```
/// use scanlib_text_io::protocol::decode_response;
///
/// assert_eq!(decode_response(b"MDL,UBC125XLT\r"), "MDL,UBC125XLT");
/// assert_eq!(decode_response(&[b'O', 0xFF, b'K']), "O\u{FFFD}K");
/// ```
pub fn decode_response(buf: &[u8]) -> String {
    let text: String = buf
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect();
    text.trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}
