//! Error types for scanlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, framing, session-state
//! and reply-parsing failures are all captured here.

use std::fmt;

use crate::types::SessionState;

/// The step of a command exchange that failed.
///
/// Carried by [`Error::CommandFailed`] so that every failure names both the
/// command text and what the library was doing when it went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Discarding stale inbound data before the command was written.
    Drain,
    /// Writing the framed command to the OUT endpoint.
    Write,
    /// The first read of the reply from the IN endpoint.
    Read,
    /// The second read issued when the first reply looked truncated.
    ContinuationRead,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Drain => write!(f, "drain"),
            Operation::Write => write!(f, "write"),
            Operation::Read => write!(f, "read"),
            Operation::ContinuationRead => write!(f, "continuation read"),
        }
    }
}

/// The error type for all scanlib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No USB device with the requested vendor/product identifiers is attached.
    ///
    /// Fatal to session construction.
    #[error("no USB device found with id {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound {
        /// USB vendor identifier that was searched for.
        vendor_id: u16,
        /// USB product identifier that was searched for.
        product_id: u16,
    },

    /// An API call was made in a session state that does not allow it,
    /// e.g. sending a command before `initialize()`.
    #[error("cannot {operation}{} while session is {state}", quoted(.command))]
    InvalidState {
        /// The rejected operation (e.g. `"send"`).
        operation: &'static str,
        /// The command text, when a command was rejected.
        command: Option<String>,
        /// The state the session was in.
        state: SessionState,
    },

    /// No data arrived (or the write was not accepted) within the timeout.
    ///
    /// During draining this is the normal end-of-data signal.
    #[error("timeout waiting for device")]
    Timeout,

    /// An unexpected transport failure (stall, fault, claim conflict, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device disappeared from the bus (unplugged or powered off).
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// Command text contained characters outside 7-bit ASCII.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Command text did not have the `VERB[ ARG][,ARG...]` shape.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A reply did not start with the expected tag.
    #[error("reply tag mismatch: expected {expected:?}, found {found:?}")]
    ParseMismatch {
        /// The tag the caller expected in field 0.
        expected: String,
        /// The field 0 actually present in the reply.
        found: String,
    },

    /// A command exchange failed.
    #[error("command {command:?} failed during {operation}: {source}")]
    CommandFailed {
        /// The command text as the caller gave it (without terminator).
        command: String,
        /// The exchange step that failed.
        operation: Operation,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Session initialization failed after the interface was claimed.
    #[error("session initialization failed during {operation}: {source}")]
    InitializeFailed {
        /// The step that failed.
        operation: Operation,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The transport has been released or was never claimed.
    #[error("not connected")]
    NotConnected,
}

fn quoted(command: &Option<String>) -> String {
    match command {
        Some(c) => format!(" {c:?}"),
        None => String::new(),
    }
}

impl Error {
    /// Wrap `self` as the cause of a failed command exchange.
    pub fn during(self, command: impl Into<String>, operation: Operation) -> Error {
        Error::CommandFailed {
            command: command.into(),
            operation,
            source: Box::new(self),
        }
    }

    /// Whether this error is (or was caused by) a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::CommandFailed { source, .. } | Error::InitializeFailed { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }

    /// Whether this error means the device is gone and the session can no
    /// longer be used.
    pub fn is_device_lost(&self) -> bool {
        match self {
            Error::DeviceLost(_) => true,
            Error::CommandFailed { source, .. } | Error::InitializeFailed { source, .. } => {
                source.is_device_lost()
            }
            _ => false,
        }
    }

    /// The command text attached to this error, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { command, .. } => Some(command),
            Error::InvalidState {
                command: Some(command),
                ..
            } => Some(command),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
