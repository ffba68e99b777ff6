//! Exchange events and caller-supplied observer hooks.
//!
//! The library never installs a logging subscriber or any other
//! process-wide state. Instead, a session is handed an [`ExchangeObserver`]
//! at construction and reports each step of its command exchanges to it.
//! Three observers ship with the crate:
//!
//! - [`NullObserver`] -- ignores everything (the default)
//! - [`TracingObserver`] -- forwards events to `tracing` at debug level
//! - [`BroadcastObserver`] -- publishes events on a [`tokio::sync::broadcast`]
//!   channel for UI or recorder tasks

use std::time::Duration;

use tokio::sync::broadcast;

use crate::types::SessionState;

/// An event emitted while driving a scanner session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScannerEvent {
    /// The session moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },

    /// Stale inbound data was discarded before an exchange.
    BufferDrained {
        /// Number of reads issued, including the final timed-out one.
        reads: usize,
        /// Total bytes discarded.
        bytes: usize,
    },

    /// A framed command was written to the device.
    CommandSent {
        /// Command text without the terminator.
        command: String,
        /// Frame length in bytes, terminator included.
        bytes: usize,
    },

    /// The first reply looked truncated and a continuation read was issued.
    ContinuationRead {
        /// Command text.
        command: String,
        /// `true` if the continuation read timed out and the partial reply
        /// was kept.
        timed_out: bool,
    },

    /// A complete (or best-effort partial) reply was assembled.
    ResponseReceived {
        /// Command text.
        command: String,
        /// Decoded, trimmed reply text.
        text: String,
        /// Number of reads used to assemble it (1 or 2).
        reads: usize,
        /// Time from write to the final read.
        elapsed: Duration,
    },

    /// An exchange failed.
    CommandFailed {
        /// Command text.
        command: String,
        /// Rendered error.
        error: String,
    },
}

/// Callback trait for observing session activity.
///
/// Implementations must be cheap; they are called inline on the exchange
/// path.
pub trait ExchangeObserver: Send + Sync + 'static {
    fn on_event(&self, event: &ScannerEvent);
}

/// Observer that discards every event.
pub struct NullObserver;

impl ExchangeObserver for NullObserver {
    fn on_event(&self, _event: &ScannerEvent) {}
}

/// Observer that logs every event through `tracing`.
pub struct TracingObserver;

impl ExchangeObserver for TracingObserver {
    fn on_event(&self, event: &ScannerEvent) {
        match event {
            ScannerEvent::StateChanged { from, to } => {
                tracing::debug!(%from, %to, "session state changed");
            }
            ScannerEvent::BufferDrained { reads, bytes } => {
                tracing::debug!(reads, bytes, "buffer drained");
            }
            ScannerEvent::CommandSent { command, bytes } => {
                tracing::debug!(command = %command, bytes, "command sent");
            }
            ScannerEvent::ContinuationRead { command, timed_out } => {
                tracing::debug!(command = %command, timed_out, "continuation read");
            }
            ScannerEvent::ResponseReceived {
                command,
                text,
                reads,
                elapsed,
            } => {
                tracing::debug!(
                    command = %command,
                    text = %text,
                    reads,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "response received"
                );
            }
            ScannerEvent::CommandFailed { command, error } => {
                tracing::debug!(command = %command, error = %error, "command failed");
            }
        }
    }
}

/// Observer that publishes events on a broadcast channel.
///
/// Events are delivered on a best-effort basis; if there are no receivers,
/// or a receiver lags, events are dropped rather than blocking the exchange.
pub struct BroadcastObserver {
    tx: broadcast::Sender<ScannerEvent>,
}

impl BroadcastObserver {
    /// Create an observer with a channel of the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastObserver { tx }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.tx.subscribe()
    }
}

impl ExchangeObserver for BroadcastObserver {
    fn on_event(&self, event: &ScannerEvent) {
        let _ = self.tx.send(event.clone());
    }
}
