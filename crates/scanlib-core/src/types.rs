//! Shared value types.

use std::fmt;

/// Lifecycle state of a scanner session.
///
/// ```text
/// Uninitialized --initialize()--> Ready --send()--> Ready ... --close()--> Closed
///                                   |
///                                   +--device lost--> Faulted --close()--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed but the transport has not been claimed yet.
    Uninitialized,
    /// Transport claimed and drained; commands may be sent.
    Ready,
    /// The device went away mid-session. Only `close()` is accepted.
    Faulted,
    /// Transport released. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Faulted => write!(f, "faulted"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// USB identity and endpoint layout of a scanner.
///
/// All values are fixed per model; nothing here is derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbProfile {
    /// USB vendor identifier.
    pub vendor_id: u16,
    /// USB product identifier.
    pub product_id: u16,
    /// Configuration value to select before claiming.
    pub configuration: u8,
    /// Interface number carrying the bulk endpoints (CDC data interface).
    pub interface: u8,
    /// Bulk IN endpoint address (device to host).
    pub endpoint_in: u8,
    /// Bulk OUT endpoint address (host to device).
    pub endpoint_out: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SessionState::Ready.to_string(), "ready");
        assert_eq!(SessionState::Faulted.to_string(), "faulted");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
