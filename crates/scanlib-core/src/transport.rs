//! USB transport trait for scanner communication.
//!
//! The [`UsbTransport`] trait abstracts over the host USB stack. Device
//! enumeration, kernel-driver detachment and configuration selection happen
//! when a concrete transport is opened (see `scanlib-transport`); once open,
//! the protocol layer only needs bulk reads and writes plus interface
//! claim/release.
//!
//! Protocol engines operate on a `UsbTransport` rather than on a USB library
//! directly, enabling both real hardware control and deterministic unit
//! testing with `MockUsbTransport` from the `scanlib-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous bulk-endpoint transport to a USB scanner.
#[async_trait]
pub trait UsbTransport: Send {
    /// Claim `interface` for exclusive use.
    ///
    /// Fails with [`Error::Transport`](crate::error::Error::Transport) if the
    /// interface is already claimed by another handle.
    async fn claim(&mut self, interface: u8) -> Result<()>;

    /// Release a previously claimed interface.
    async fn release(&mut self, interface: u8) -> Result<()>;

    /// Write `data` to a bulk OUT endpoint.
    ///
    /// Returns the number of bytes the device accepted, which may be fewer
    /// than `data.len()`. Returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing was accepted within `timeout`.
    async fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read at most `max_len` bytes from a bulk IN endpoint.
    ///
    /// Returns [`Error::Timeout`](crate::error::Error::Timeout) if no data
    /// arrives within `timeout`. A timeout is the normal way of learning that
    /// the device has nothing more buffered.
    async fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Issue a USB port reset.
    async fn reset(&mut self) -> Result<()>;

    /// Check whether the device is still reachable.
    fn is_connected(&self) -> bool;
}
