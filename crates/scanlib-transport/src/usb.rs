//! USB bulk transport backed by `nusb`.
//!
//! [`NusbTransport`] implements [`UsbTransport`] for a scanner that exposes
//! its serial command port as a pair of bulk endpoints on a vendor
//! interface.
//!
//! # Example
//!
//! ```no_run
//! use scanlib_core::transport::UsbTransport;
//! use scanlib_transport::NusbTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> scanlib_core::Result<()> {
//! let mut transport = NusbTransport::open(0x1965, 0x0018, 1).await?;
//! transport.claim(1).await?;
//! transport.write(0x02, b"MDL\r", Duration::from_secs(5)).await?;
//! let reply = transport.read(0x81, 128, Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use nusb::transfer::{Buffer, Bulk, In, Out, TransferError};
use nusb::{Endpoint, Interface};
use scanlib_core::error::{Error, Result};
use scanlib_core::transport::UsbTransport;
use std::time::Duration;

/// Bulk endpoints opened on the claimed interface.
struct Claimed {
    number: u8,
    interface: Interface,
    bulk_in: Option<Endpoint<Bulk, In>>,
    bulk_out: Option<Endpoint<Bulk, Out>>,
}

/// A scanner reached through `nusb`.
///
/// The device stays open until the transport is dropped; the interface is
/// held between [`claim`](UsbTransport::claim) and
/// [`release`](UsbTransport::release).
pub struct NusbTransport {
    device: nusb::Device,
    label: String,
    claimed: Option<Claimed>,
    /// Bytes received past what a caller asked for, returned first by the
    /// next read.
    leftover: Vec<u8>,
    connected: bool,
}

fn transfer_error(context: &str, e: TransferError) -> Error {
    match e {
        TransferError::Disconnected => Error::DeviceLost(format!("{context}: device disconnected")),
        other => Error::Transport(format!("{context}: {other}")),
    }
}

/// Whether a transfer reaped after `cancel_all` failed for a reason other
/// than the cancellation itself (e.g. the device went away meanwhile).
fn failed_after_cancel(status: &std::result::Result<(), TransferError>) -> bool {
    matches!(status, Err(e) if !matches!(e, TransferError::Cancelled))
}

impl NusbTransport {
    /// Find the first device with the given IDs, open it and select
    /// `configuration`.
    ///
    /// Fails with [`Error::DeviceNotFound`] if nothing matches.
    pub async fn open(vendor_id: u16, product_id: u16, configuration: u8) -> Result<Self> {
        tracing::debug!(
            vendor_id = format_args!("{vendor_id:04x}"),
            product_id = format_args!("{product_id:04x}"),
            "Searching for USB device"
        );

        let info = nusb::list_devices()
            .await
            .map_err(|e| Error::Transport(format!("failed to list USB devices: {e}")))?
            .find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .ok_or(Error::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        let label = format!(
            "{:04x}:{:04x} ({})",
            vendor_id,
            product_id,
            info.product_string().unwrap_or("unknown product")
        );

        let device = info.open().await.map_err(|e| {
            tracing::error!(device = %label, error = %e, "Failed to open USB device");
            Error::Transport(format!("failed to open {label}: {e}"))
        })?;

        // Selecting the active configuration again is harmless, but some
        // platforms refuse it while a kernel driver is bound; carry on then.
        if let Err(e) = device.set_configuration(configuration).await {
            tracing::warn!(
                device = %label,
                configuration,
                error = %e,
                "Failed to set configuration (continuing anyway)"
            );
        }

        tracing::info!(device = %label, "USB device opened");

        Ok(NusbTransport {
            device,
            label,
            claimed: None,
            leftover: Vec::new(),
            connected: true,
        })
    }

    /// Human-readable device identification for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn claimed(&mut self, operation: &str) -> Result<&mut Claimed> {
        if !self.connected {
            return Err(Error::DeviceLost(format!("{} is disconnected", self.label)));
        }
        match self.claimed.as_mut() {
            Some(c) => Ok(c),
            None => {
                tracing::debug!(device = %self.label, "{} without a claimed interface", operation);
                Err(Error::NotConnected)
            }
        }
    }

    fn note_error(&mut self, err: Error) -> Error {
        if err.is_device_lost() {
            tracing::error!(device = %self.label, error = %err, "USB device lost");
            self.connected = false;
        }
        err
    }

    /// Take up to `max_len` bytes from `data`, keeping the rest for later.
    fn split_excess(&mut self, mut data: Vec<u8>, max_len: usize) -> Vec<u8> {
        if data.len() > max_len {
            let rest = data.split_off(max_len);
            self.leftover.splice(0..0, rest);
        }
        data
    }
}

#[async_trait]
impl UsbTransport for NusbTransport {
    async fn claim(&mut self, interface: u8) -> Result<()> {
        if let Some(c) = &self.claimed {
            return Err(Error::Transport(format!(
                "interface {} of {} is already claimed",
                c.number, self.label
            )));
        }

        tracing::debug!(device = %self.label, interface, "Claiming interface");
        let iface = self
            .device
            .detach_and_claim_interface(interface)
            .await
            .map_err(|e| {
                tracing::error!(device = %self.label, interface, error = %e, "Failed to claim interface");
                Error::Transport(format!(
                    "failed to claim interface {interface} of {}: {e}",
                    self.label
                ))
            })?;

        self.claimed = Some(Claimed {
            number: interface,
            interface: iface,
            bulk_in: None,
            bulk_out: None,
        });
        self.leftover.clear();
        tracing::info!(device = %self.label, interface, "Interface claimed");
        Ok(())
    }

    async fn release(&mut self, interface: u8) -> Result<()> {
        match &self.claimed {
            Some(c) if c.number == interface => {}
            _ => return Err(Error::NotConnected),
        }
        // Dropping the endpoints cancels their pending transfers; dropping
        // the interface releases it.
        self.claimed = None;
        self.leftover.clear();
        tracing::info!(device = %self.label, interface, "Interface released");
        Ok(())
    }

    async fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let label = self.label.clone();
        let claimed = self.claimed("write")?;

        if claimed.bulk_out.is_none() {
            let ep = claimed
                .interface
                .endpoint::<Bulk, Out>(endpoint)
                .map_err(|e| Error::Transport(format!("bulk OUT endpoint {endpoint:#04x}: {e}")))?;
            claimed.bulk_out = Some(ep);
        }
        let Some(ep) = claimed.bulk_out.as_mut() else {
            return Err(Error::NotConnected);
        };

        tracing::trace!(device = %label, endpoint, bytes = data.len(), data = ?data, "Sending data");

        ep.submit(Buffer::from(data.to_vec()));
        let completion = match tokio::time::timeout(timeout, ep.next_complete()).await {
            Ok(c) => c,
            Err(_) => {
                ep.cancel_all();
                let c = ep.next_complete().await;
                if !failed_after_cancel(&c.status) {
                    tracing::debug!(
                        device = %label,
                        endpoint,
                        written = c.actual_len,
                        timeout_ms = timeout.as_millis(),
                        "Write timed out"
                    );
                    return Ok(c.actual_len);
                }
                c
            }
        };

        match completion.status {
            Ok(()) => Ok(completion.actual_len),
            Err(e) => Err(self.note_error(transfer_error("bulk write", e))),
        }
    }

    async fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        if !self.leftover.is_empty() {
            let data = std::mem::take(&mut self.leftover);
            return Ok(self.split_excess(data, max_len));
        }

        let label = self.label.clone();
        let claimed = self.claimed("read")?;

        if claimed.bulk_in.is_none() {
            let ep = claimed
                .interface
                .endpoint::<Bulk, In>(endpoint)
                .map_err(|e| Error::Transport(format!("bulk IN endpoint {endpoint:#04x}: {e}")))?;
            claimed.bulk_in = Some(ep);
        }
        let Some(ep) = claimed.bulk_in.as_mut() else {
            return Err(Error::NotConnected);
        };

        // IN requests must be a whole number of packets.
        let packet = ep.max_packet_size().max(1);
        let request = max_len.max(1).div_ceil(packet) * packet;

        if ep.pending() == 0 {
            ep.submit(ep.allocate(request));
        }

        let completion = match tokio::time::timeout(timeout, ep.next_complete()).await {
            Ok(c) => c,
            Err(_) => {
                // Reap the cancelled transfer so it cannot complete into a
                // later read; keep whatever it managed to receive.
                ep.cancel_all();
                let c = ep.next_complete().await;
                if c.actual_len == 0 && !failed_after_cancel(&c.status) {
                    tracing::trace!(device = %label, endpoint, timeout_ms = timeout.as_millis(), "Timeout waiting for data");
                    return Err(Error::Timeout);
                }
                c
            }
        };

        match completion.status {
            Ok(()) | Err(TransferError::Cancelled) => {
                let mut data = completion.buffer.into_vec();
                data.truncate(completion.actual_len);
                tracing::trace!(device = %label, endpoint, bytes = data.len(), data = ?data, "Received data");
                Ok(self.split_excess(data, max_len))
            }
            Err(e) => Err(self.note_error(transfer_error("bulk read", e))),
        }
    }

    async fn reset(&mut self) -> Result<()> {
        tracing::debug!(device = %self.label, "Resetting USB device");
        self.claimed = None;
        self.leftover.clear();
        self.device
            .reset()
            .await
            .map_err(|e| Error::Transport(format!("failed to reset {}: {e}", self.label)))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for NusbTransport {
    fn drop(&mut self) {
        if self.claimed.is_some() {
            tracing::debug!(device = %self.label, "NusbTransport dropped with interface claimed, releasing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_maps_to_device_lost() {
        let err = transfer_error("bulk read", TransferError::Disconnected);
        assert!(err.is_device_lost());
    }

    #[test]
    fn cancellation_alone_is_not_a_failure() {
        assert!(!failed_after_cancel(&Ok(())));
        assert!(!failed_after_cancel(&Err(TransferError::Cancelled)));
    }

    #[test]
    fn disconnect_during_cancel_is_reported_as_device_lost() {
        let status = Err(TransferError::Disconnected);
        assert!(failed_after_cancel(&status));
        let Err(e) = status else { unreachable!() };
        assert!(transfer_error("bulk read", e).is_device_lost());
        assert!(failed_after_cancel(&Err(TransferError::Stall)));
    }

    #[test]
    fn other_transfer_errors_are_transport_errors() {
        let err = transfer_error("bulk write", TransferError::Stall);
        match err {
            Error::Transport(msg) => assert!(msg.starts_with("bulk write")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
