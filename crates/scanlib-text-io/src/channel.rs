//! The transport channel: a [`UsbTransport`] bound to one interface and one
//! pair of bulk endpoints.
//!
//! The channel owns the endpoint addresses and the write timeout so that the
//! exchange engine above it deals only in "write these bytes" and "read up to
//! N bytes within T".

use std::time::Duration;

use tracing::{debug, trace};

use scanlib_core::error::{Error, Result};
use scanlib_core::transport::UsbTransport;
use scanlib_core::types::UsbProfile;

/// Default timeout for writes and primary reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Static addressing and timeout policy for a [`TransportChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Interface number to claim.
    pub interface: u8,
    /// Bulk IN endpoint address.
    pub endpoint_in: u8,
    /// Bulk OUT endpoint address.
    pub endpoint_out: u8,
    /// How long a write may take before it is reported as a timeout.
    pub write_timeout: Duration,
}

impl ChannelConfig {
    /// Channel settings for a model's USB profile with the default timeout.
    pub fn from_profile(profile: &UsbProfile) -> Self {
        ChannelConfig {
            interface: profile.interface,
            endpoint_in: profile.endpoint_in,
            endpoint_out: profile.endpoint_out,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A claimed-or-claimable bulk channel to the scanner.
pub struct TransportChannel {
    transport: Box<dyn UsbTransport>,
    config: ChannelConfig,
}

impl TransportChannel {
    pub fn new(transport: Box<dyn UsbTransport>, config: ChannelConfig) -> Self {
        TransportChannel { transport, config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Claim the configured interface.
    pub async fn claim(&mut self) -> Result<()> {
        debug!(interface = self.config.interface, "claiming interface");
        self.transport.claim(self.config.interface).await
    }

    /// Release the configured interface.
    pub async fn release(&mut self) -> Result<()> {
        debug!(interface = self.config.interface, "releasing interface");
        self.transport.release(self.config.interface).await
    }

    /// Reset the USB device.
    pub async fn reset(&mut self) -> Result<()> {
        debug!("resetting device");
        self.transport.reset().await
    }

    /// Write a whole frame to the OUT endpoint.
    ///
    /// A write the device only partly accepts is reported as
    /// [`Error::Timeout`]: the device did not take all bytes within the
    /// window.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        trace!(
            endpoint = self.config.endpoint_out,
            bytes = data.len(),
            data = ?data,
            "writing frame"
        );
        let written = self
            .transport
            .write(self.config.endpoint_out, data, self.config.write_timeout)
            .await?;
        if written < data.len() {
            debug!(written, expected = data.len(), "short write");
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Read up to `max_len` bytes from the IN endpoint.
    ///
    /// [`Error::Timeout`] means nothing arrived within `timeout`.
    pub async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let data = self
            .transport
            .read(self.config.endpoint_in, max_len, timeout)
            .await?;
        trace!(
            endpoint = self.config.endpoint_in,
            bytes = data.len(),
            data = ?data,
            "read packet"
        );
        Ok(data)
    }

    /// Whether the underlying device is still reachable.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlib_test_harness::{MockFault, MockUsbTransport};

    fn config() -> ChannelConfig {
        ChannelConfig {
            interface: 1,
            endpoint_in: 0x81,
            endpoint_out: 0x02,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn claimed_channel(mock: &MockUsbTransport) -> TransportChannel {
        let mut channel = TransportChannel::new(Box::new(mock.clone()), config());
        channel.claim().await.unwrap();
        channel
    }

    #[test]
    fn config_from_profile() {
        let profile = UsbProfile {
            vendor_id: 0x1965,
            product_id: 0x0018,
            configuration: 1,
            interface: 1,
            endpoint_in: 0x81,
            endpoint_out: 0x02,
        };
        assert_eq!(ChannelConfig::from_profile(&profile), config());
    }

    #[tokio::test]
    async fn claim_and_release_use_configured_interface() {
        let mock = MockUsbTransport::new();
        let mut channel = claimed_channel(&mock).await;
        assert_eq!(mock.claimed_interface(), Some(1));
        channel.release().await.unwrap();
        assert_eq!(mock.claimed_interface(), None);
    }

    #[tokio::test]
    async fn write_uses_out_endpoint_and_timeout() {
        let mock = MockUsbTransport::new();
        mock.expect(b"MDL\r", &[]);
        let mut channel = claimed_channel(&mock).await;

        channel.write(b"MDL\r").await.unwrap();

        let writes = mock.write_calls();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].endpoint, 0x02);
        assert_eq!(writes[0].timeout, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn short_write_is_a_timeout() {
        let mock = MockUsbTransport::new();
        mock.expect(b"MDL\r", &[]);
        mock.limit_writes(3);
        let mut channel = claimed_channel(&mock).await;

        assert!(matches!(channel.write(b"MDL\r").await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn write_failure_is_surfaced() {
        let mock = MockUsbTransport::new();
        mock.fail_next_write(MockFault::DeviceLost("unplugged".into()));
        let mut channel = claimed_channel(&mock).await;

        assert!(matches!(
            channel.write(b"MDL\r").await,
            Err(Error::DeviceLost(_))
        ));
    }

    #[tokio::test]
    async fn read_uses_in_endpoint() {
        let mock = MockUsbTransport::new();
        mock.queue_stale(b"MDL,UBC125XLT");
        let mut channel = claimed_channel(&mock).await;

        let data = channel.read(64, Duration::from_millis(100)).await.unwrap();
        assert_eq!(data, b"MDL,UBC125XLT");
        assert_eq!(mock.read_calls()[0].endpoint, 0x81);

        let result = channel.read(64, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn reset_is_delegated() {
        let mock = MockUsbTransport::new();
        let mut channel = claimed_channel(&mock).await;
        channel.reset().await.unwrap();
        assert_eq!(mock.reset_count(), 1);
        assert!(channel.is_connected());
    }
}
