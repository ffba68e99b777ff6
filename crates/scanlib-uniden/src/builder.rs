//! SessionBuilder -- fluent builder for constructing [`ScannerSession`] instances.
//!
//! Separates configuration from construction so that callers can set
//! exchange timing, heuristics and observers before the device is opened.
//!
//! # Example
//!
//! ```no_run
//! use scanlib_uniden::builder::SessionBuilder;
//! use scanlib_uniden::models::ubc125xlt;
//! use scanlib_core::events::TracingObserver;
//! use std::sync::Arc;
//!
//! # async fn example() -> scanlib_core::Result<()> {
//! let mut session = SessionBuilder::new(ubc125xlt())
//!     .observer(Arc::new(TracingObserver))
//!     .build()
//!     .await?;
//! session.initialize().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use scanlib_core::error::Result;
use scanlib_core::events::{ExchangeObserver, NullObserver};
use scanlib_core::transport::UsbTransport;
use scanlib_text_io::channel::{ChannelConfig, TransportChannel};
use scanlib_text_io::io::{ExchangeConfig, ResponseAssembler, TrailingSeparator, TruncationPolicy};
use scanlib_text_io::reply::{ChannelFieldPolicy, LastNonEmptyField, ReplyParser};

use crate::models::UnidenModel;
use crate::session::ScannerSession;

/// Fluent builder for [`ScannerSession`].
///
/// All configuration has defaults derived from the [`UnidenModel`], so the
/// simplest usage is:
///
/// ```ignore
/// let session = SessionBuilder::new(ubc125xlt()).build().await?;
/// ```
pub struct SessionBuilder {
    model: UnidenModel,
    channel: ChannelConfig,
    standard: ExchangeConfig,
    bulk: ExchangeConfig,
    truncation: Box<dyn TruncationPolicy>,
    channel_field: Box<dyn ChannelFieldPolicy>,
    observer: Arc<dyn ExchangeObserver>,
}

impl SessionBuilder {
    /// Create a new builder for the given Uniden model.
    pub fn new(model: UnidenModel) -> Self {
        SessionBuilder {
            channel: ChannelConfig::from_profile(&model.usb),
            model,
            standard: ExchangeConfig::standard(),
            bulk: ExchangeConfig::bulk_status(),
            truncation: Box::new(TrailingSeparator::default()),
            channel_field: Box::new(LastNonEmptyField),
            observer: Arc::new(NullObserver),
        }
    }

    /// Set the write timeout (default: 5000 ms).
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.channel.write_timeout = timeout;
        self
    }

    /// Set the primary read timeout for all command classes
    /// (default: 5000 ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.standard.primary_timeout = timeout;
        self.bulk.primary_timeout = timeout;
        self
    }

    /// Replace the exchange settings for ordinary commands.
    pub fn standard_config(mut self, config: ExchangeConfig) -> Self {
        self.standard = config;
        self
    }

    /// Replace the exchange settings for the bulk status command.
    pub fn bulk_config(mut self, config: ExchangeConfig) -> Self {
        self.bulk = config;
        self
    }

    /// Replace the "reply looks truncated" heuristic.
    pub fn truncation_policy(mut self, policy: Box<dyn TruncationPolicy>) -> Self {
        self.truncation = policy;
        self
    }

    /// Replace the "which field is the channel" heuristic.
    pub fn channel_field_policy(mut self, policy: Box<dyn ChannelFieldPolicy>) -> Self {
        self.channel_field = policy;
        self
    }

    /// Report session and exchange events to `observer`.
    pub fn observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build a [`ScannerSession`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockUsbTransport` from `scanlib-test-harness`). The session is
    /// returned `Uninitialized`; nothing is claimed yet.
    pub async fn build_with_transport(
        self,
        transport: Box<dyn UsbTransport>,
    ) -> Result<ScannerSession> {
        let channel = TransportChannel::new(transport, self.channel);
        let assembler = ResponseAssembler::new()
            .with_truncation_policy(self.truncation)
            .with_observer(self.observer.clone());
        let parser = ReplyParser::new().with_channel_policy(self.channel_field);

        Ok(ScannerSession::new(
            channel,
            assembler,
            parser,
            self.model,
            self.standard,
            self.bulk,
            self.observer,
        ))
    }

    /// Open the model's USB device and build a session on it.
    ///
    /// Fails with [`DeviceNotFound`](scanlib_core::Error::DeviceNotFound) if
    /// no matching scanner is attached.
    #[cfg(feature = "usb")]
    pub async fn build(self) -> Result<ScannerSession> {
        let usb = &self.model.usb;
        let transport =
            scanlib_transport::NusbTransport::open(usb.vendor_id, usb.product_id, usb.configuration)
                .await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ubc125xlt;
    use scanlib_core::types::SessionState;
    use scanlib_test_harness::MockUsbTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let mock = MockUsbTransport::new();
        let session = SessionBuilder::new(ubc125xlt())
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.model().name, "UBC125XLT");
        assert_eq!(session.standard_config(), &ExchangeConfig::standard());
        assert_eq!(session.bulk_config(), &ExchangeConfig::bulk_status());
    }

    #[tokio::test]
    async fn channel_addresses_come_from_model() {
        let mock = MockUsbTransport::new();
        mock.expect(b"MDL\r", &[b"MDL,UBC125XLT"]);
        let mut session = SessionBuilder::new(ubc125xlt())
            .standard_config(ExchangeConfig {
                settle_delay: Duration::ZERO,
                ..ExchangeConfig::standard()
            })
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();

        session.initialize().await.unwrap();
        session.get_model().await.unwrap();

        assert_eq!(mock.claimed_interface(), Some(1));
        assert_eq!(mock.write_calls()[0].endpoint, 0x02);
        assert!(mock.read_calls().iter().all(|r| r.endpoint == 0x81));
    }

    #[tokio::test]
    async fn timeouts_are_applied() {
        let mock = MockUsbTransport::new();
        mock.expect_silence(b"MDL\r");
        let mut session = SessionBuilder::new(ubc125xlt())
            .write_timeout(Duration::from_millis(750))
            .read_timeout(Duration::from_millis(1500))
            .standard_config(ExchangeConfig {
                settle_delay: Duration::ZERO,
                ..ExchangeConfig::standard()
            })
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();
        session.initialize().await.unwrap();

        assert!(session.get_model().await.is_err());
        assert_eq!(mock.write_calls()[0].timeout, Duration::from_millis(750));
        let reads = mock.read_calls();
        assert_eq!(reads.last().unwrap().timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn custom_channel_policy_reaches_parser() {
        use scanlib_text_io::reply::FixedField;

        let mock = MockUsbTransport::new();
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,,17,,,,0,1,,422"]);
        let mut session = SessionBuilder::new(ubc125xlt())
            .bulk_config(ExchangeConfig {
                settle_delay: Duration::ZERO,
                ..ExchangeConfig::bulk_status()
            })
            .channel_field_policy(Box::new(FixedField(4)))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        session.initialize().await.unwrap();

        let record = session.read_status().await.unwrap().unwrap();
        assert_eq!(record.channel.as_deref(), Some("17"));
    }
}
