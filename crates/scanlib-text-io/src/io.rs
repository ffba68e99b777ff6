//! Command/response exchange engine.
//!
//! One exchange is strictly sequential:
//!
//! 1. drain: read with a short timeout until the device has nothing left,
//!    discarding whatever an earlier, possibly aborted, exchange left behind
//! 2. write the framed command
//! 3. wait the settle delay; the scanner is not always ready to answer at once
//! 4. one primary read
//! 5. if the [`TruncationPolicy`] says the reply looks cut off, exactly one
//!    continuation read whose text is appended
//!
//! Replies carry no terminator, so "the device has nothing more" can only be
//! learned from a read timeout. Timeouts are therefore expected during the
//! drain and the continuation read, and only escalate on the primary read.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use scanlib_core::error::{Error, Operation, Result};
use scanlib_core::events::{ExchangeObserver, NullObserver, ScannerEvent};

use crate::channel::{TransportChannel, DEFAULT_TIMEOUT};
use crate::protocol::{self, Command, FIELD_SEPARATOR};

/// Read timeout used while draining stale data.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Read timeout for the continuation read.
pub const CONTINUATION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Settle delay for ordinary commands.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Settle delay for multi-field bulk replies.
pub const BULK_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Read size for ordinary commands.
pub const DEFAULT_READ_SIZE: usize = 128;

/// Read size for multi-field bulk replies.
pub const BULK_READ_SIZE: usize = 256;

/// Upper bound on drain reads, so a device that never stops talking cannot
/// stall an exchange forever.
pub const MAX_DRAIN_READS: usize = 64;

/// Total time one drain may take, however many reads it needs.
pub const DRAIN_BUDGET: Duration = Duration::from_millis(2000);

/// Per-command-class exchange parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Maximum bytes requested by the primary and continuation reads.
    pub read_size: usize,
    /// Read timeout while draining.
    pub drain_timeout: Duration,
    /// Read timeout of the primary read.
    pub primary_timeout: Duration,
    /// Read timeout of the continuation read.
    pub continuation_timeout: Duration,
    /// Pause between the write and the primary read.
    pub settle_delay: Duration,
    /// Whether a truncated-looking reply triggers a continuation read.
    pub continuation_enabled: bool,
    /// Whether to drain before writing the command.
    pub drain_before_exchange: bool,
    /// Maximum bytes requested per drain read.
    pub drain_read_size: usize,
    /// Maximum number of drain reads per drain.
    pub max_drain_reads: usize,
    /// Total time a drain may take. The last drain read is shortened to
    /// fit; once it is spent the drain stops as capped.
    pub drain_budget: Duration,
}

impl ExchangeConfig {
    /// Ordinary single-field commands (`MDL`, `RF n`, `PM n`, ...).
    pub fn standard() -> Self {
        ExchangeConfig {
            read_size: DEFAULT_READ_SIZE,
            drain_timeout: DRAIN_TIMEOUT,
            primary_timeout: DEFAULT_TIMEOUT,
            continuation_timeout: CONTINUATION_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            continuation_enabled: false,
            drain_before_exchange: true,
            drain_read_size: DEFAULT_READ_SIZE,
            max_drain_reads: MAX_DRAIN_READS,
            drain_budget: DRAIN_BUDGET,
        }
    }

    /// Multi-field bulk replies (`GLG`): longer settle delay, larger reads,
    /// continuation enabled.
    pub fn bulk_status() -> Self {
        ExchangeConfig {
            read_size: BULK_READ_SIZE,
            settle_delay: BULK_SETTLE_DELAY,
            continuation_enabled: true,
            ..Self::standard()
        }
    }

    /// Worst-case time spent after the write: settle delay plus primary and
    /// (if enabled) continuation read timeouts.
    pub fn worst_case_after_write(&self) -> Duration {
        let continuation = if self.continuation_enabled {
            self.continuation_timeout
        } else {
            Duration::ZERO
        };
        self.settle_delay + self.primary_timeout + continuation
    }

    /// Worst-case time an exchange spends waiting on reads and the settle
    /// delay: the drain budget (if draining) plus
    /// [`worst_case_after_write`](Self::worst_case_after_write). Only the
    /// write itself, bounded by the channel's write timeout, comes on top.
    pub fn worst_case_exchange(&self) -> Duration {
        let drain = if self.drain_before_exchange {
            self.drain_budget
        } else {
            Duration::ZERO
        };
        drain + self.worst_case_after_write()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Truncation policy
// ---------------------------------------------------------------------------

/// Decides whether a decoded reply looks cut off and needs a continuation read.
///
/// The scanner protocol has no end-of-reply marker, so this is always a
/// guess. It is a trait so that the guess can be tuned per device.
pub trait TruncationPolicy: Send + Sync + 'static {
    fn needs_continuation(&self, text: &str) -> bool;
}

/// Heuristic: a reply ending in a field separator was cut off mid-record.
///
/// Multi-field replies never legitimately end in `,` as far as observed, but
/// this is not documented behaviour of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingSeparator(pub char);

impl Default for TrailingSeparator {
    fn default() -> Self {
        TrailingSeparator(FIELD_SEPARATOR)
    }
}

impl TruncationPolicy for TrailingSeparator {
    fn needs_continuation(&self, text: &str) -> bool {
        text.ends_with(self.0)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What happened with the continuation read of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The reply did not look truncated, or continuation was disabled.
    NotNeeded,
    /// A continuation read returned data that was appended.
    Appended,
    /// The continuation read timed out; the reply is best-effort partial.
    TimedOut,
}

/// The assembled reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: String,
    text: String,
    reads: usize,
    continuation: Continuation,
}

impl Response {
    /// The command text this is the reply to.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The decoded, trimmed reply text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the response, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Number of reads used (1, or 2 with a continuation read).
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn continuation(&self) -> Continuation {
        self.continuation
    }

    /// Whether the reply may be incomplete (continuation read timed out).
    pub fn is_partial(&self) -> bool {
        self.continuation == Continuation::TimedOut
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Summary of one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Reads issued, including the final timed-out one.
    pub reads: usize,
    /// Bytes discarded.
    pub bytes: usize,
    /// `true` if the drain stopped at `max_drain_reads` or ran out of
    /// `drain_budget` instead of ending on a timeout.
    pub capped: bool,
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Drives exchanges on a [`TransportChannel`].
///
/// The assembler holds only policy; the channel is passed in per call so a
/// session can keep exclusive ownership of it.
pub struct ResponseAssembler {
    truncation: Box<dyn TruncationPolicy>,
    observer: Arc<dyn ExchangeObserver>,
}

impl ResponseAssembler {
    /// An assembler with the trailing-comma truncation heuristic and no
    /// observer.
    pub fn new() -> Self {
        ResponseAssembler {
            truncation: Box::new(TrailingSeparator::default()),
            observer: Arc::new(NullObserver),
        }
    }

    /// Replace the truncation heuristic.
    pub fn with_truncation_policy(mut self, policy: Box<dyn TruncationPolicy>) -> Self {
        self.truncation = policy;
        self
    }

    /// Report exchange steps to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Discard any buffered inbound data.
    ///
    /// Reads until one read times out, at most `max_drain_reads` times and
    /// for at most `drain_budget` in total. Any other failure is returned as
    /// is: the device is most likely gone.
    pub async fn drain(
        &self,
        channel: &mut TransportChannel,
        config: &ExchangeConfig,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let deadline = Instant::now() + config.drain_budget;

        loop {
            if report.reads >= config.max_drain_reads {
                warn!(
                    reads = report.reads,
                    bytes = report.bytes,
                    "drain read limit reached, device still sending"
                );
                report.capped = true;
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    reads = report.reads,
                    bytes = report.bytes,
                    budget_ms = config.drain_budget.as_millis() as u64,
                    "drain time budget spent, device still sending"
                );
                report.capped = true;
                break;
            }

            report.reads += 1;
            match channel
                .read(config.drain_read_size, config.drain_timeout.min(remaining))
                .await
            {
                Ok(data) => {
                    report.bytes += data.len();
                    debug!(
                        bytes = data.len(),
                        text = %protocol::decode_response(&data),
                        "discarded buffered data"
                    );
                }
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }

        trace!(reads = report.reads, bytes = report.bytes, "drain complete");
        self.observer.on_event(&ScannerEvent::BufferDrained {
            reads: report.reads,
            bytes: report.bytes,
        });
        Ok(report)
    }

    /// Run one full command exchange.
    ///
    /// Every failure is returned as [`Error::CommandFailed`] naming the
    /// command text and the step that failed. A timed-out continuation read
    /// is not a failure: the partial reply is returned.
    pub async fn exchange(
        &self,
        channel: &mut TransportChannel,
        command: &Command,
        config: &ExchangeConfig,
    ) -> Result<Response> {
        let text = command.text();
        let result = self.run_exchange(channel, command, &text, config).await;
        if let Err(ref e) = result {
            trace!(command = %text, error = %e, "exchange failed");
            self.observer.on_event(&ScannerEvent::CommandFailed {
                command: text,
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_exchange(
        &self,
        channel: &mut TransportChannel,
        command: &Command,
        text: &str,
        config: &ExchangeConfig,
    ) -> Result<Response> {
        if config.drain_before_exchange {
            self.drain(channel, config)
                .await
                .map_err(|e| e.during(text, Operation::Drain))?;
        }

        let frame = command.encode();
        channel
            .write(&frame)
            .await
            .map_err(|e| e.during(text, Operation::Write))?;
        let sent_at = Instant::now();
        trace!(command = %text, bytes = frame.len(), "command sent");
        self.observer.on_event(&ScannerEvent::CommandSent {
            command: text.to_string(),
            bytes: frame.len(),
        });

        if !config.settle_delay.is_zero() {
            tokio::time::sleep(config.settle_delay).await;
        }

        let first = channel
            .read(config.read_size, config.primary_timeout)
            .await
            .map_err(|e| e.during(text, Operation::Read))?;
        let mut reply = protocol::decode_response(&first);
        let mut reads = 1;
        let mut continuation = Continuation::NotNeeded;

        if config.continuation_enabled && self.truncation.needs_continuation(&reply) {
            trace!(command = %text, partial = %reply, "reply looks truncated, reading continuation");
            match channel
                .read(config.read_size, config.continuation_timeout)
                .await
            {
                Ok(more) => {
                    reads += 1;
                    reply.push_str(&protocol::decode_response(&more));
                    continuation = Continuation::Appended;
                }
                Err(Error::Timeout) => {
                    reads += 1;
                    trace!(command = %text, "continuation read timed out, keeping partial reply");
                    continuation = Continuation::TimedOut;
                }
                Err(e) => return Err(e.during(text, Operation::ContinuationRead)),
            }
            self.observer.on_event(&ScannerEvent::ContinuationRead {
                command: text.to_string(),
                timed_out: continuation == Continuation::TimedOut,
            });
        }

        trace!(command = %text, response = %reply, reads, "response assembled");
        self.observer.on_event(&ScannerEvent::ResponseReceived {
            command: text.to_string(),
            text: reply.clone(),
            reads,
            elapsed: sent_at.elapsed(),
        });

        Ok(Response {
            command: text.to_string(),
            text: reply,
            reads,
            continuation,
        })
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use async_trait::async_trait;
    use scanlib_core::events::{BroadcastObserver, TracingObserver};
    use scanlib_core::transport::UsbTransport;
    use scanlib_test_harness::{MockFault, MockUsbTransport};
    use std::sync::Mutex;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn channel_config() -> ChannelConfig {
        ChannelConfig {
            interface: 1,
            endpoint_in: 0x81,
            endpoint_out: 0x02,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Standard config without settle delay so tests run instantly.
    fn fast() -> ExchangeConfig {
        ExchangeConfig {
            settle_delay: Duration::ZERO,
            ..ExchangeConfig::standard()
        }
    }

    fn fast_bulk() -> ExchangeConfig {
        ExchangeConfig {
            settle_delay: Duration::ZERO,
            ..ExchangeConfig::bulk_status()
        }
    }

    async fn setup() -> (MockUsbTransport, TransportChannel) {
        let mock = MockUsbTransport::new();
        let mut channel = TransportChannel::new(Box::new(mock.clone()), channel_config());
        channel.claim().await.unwrap();
        (mock, channel)
    }

    fn cmd(text: &str) -> Command {
        Command::parse(text).unwrap()
    }

    /// A device that never goes quiet: one byte every `interval`, forever.
    struct Trickle {
        interval: Duration,
    }

    #[async_trait]
    impl UsbTransport for Trickle {
        async fn claim(&mut self, _interface: u8) -> Result<()> {
            Ok(())
        }

        async fn release(&mut self, _interface: u8) -> Result<()> {
            Ok(())
        }

        async fn write(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
            Ok(data.len())
        }

        async fn read(&mut self, _endpoint: u8, _max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
            if timeout < self.interval {
                tokio::time::sleep(timeout).await;
                return Err(Error::Timeout);
            }
            tokio::time::sleep(self.interval).await;
            Ok(b"x".to_vec())
        }

        async fn reset(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn trickle_channel() -> TransportChannel {
        let transport = Trickle {
            interval: Duration::from_millis(400),
        };
        TransportChannel::new(Box::new(transport), channel_config())
    }

    /// Collects the messages of debug-level events.
    #[derive(Clone, Default)]
    struct DebugLines(Arc<Mutex<Vec<String>>>);

    struct Message(String);

    impl Visit for Message {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for DebugLines {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::DEBUG {
                let mut message = Message(String::new());
                event.record(&mut message);
                self.0.lock().unwrap().push(message.0);
            }
        }
    }

    // =======================================================================
    // Config
    // =======================================================================

    #[test]
    fn standard_config_values() {
        let c = ExchangeConfig::standard();
        assert_eq!(c.read_size, 128);
        assert_eq!(c.drain_timeout, Duration::from_millis(500));
        assert_eq!(c.primary_timeout, Duration::from_millis(5000));
        assert_eq!(c.continuation_timeout, Duration::from_millis(1000));
        assert_eq!(c.settle_delay, Duration::from_millis(100));
        assert!(!c.continuation_enabled);
        assert!(c.drain_before_exchange);
        assert_eq!(ExchangeConfig::default(), c);
    }

    #[test]
    fn bulk_config_values() {
        let c = ExchangeConfig::bulk_status();
        assert_eq!(c.read_size, 256);
        assert_eq!(c.settle_delay, Duration::from_millis(300));
        assert!(c.continuation_enabled);
        assert_eq!(c.primary_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn worst_case_is_settle_plus_two_timeouts_at_most() {
        let c = ExchangeConfig::bulk_status();
        assert_eq!(c.worst_case_after_write(), Duration::from_millis(6300));
        assert_eq!(c.worst_case_exchange(), Duration::from_millis(8300));
        assert!(c.worst_case_exchange() <= c.settle_delay + 2 * c.primary_timeout);

        let s = ExchangeConfig::standard();
        assert_eq!(s.worst_case_after_write(), Duration::from_millis(5100));
        assert_eq!(s.worst_case_exchange(), Duration::from_millis(7100));
        assert!(s.worst_case_exchange() <= s.settle_delay + 2 * s.primary_timeout);

        let no_drain = ExchangeConfig {
            drain_before_exchange: false,
            ..s
        };
        assert_eq!(no_drain.worst_case_exchange(), Duration::from_millis(5100));
    }

    // =======================================================================
    // Truncation heuristic (a guess about an undocumented protocol)
    // =======================================================================

    #[test]
    fn heuristic_trailing_separator_flags_truncation() {
        let policy = TrailingSeparator::default();
        assert!(policy.needs_continuation("GLG,01705000,FM,"));
        assert!(!policy.needs_continuation("GLG,01705000,FM,,0,,,,0,1,,422"));
        assert!(!policy.needs_continuation(""));
    }

    // =======================================================================
    // Drain
    // =======================================================================

    #[tokio::test]
    async fn drain_discards_stale_data_until_timeout() {
        let (mock, mut channel) = setup().await;
        mock.queue_stale(b"GLG,0000,");
        mock.queue_stale(b"stale");

        let report = ResponseAssembler::new()
            .drain(&mut channel, &fast())
            .await
            .unwrap();

        assert_eq!(report.reads, 3);
        assert_eq!(report.bytes, 14);
        assert!(!report.capped);
        assert_eq!(mock.pending_packets(), 0);
        assert!(mock
            .read_calls()
            .iter()
            .all(|r| r.timeout == DRAIN_TIMEOUT && r.max_len == DEFAULT_READ_SIZE));
    }

    #[tokio::test]
    async fn drain_twice_is_idempotent() {
        let (mock, mut channel) = setup().await;
        mock.queue_stale(b"leftover");
        let assembler = ResponseAssembler::new();

        let first = assembler.drain(&mut channel, &fast()).await.unwrap();
        let second = assembler.drain(&mut channel, &fast()).await.unwrap();

        assert_eq!(first.bytes, 8);
        assert_eq!(second.bytes, 0);
        assert_eq!(second.reads, 1);
    }

    #[tokio::test]
    async fn drain_escalates_non_timeout_errors() {
        let (mock, mut channel) = setup().await;
        mock.fail_next_read(MockFault::DeviceLost("gone".into()));

        let result = ResponseAssembler::new().drain(&mut channel, &fast()).await;
        assert!(matches!(result, Err(Error::DeviceLost(_))));
    }

    #[tokio::test]
    async fn drain_stops_at_read_limit() {
        let (mock, mut channel) = setup().await;
        for _ in 0..10 {
            mock.queue_stale(b"chatter");
        }
        let config = ExchangeConfig {
            max_drain_reads: 4,
            ..fast()
        };

        let report = ResponseAssembler::new()
            .drain(&mut channel, &config)
            .await
            .unwrap();

        assert!(report.capped);
        assert_eq!(report.reads, 4);
        assert_eq!(mock.read_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_when_time_budget_is_spent() {
        let mut channel = trickle_channel();

        let start = Instant::now();
        let report = ResponseAssembler::new()
            .drain(&mut channel, &ExchangeConfig::standard())
            .await
            .unwrap();

        assert!(report.capped);
        assert_eq!(report.reads, 5);
        assert_eq!(report.bytes, 5);
        assert!(start.elapsed() <= DRAIN_BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_shortens_last_read_to_fit_budget() {
        let (mock, mut channel) = setup().await;
        let config = ExchangeConfig {
            drain_budget: Duration::from_millis(200),
            ..fast()
        };

        let report = ResponseAssembler::new()
            .drain(&mut channel, &config)
            .await
            .unwrap();

        assert!(!report.capped);
        assert_eq!(mock.read_calls()[0].timeout, Duration::from_millis(200));
    }

    // =======================================================================
    // Exchange
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn exchange_with_chatty_device_stays_within_timing_bound() {
        let mut channel = trickle_channel();
        let config = ExchangeConfig::bulk_status();

        let start = Instant::now();
        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &config)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(response.text(), "x");
        assert!(
            elapsed <= config.worst_case_exchange(),
            "exchange took {elapsed:?}"
        );
        assert!(elapsed <= config.settle_delay + 2 * config.primary_timeout);
    }

    #[tokio::test]
    async fn exchange_basic() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"MDL\r", &[b"MDL,UBC125XLT\r"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("MDL"), &fast())
            .await
            .unwrap();

        assert_eq!(response.text(), "MDL,UBC125XLT");
        assert_eq!(response.command(), "MDL");
        assert_eq!(response.reads(), 1);
        assert_eq!(response.continuation(), Continuation::NotNeeded);
        assert_eq!(mock.sent_data(), vec![b"MDL\r".to_vec()]);
    }

    #[tokio::test]
    async fn exchange_drains_stale_reply_before_writing() {
        let (mock, mut channel) = setup().await;
        mock.queue_stale(b"RF,01705000");
        mock.expect(b"MDL\r", &[b"MDL,UBC125XLT"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("MDL"), &fast())
            .await
            .unwrap();

        assert_eq!(response.text(), "MDL,UBC125XLT");
    }

    #[tokio::test]
    async fn exchange_without_drain_would_misattribute() {
        let (mock, mut channel) = setup().await;
        mock.queue_stale(b"RF,01705000");
        mock.expect(b"MDL\r", &[b"MDL,UBC125XLT"]);
        let config = ExchangeConfig {
            drain_before_exchange: false,
            ..fast()
        };

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("MDL"), &config)
            .await
            .unwrap();

        assert_eq!(response.text(), "RF,01705000");
    }

    #[tokio::test]
    async fn trailing_comma_triggers_exactly_one_continuation_read() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,", b",0,,,,0,1,,422"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(response.text(), "GLG,01705000,FM,,0,,,,0,1,,422");
        assert_eq!(response.reads(), 2);
        assert_eq!(response.continuation(), Continuation::Appended);

        // One drain read, one primary read, one continuation read.
        let reads = mock.read_calls();
        assert_eq!(reads.len(), 3);
        assert_eq!(reads[1].timeout, DEFAULT_TIMEOUT);
        assert_eq!(reads[2].timeout, CONTINUATION_TIMEOUT);
        assert_eq!(reads[2].max_len, BULK_READ_SIZE);
    }

    #[tokio::test]
    async fn continuation_is_not_repeated_even_if_still_truncated() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,1,", b"2,", b"3"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(response.text(), "GLG,1,2,");
        assert_eq!(mock.read_count(), 3);
        assert_eq!(mock.pending_packets(), 1);
    }

    #[tokio::test]
    async fn complete_reply_issues_no_continuation_read() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,,0,,,,0,1,,422"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(response.reads(), 1);
        assert_eq!(mock.read_count(), 2);
    }

    #[tokio::test]
    async fn continuation_disabled_returns_truncated_text() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,", b",0"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast())
            .await
            .unwrap();

        assert_eq!(response.text(), "GLG,01705000,FM,");
        assert_eq!(mock.read_count(), 2);
    }

    #[tokio::test]
    async fn continuation_timeout_returns_partial_reply() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,"]);

        let response = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(response.text(), "GLG,01705000,FM,");
        assert!(response.is_partial());
        assert_eq!(response.continuation(), Continuation::TimedOut);
    }

    #[tokio::test]
    async fn continuation_transport_error_escalates() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,", b",0"]);
        // Read 0 drains, read 1 is the primary read, read 2 the continuation.
        mock.fail_read_at(2, MockFault::Transport("stall".into()));

        let err = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap_err();

        match err {
            Error::CommandFailed {
                command, operation, ..
            } => {
                assert_eq!(command, "GLG");
                assert_eq!(operation, Operation::ContinuationRead);
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_truncation_policy_is_used() {
        struct NeverTruncated;
        impl TruncationPolicy for NeverTruncated {
            fn needs_continuation(&self, _text: &str) -> bool {
                false
            }
        }

        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,", b",0"]);

        let response = ResponseAssembler::new()
            .with_truncation_policy(Box::new(NeverTruncated))
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(response.reads(), 1);
    }

    #[tokio::test]
    async fn primary_read_timeout_is_command_failed() {
        let (mock, mut channel) = setup().await;
        mock.expect_silence(b"RF 422\r");

        let err = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("RF 422"), &fast())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        match err {
            Error::CommandFailed {
                command, operation, ..
            } => {
                assert_eq!(command, "RF 422");
                assert_eq!(operation, Operation::Read);
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_failure_names_write_operation() {
        let (mock, mut channel) = setup().await;
        mock.fail_next_write(MockFault::Transport("pipe stalled".into()));

        let err = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("VOL"), &fast())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CommandFailed {
                operation: Operation::Write,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn drain_failure_names_drain_operation() {
        let (mock, mut channel) = setup().await;
        mock.fail_next_read(MockFault::DeviceLost("unplugged".into()));

        let err = ResponseAssembler::new()
            .exchange(&mut channel, &cmd("BAT"), &fast())
            .await
            .unwrap_err();

        assert!(err.is_device_lost());
        assert!(matches!(
            err,
            Error::CommandFailed {
                operation: Operation::Drain,
                ..
            }
        ));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_elapses_before_first_read() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,01705000,FM,,0,,,,0,1,,422"]);

        let start = tokio::time::Instant::now();
        ResponseAssembler::new()
            .exchange(&mut channel, &cmd("GLG"), &ExchangeConfig::bulk_status())
            .await
            .unwrap();

        assert!(start.elapsed() >= BULK_SETTLE_DELAY);
    }

    #[tokio::test]
    async fn tracing_observer_logs_each_step_once() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,1,", b"422"]);
        let lines = DebugLines::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(lines.clone()));

        ResponseAssembler::new()
            .with_observer(Arc::new(TracingObserver))
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert_eq!(
            *lines.0.lock().unwrap(),
            vec![
                "buffer drained",
                "command sent",
                "continuation read",
                "response received"
            ]
        );
    }

    #[tokio::test]
    async fn observer_sees_exchange_steps() {
        let (mock, mut channel) = setup().await;
        mock.expect(b"GLG\r", &[b"GLG,1,", b"422"]);
        let observer = Arc::new(BroadcastObserver::new(16));
        let mut events = observer.subscribe();

        ResponseAssembler::new()
            .with_observer(observer.clone())
            .exchange(&mut channel, &cmd("GLG"), &fast_bulk())
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            ScannerEvent::BufferDrained { bytes: 0, .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            ScannerEvent::CommandSent {
                command: "GLG".into(),
                bytes: 4
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ScannerEvent::ContinuationRead {
                command: "GLG".into(),
                timed_out: false
            }
        );
        match events.recv().await.unwrap() {
            ScannerEvent::ResponseReceived { text, reads, .. } => {
                assert_eq!(text, "GLG,1,422");
                assert_eq!(reads, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
