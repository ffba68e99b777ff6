//! ScannerSession -- the command API of a connected Uniden scanner.
//!
//! A session owns one [`TransportChannel`] exclusively and runs one exchange
//! at a time through a [`ResponseAssembler`]. Its lifecycle:
//!
//! ```text
//! Uninitialized --initialize()--> Ready --send()--> Ready ... --close()--> Closed
//!                                   |
//!                                   +--device lost--> Faulted --close()--> Closed
//! ```
//!
//! A failed command leaves the session `Ready` so the caller may retry;
//! only losing the device is terminal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use scanlib_core::error::{Error, Operation, Result};
use scanlib_core::events::{ExchangeObserver, ScannerEvent};
use scanlib_core::types::SessionState;
use scanlib_text_io::channel::TransportChannel;
use scanlib_text_io::io::{DrainReport, ExchangeConfig, Response, ResponseAssembler};
use scanlib_text_io::protocol::Command;
use scanlib_text_io::reply::ReplyParser;

use crate::commands::{self, KEY_PAUSE, KEY_SCAN};
use crate::models::UnidenModel;
use crate::status::{self, StatusRecord};

/// Pause between commands in [`ScannerSession::probe_commands`] by default.
pub const DEFAULT_PROBE_PAUSE: Duration = Duration::from_millis(200);

/// The command vocabulary known to be answered by the UBC125XLT.
pub const DEFAULT_PROBE_COMMANDS: &[&str] = &[
    commands::CMD_MODEL,
    commands::CMD_VERSION,
    commands::CMD_VOLUME,
    commands::CMD_BATTERY,
    commands::CMD_STATUS,
    commands::CMD_BULK_STATUS,
    "KEY,PSE",
    "KEY,SCN",
    "RF 1",
    "PM 1",
    commands::CMD_SQUELCH,
    commands::CMD_BACKLIGHT,
];

/// Result of one command of a probe run.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// The command text as given.
    pub command: String,
    /// The reply text, or why there was none.
    pub reply: Result<String>,
}

/// A Uniden scanner session.
///
/// Constructed via [`SessionBuilder`](crate::builder::SessionBuilder).
pub struct ScannerSession {
    channel: TransportChannel,
    assembler: ResponseAssembler,
    parser: ReplyParser,
    model: UnidenModel,
    standard: ExchangeConfig,
    bulk: ExchangeConfig,
    observer: Arc<dyn ExchangeObserver>,
    state: SessionState,
}

impl ScannerSession {
    /// Create a session from its parts. Callers should use the builder.
    pub(crate) fn new(
        channel: TransportChannel,
        assembler: ResponseAssembler,
        parser: ReplyParser,
        model: UnidenModel,
        standard: ExchangeConfig,
        bulk: ExchangeConfig,
        observer: Arc<dyn ExchangeObserver>,
    ) -> Self {
        ScannerSession {
            channel,
            assembler,
            parser,
            model,
            standard,
            bulk,
            observer,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &UnidenModel {
        &self.model
    }

    /// Exchange settings used for ordinary commands.
    pub fn standard_config(&self) -> &ExchangeConfig {
        &self.standard
    }

    /// Exchange settings used for the bulk status command.
    pub fn bulk_config(&self) -> &ExchangeConfig {
        &self.bulk
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(model = self.model.name, %from, %to, "session state changed");
        self.observer
            .on_event(&ScannerEvent::StateChanged { from, to });
    }

    fn require(
        &self,
        operation: &'static str,
        command: Option<&str>,
        state: SessionState,
    ) -> Result<()> {
        if self.state != state {
            return Err(Error::InvalidState {
                operation,
                command: command.map(str::to_string),
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_channel(&self, channel: u16) -> Result<()> {
        if !self.model.is_valid_channel(channel) {
            return Err(Error::InvalidCommand(format!(
                "channel {channel} out of range 1..={} for {}",
                self.model.channel_count, self.model.name
            )));
        }
        Ok(())
    }

    /// Claim the scanner's interface and discard anything it has buffered.
    ///
    /// Only valid on a fresh session. If the drain fails the claim is
    /// released again, the session stays `Uninitialized` and the cause is
    /// returned as [`Error::InitializeFailed`].
    pub async fn initialize(&mut self) -> Result<DrainReport> {
        self.require("initialize", None, SessionState::Uninitialized)?;

        self.channel.claim().await?;
        match self.assembler.drain(&mut self.channel, &self.standard).await {
            Ok(report) => {
                trace!(reads = report.reads, bytes = report.bytes, "initial drain complete");
                self.set_state(SessionState::Ready);
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "initial drain failed, releasing interface");
                if let Err(release) = self.channel.release().await {
                    warn!(error = %release, "failed to release interface after failed drain");
                }
                Err(Error::InitializeFailed {
                    operation: Operation::Drain,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Send a command with the standard exchange settings.
    ///
    /// Returns [`Error::Encoding`] or [`Error::InvalidCommand`] for bad text,
    /// and [`Error::CommandFailed`] for anything that goes wrong on the wire.
    pub async fn send(&mut self, command: &str) -> Result<Response> {
        let config = self.standard.clone();
        self.send_with(command, &config).await
    }

    /// Send a command with explicit exchange settings.
    pub async fn send_with(&mut self, command: &str, config: &ExchangeConfig) -> Result<Response> {
        self.require("send", Some(command.trim()), SessionState::Ready)?;
        let command = Command::parse(command)?;
        self.exchange(&command, config).await
    }

    /// Send an already built [`Command`] with the standard exchange settings.
    pub async fn send_command(&mut self, command: &Command) -> Result<Response> {
        self.require("send", Some(command.text().as_str()), SessionState::Ready)?;
        let config = self.standard.clone();
        self.exchange(command, &config).await
    }

    async fn exchange(&mut self, command: &Command, config: &ExchangeConfig) -> Result<Response> {
        let result = self
            .assembler
            .exchange(&mut self.channel, command, config)
            .await;
        if let Err(ref e) = result {
            if e.is_device_lost() || !self.channel.is_connected() {
                warn!(command = %command, error = %e, "device lost, session faulted");
                self.set_state(SessionState::Faulted);
            }
        }
        result
    }

    /// Discard buffered inbound data outside of an exchange.
    pub async fn drain(&mut self) -> Result<DrainReport> {
        self.require("drain", None, SessionState::Ready)?;
        let result = self.assembler.drain(&mut self.channel, &self.standard).await;
        if let Err(ref e) = result {
            if e.is_device_lost() {
                self.set_state(SessionState::Faulted);
            }
        }
        result
    }

    /// Release the interface and end the session.
    ///
    /// Calling it again is a no-op. The session ends up `Closed` even if the
    /// release fails (a lost device cannot be released cleanly).
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Uninitialized => {}
            SessionState::Ready | SessionState::Faulted => {
                if let Err(e) = self.channel.release().await {
                    warn!(error = %e, "failed to release interface (closing anyway)");
                }
            }
        }
        self.set_state(SessionState::Closed);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Command wrappers
    // -----------------------------------------------------------------

    /// Model name (`MDL`).
    pub async fn get_model(&mut self) -> Result<Response> {
        self.send(commands::CMD_MODEL).await
    }

    /// Firmware version (`VER`).
    pub async fn get_firmware_version(&mut self) -> Result<Response> {
        self.send(commands::CMD_VERSION).await
    }

    /// Volume level (`VOL`).
    pub async fn get_volume(&mut self) -> Result<Response> {
        self.send(commands::CMD_VOLUME).await
    }

    /// Battery state (`BAT`).
    pub async fn get_battery(&mut self) -> Result<Response> {
        self.send(commands::CMD_BATTERY).await
    }

    /// Display status (`STS`).
    pub async fn get_status(&mut self) -> Result<Response> {
        self.send(commands::CMD_STATUS).await
    }

    /// Squelch level (`SQ`).
    pub async fn get_squelch(&mut self) -> Result<Response> {
        self.send(commands::CMD_SQUELCH).await
    }

    /// Backlight setting (`BLT`).
    pub async fn get_backlight(&mut self) -> Result<Response> {
        self.send(commands::CMD_BACKLIGHT).await
    }

    /// Detail of the current channel (`CIN`).
    pub async fn get_channel_detail(&mut self) -> Result<Response> {
        self.send(commands::CMD_CHANNEL_DETAIL).await
    }

    /// Frequency stored in memory channel `channel` (`RF n`).
    ///
    /// Channels outside the model's range are rejected with
    /// [`Error::InvalidCommand`] before anything is sent.
    pub async fn get_channel_frequency(&mut self, channel: u16) -> Result<Response> {
        self.require_channel(channel)?;
        self.send(&commands::cmd_channel_frequency(channel)).await
    }

    /// Memory detail of channel `channel` (`PM n`).
    pub async fn get_channel_info(&mut self, channel: u16) -> Result<Response> {
        self.require_channel(channel)?;
        self.send(&commands::cmd_channel_info(channel)).await
    }

    /// Simulate a keypress (`KEY,<code>`), e.g. [`KEY_PAUSE`].
    pub async fn press_key(&mut self, code: &str) -> Result<Response> {
        self.send(&commands::cmd_key(code)).await
    }

    /// Press the Hold/Pause key.
    pub async fn pause(&mut self) -> Result<Response> {
        self.press_key(KEY_PAUSE).await
    }

    /// Press the Scan key.
    pub async fn resume_scan(&mut self) -> Result<Response> {
        self.press_key(KEY_SCAN).await
    }

    /// Bulk reception status (`GLG`), with continuation reads and the longer
    /// settle delay.
    pub async fn get_bulk_status(&mut self) -> Result<Response> {
        let config = self.bulk.clone();
        self.send_with(commands::CMD_BULK_STATUS, &config).await
    }

    /// Bulk reception status parsed into a [`StatusRecord`].
    ///
    /// `Ok(None)` means the scanner answered with something other than a
    /// bulk status reply; the exchange itself worked.
    pub async fn read_status(&mut self) -> Result<Option<StatusRecord>> {
        let response = self.get_bulk_status().await?;
        Ok(status::parse_status(
            &self.parser,
            response.text(),
            response.is_partial(),
        ))
    }

    /// Send each command in turn and record what came back.
    ///
    /// Failures are recorded per command and do not stop the run, unless
    /// the session leaves `Ready` (device lost). Waits `pause` between
    /// commands.
    pub async fn probe_commands(&mut self, commands: &[&str], pause: Duration) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::with_capacity(commands.len());

        for (i, command) in commands.iter().enumerate() {
            if self.state != SessionState::Ready {
                warn!(remaining = commands.len() - i, state = %self.state, "probe stopped early");
                break;
            }
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let reply = self.send(command).await.map(Response::into_text);
            match &reply {
                Ok(text) => info!(command, response = %text, "probe reply"),
                Err(e) => warn!(command, error = %e, "probe command failed"),
            }
            outcomes.push(ProbeOutcome {
                command: command.to_string(),
                reply,
            });
        }

        outcomes
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Ready | SessionState::Faulted) {
            debug!(model = self.model.name, "ScannerSession dropped without close()");
        }
    }
}
