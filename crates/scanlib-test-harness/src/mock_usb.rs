//! Mock USB transport for deterministic testing of the exchange engine.
//!
//! [`MockUsbTransport`] implements the [`UsbTransport`] trait with pre-loaded
//! request/reply scripts. This lets you test command framing, draining,
//! continuation reads, and session state handling without a scanner attached.
//!
//! # Example
//!
//! ```
//! use scanlib_test_harness::MockUsbTransport;
//!
//! let mock = MockUsbTransport::new();
//! // When the engine writes this frame, the next reads return these packets.
//! mock.expect(b"GLG\r", &[b"GLG,01705000,FM,", b",0,,,,0,1,,422"]);
//! ```
//!
//! Clones share state: keep one clone in the test and box the other into the
//! code under test, then inspect [`read_calls`](MockUsbTransport::read_calls)
//! and friends afterwards.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use scanlib_core::error::{Error, Result};
use scanlib_core::transport::UsbTransport;

/// A failure the mock can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    /// Produce [`Error::Timeout`].
    Timeout,
    /// Produce [`Error::Transport`] with this message.
    Transport(String),
    /// Produce [`Error::DeviceLost`] with this message.
    DeviceLost(String),
}

impl MockFault {
    fn to_error(&self) -> Error {
        match self {
            MockFault::Timeout => Error::Timeout,
            MockFault::Transport(msg) => Error::Transport(msg.clone()),
            MockFault::DeviceLost(msg) => Error::DeviceLost(msg.clone()),
        }
    }
}

/// One recorded `read()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCall {
    /// Endpoint address passed by the caller.
    pub endpoint: u8,
    /// Maximum length requested.
    pub max_len: usize,
    /// Timeout passed by the caller.
    pub timeout: Duration,
}

/// One recorded `write()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    /// Endpoint address passed by the caller.
    pub endpoint: u8,
    /// Bytes the caller asked to write.
    pub data: Vec<u8>,
    /// Timeout passed by the caller.
    pub timeout: Duration,
}

/// A pre-loaded request with the packets the device "sends back".
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    packets: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Packets waiting to be returned by `read()`, in order.
    inbound: VecDeque<Vec<u8>>,
    read_faults: VecDeque<MockFault>,
    /// Faults keyed by zero-based read call index.
    scheduled_read_faults: Vec<(usize, MockFault)>,
    write_faults: VecDeque<MockFault>,
    claim_fault: Option<MockFault>,
    /// Accept at most this many bytes per write.
    write_limit: Option<usize>,
    connected: bool,
    claimed: Option<u8>,
    claim_count: usize,
    release_count: usize,
    reset_count: usize,
    writes: Vec<WriteCall>,
    reads: Vec<ReadCall>,
}

/// A mock [`UsbTransport`] for testing without hardware.
///
/// Expectations are consumed in order. When `write()` is called, the data is
/// recorded and matched against the next expectation; its packets are then
/// queued for subsequent `read()` calls, one packet per read (split at
/// `max_len` if longer). Once the queue is empty, reads time out, which is
/// exactly what a drained scanner looks like.
#[derive(Debug, Clone)]
pub struct MockUsbTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockUsbTransport {
    /// Create a new mock transport in the connected, unclaimed state.
    pub fn new() -> Self {
        MockUsbTransport {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request and the packets to return after it.
    pub fn expect(&self, request: &[u8], packets: &[&[u8]]) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            packets: packets.iter().map(|p| p.to_vec()).collect(),
        });
    }

    /// Expect a request the device never answers.
    pub fn expect_silence(&self, request: &[u8]) {
        self.expect(request, &[]);
    }

    /// Queue inbound data that is already buffered before any command, as
    /// left behind by an earlier, aborted exchange.
    pub fn queue_stale(&self, packet: &[u8]) {
        self.state().inbound.push_back(packet.to_vec());
    }

    /// Make the next `read()` fail. Faults are consumed before data.
    pub fn fail_next_read(&self, fault: MockFault) {
        self.state().read_faults.push_back(fault);
    }

    /// Make the read call with zero-based index `call` fail, counting every
    /// read since the mock was created (or since [`clear_log`](Self::clear_log)).
    pub fn fail_read_at(&self, call: usize, fault: MockFault) {
        self.state().scheduled_read_faults.push((call, fault));
    }

    /// Make the next `write()` fail.
    pub fn fail_next_write(&self, fault: MockFault) {
        self.state().write_faults.push_back(fault);
    }

    /// Make the next `claim()` fail.
    pub fn fail_claim(&self, fault: MockFault) {
        self.state().claim_fault = Some(fault);
    }

    /// Accept at most `limit` bytes per write, simulating a stalled OUT pipe.
    pub fn limit_writes(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    /// Simulate unplugging (`false`) or replugging (`true`) the device.
    ///
    /// While disconnected every operation fails with [`Error::DeviceLost`].
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// All bytes written, one element per `write()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().writes.iter().map(|w| w.data.clone()).collect()
    }

    /// All recorded `write()` calls.
    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    /// All recorded `read()` calls, including those that timed out.
    pub fn read_calls(&self) -> Vec<ReadCall> {
        self.state().reads.clone()
    }

    /// Number of `read()` calls so far.
    pub fn read_count(&self) -> usize {
        self.state().reads.len()
    }

    /// Forget recorded reads and writes (expectations are kept).
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.reads.clear();
        state.writes.clear();
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Number of packets still waiting to be read.
    pub fn pending_packets(&self) -> usize {
        self.state().inbound.len()
    }

    /// The currently claimed interface, if any.
    pub fn claimed_interface(&self) -> Option<u8> {
        self.state().claimed
    }

    /// Number of successful `claim()` calls.
    pub fn claim_count(&self) -> usize {
        self.state().claim_count
    }

    /// Number of successful `release()` calls.
    pub fn release_count(&self) -> usize {
        self.state().release_count
    }

    /// Number of `reset()` calls.
    pub fn reset_count(&self) -> usize {
        self.state().reset_count
    }
}

impl Default for MockUsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn unplugged() -> Error {
    Error::DeviceLost("mock device disconnected".into())
}

#[async_trait]
impl UsbTransport for MockUsbTransport {
    async fn claim(&mut self, interface: u8) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(unplugged());
        }
        if let Some(fault) = state.claim_fault.take() {
            return Err(fault.to_error());
        }
        if let Some(claimed) = state.claimed {
            return Err(Error::Transport(format!(
                "interface {claimed} is already claimed"
            )));
        }
        state.claimed = Some(interface);
        state.claim_count += 1;
        Ok(())
    }

    async fn release(&mut self, interface: u8) -> Result<()> {
        let mut state = self.state();
        if state.claimed != Some(interface) {
            return Err(Error::NotConnected);
        }
        state.claimed = None;
        state.release_count += 1;
        Ok(())
    }

    async fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        if !state.connected {
            return Err(unplugged());
        }
        if state.claimed.is_none() {
            return Err(Error::NotConnected);
        }

        state.writes.push(WriteCall {
            endpoint,
            data: data.to_vec(),
            timeout,
        });

        if let Some(fault) = state.write_faults.pop_front() {
            return Err(fault.to_error());
        }

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Transport(
                "no more expectations in mock transport".into(),
            ));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Transport(format!(
                "unexpected write: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        state.inbound.extend(expectation.packets);

        Ok(match state.write_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        })
    }

    async fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state();
        let index = state.reads.len();
        state.reads.push(ReadCall {
            endpoint,
            max_len,
            timeout,
        });

        if !state.connected {
            return Err(unplugged());
        }
        if state.claimed.is_none() {
            return Err(Error::NotConnected);
        }
        if let Some(fault) = state.read_faults.pop_front() {
            return Err(fault.to_error());
        }
        if let Some(pos) = state
            .scheduled_read_faults
            .iter()
            .position(|(at, _)| *at == index)
        {
            let (_, fault) = state.scheduled_read_faults.remove(pos);
            return Err(fault.to_error());
        }

        match state.inbound.pop_front() {
            Some(mut packet) => {
                if packet.len() > max_len {
                    let rest = packet.split_off(max_len);
                    state.inbound.push_front(rest);
                }
                Ok(packet)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn reset(&mut self) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(unplugged());
        }
        state.reset_count += 1;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
