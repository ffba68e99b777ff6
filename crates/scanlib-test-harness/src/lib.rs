//! scanlib-test-harness: Test utilities and mock transports for scanlib.
//!
//! This crate provides [`MockUsbTransport`] for deterministic unit testing of
//! the command exchange engine and scanner sessions without a scanner
//! attached.

pub mod mock_usb;

pub use mock_usb::{MockFault, MockUsbTransport, ReadCall, WriteCall};
