//! Transport implementations for scanlib.
//!
//! This crate provides the concrete implementation of the
//! [`UsbTransport`](scanlib_core::UsbTransport) trait from `scanlib-core`:
//!
//! - [`NusbTransport`]: bulk endpoints of a USB scanner, through the
//!   pure-Rust `nusb` stack (no libusb needed)
//!
//! Kernel-driver detachment, configuration selection and interface claiming
//! all happen here so the protocol crates never see a device handle.

pub mod usb;

pub use usb::NusbTransport;
