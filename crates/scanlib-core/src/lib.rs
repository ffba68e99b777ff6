//! scanlib-core: Core traits, types, and error definitions for scanlib.
//!
//! This crate defines the device-agnostic abstractions shared by every
//! scanlib crate. Applications depend on these types without pulling in a
//! USB stack or a specific scanner driver.
//!
//! # Key types
//!
//! - [`UsbTransport`] -- bulk-endpoint communication channel
//! - [`SessionState`] -- scanner session lifecycle
//! - [`ScannerEvent`] / [`ExchangeObserver`] -- caller-supplied observability hooks
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use scanlib_core::*`.
pub use error::{Error, Operation, Result};
pub use events::{BroadcastObserver, ExchangeObserver, NullObserver, ScannerEvent, TracingObserver};
pub use transport::UsbTransport;
pub use types::{SessionState, UsbProfile};
