//! # scanlib -- Command protocol layer for USB radio scanners
//!
//! `scanlib` is an asynchronous Rust library for talking to radio scanners
//! whose front panel is mirrored by a text command port on USB bulk
//! endpoints. It frames commands, reassembles replies that arrive without a
//! terminator, recovers from stale buffered data, and parses the loosely
//! delimited multi-field status replies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scanlib::uniden::{models::ubc125xlt, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = SessionBuilder::new(ubc125xlt()).build().await?;
//!     session.initialize().await?;
//!
//!     println!("{}", session.get_model().await?);
//!     if let Some(status) = session.read_status().await? {
//!         println!("{:?} MHz on channel {:?}", status.frequency_mhz, status.channel);
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                            |
//! |---------------------|----------------------------------------------------|
//! | `scanlib-core`      | [`UsbTransport`] trait, session states, events, errors |
//! | `scanlib-transport` | `nusb`-backed USB bulk transport                   |
//! | `scanlib-text-io`   | Framing, drain/continuation exchange, reply parsing |
//! | `scanlib-uniden`    | Uniden models, command API and session             |
//! | **`scanlib`**       | This facade crate -- re-exports everything         |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                  | Default |
//! |----------|------------------------------------------|---------|
//! | `uniden` | [`uniden`] module                        | yes     |
//! | `usb`    | [`transport`] module and `SessionBuilder::build()` | yes |
//! | `full`   | Everything                               | no      |
//!
//! ## Observing exchanges
//!
//! The library never installs a logger. It emits `tracing` spans and
//! events, and reports every exchange step to an [`ExchangeObserver`]
//! supplied at construction. [`BroadcastObserver`] turns those into a
//! channel:
//!
//! ```no_run
//! use std::sync::Arc;
//! use scanlib::{BroadcastObserver, ScannerEvent};
//! use scanlib::uniden::{models::ubc125xlt, SessionBuilder};
//!
//! # async fn example() -> scanlib::Result<()> {
//! let observer = Arc::new(BroadcastObserver::new(64));
//! let mut events = observer.subscribe();
//! let mut session = SessionBuilder::new(ubc125xlt())
//!     .observer(observer.clone())
//!     .build()
//!     .await?;
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let ScannerEvent::ResponseReceived { command, text, .. } = event {
//!             println!("{command} -> {text}");
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```

pub use scanlib_core::*;

/// Command framing, response assembly and reply parsing.
pub mod text_io {
    pub use scanlib_text_io::*;
}

/// Uniden scanner backend.
///
/// Provides [`ScannerSession`](uniden::ScannerSession) and
/// [`SessionBuilder`](uniden::SessionBuilder) for Uniden handhelds with a
/// USB command port.
#[cfg(feature = "uniden")]
pub mod uniden {
    pub use scanlib_uniden::*;
}

/// USB transport backed by `nusb`.
#[cfg(feature = "usb")]
pub mod transport {
    pub use scanlib_transport::*;
}

/// Name and USB identifiers of one supported scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerDefinition {
    pub manufacturer: &'static str,
    pub model_name: &'static str,
    pub usb: UsbProfile,
}

/// Returns a flat list of all supported scanner models across all enabled
/// backends.
///
/// # Example
///
/// ```
/// for scanner in scanlib::supported_scanners() {
///     println!(
///         "{} {} ({:04x}:{:04x})",
///         scanner.manufacturer, scanner.model_name, scanner.usb.vendor_id, scanner.usb.product_id
///     );
/// }
/// ```
pub fn supported_scanners() -> Vec<ScannerDefinition> {
    #[allow(unused_mut)]
    let mut scanners = Vec::new();

    #[cfg(feature = "uniden")]
    {
        scanners.extend(uniden::models::all_uniden_models().into_iter().map(|m| {
            ScannerDefinition {
                manufacturer: "Uniden",
                model_name: m.name,
                usb: m.usb,
            }
        }));
    }

    scanners
}
