//! Uniden model definitions.
//!
//! Each supported scanner is described by a [`UnidenModel`] that captures
//! how it appears on the USB bus: vendor/product identifiers, the
//! configuration to select, the interface carrying the command port and its
//! bulk endpoints.
//!
//! Models are defined as factory functions (e.g. [`ubc125xlt()`]) that
//! return a fully populated [`UnidenModel`]:
//!
//! | Model      | VID:PID   | Config | Interface | IN   | OUT  |
//! |------------|-----------|--------|-----------|------|------|
//! | UBC125XLT  | 1965:0018 | 1      | 1         | 0x81 | 0x02 |

use scanlib_core::types::UsbProfile;

/// Static model definition for a Uniden scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnidenModel {
    /// Human-readable model name (e.g. "UBC125XLT").
    pub name: &'static str,
    /// Model string the scanner reports in its `MDL` reply.
    pub model_id: &'static str,
    /// How to reach the command port on the USB bus.
    pub usb: UsbProfile,
    /// Number of memory channels.
    pub channel_count: u16,
}

impl UnidenModel {
    /// Whether `channel` is a valid memory channel number for this model.
    pub fn is_valid_channel(&self, channel: u16) -> bool {
        (1..=self.channel_count).contains(&channel)
    }
}

/// UBC125XLT model definition.
///
/// Handheld 500-channel scanner. The command port is interface 1 of
/// configuration 1, with bulk endpoints `0x81` (IN) and `0x02` (OUT).
pub fn ubc125xlt() -> UnidenModel {
    UnidenModel {
        name: "UBC125XLT",
        model_id: "UBC125XLT",
        usb: UsbProfile {
            vendor_id: 0x1965,
            product_id: 0x0018,
            configuration: 1,
            interface: 1,
            endpoint_in: 0x81,
            endpoint_out: 0x02,
        },
        channel_count: 500,
    }
}

/// Return all supported Uniden model definitions.
pub fn all_uniden_models() -> Vec<UnidenModel> {
    vec![ubc125xlt()]
}

/// Look up a model by the string the scanner reports for `MDL`.
pub fn model_by_id(model_id: &str) -> Option<UnidenModel> {
    all_uniden_models()
        .into_iter()
        .find(|m| m.model_id == model_id)
}
