//! HID protocol definitions for the Sinc layer controller
//!
//! Protocol based on the keyboard firmware's raw HID handler:
//! - Every message is ASCII text prefixed with STX (0x02)
//! - Reports are padded with NUL up to the negotiated report size
//! - No sequence numbers, no checksums; messages are self-describing

use super::transport::TransportError;
use crate::core::state::Layer;
use thiserror::Error;

/// Control byte that opens every message
pub const STX: u8 = 0x02;

const SELECT_WINDOWS: &[u8] = b"\x02JMLS0";
const SELECT_MAC: &[u8] = b"\x02JMLS1";
const LAYER_STATUS_REQUEST: &[u8] = b"\x02JMLR";
const DISABLE_KEY_REQUEST: &[u8] = b"\x02JMLD";
const ENABLE_KEY_REQUEST: &[u8] = b"\x02JMLE";
const WINDOWS_CONFIRMED: &[u8] = b"\x02JML\x0f";
const MAC_CONFIRMED: &[u8] = b"\x02JML\x0e";
const KEY_DISABLED_CONFIRMED: &[u8] = b"\x02JMLDS";
const KEY_ENABLED_CONFIRMED: &[u8] = b"\x02JMLES";
const LAYER_EVENT_WINDOWS: &[u8] = b"\x02JML0";
const LAYER_EVENT_MAC: &[u8] = b"\x02JML1";

/// Messages exchanged with the keyboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Host asks for layer 0 (Windows)
    SelectWindows,
    /// Host asks for layer 1 (Mac)
    SelectMac,
    /// Host asks the keyboard to report its current layer
    LayerStatusRequest,
    /// Host asks the keyboard to disable the layer switch key
    DisableKeyRequest,
    /// Host asks the keyboard to enable the layer switch key
    EnableKeyRequest,
    /// Keyboard answers: Windows layer active
    WindowsConfirmed,
    /// Keyboard answers: Mac layer active
    MacConfirmed,
    /// Keyboard answers: layer switch key disabled
    KeyDisabledConfirmed,
    /// Keyboard answers: layer switch key enabled
    KeyEnabledConfirmed,
    /// User switched to the Windows layer on the keyboard
    LayerEventWindows,
    /// User switched to the Mac layer on the keyboard
    LayerEventMac,
    /// Valid text that matches nothing above.
    ///
    /// Carries the report body with its trailing NUL padding removed, not the
    /// full padded report, so logs show only what the keyboard wrote. Leading
    /// bytes are kept as received.
    Unrecognized(Vec<u8>),
}

impl ProtocolMessage {
    /// Every message the host sends
    pub const OUTBOUND: [ProtocolMessage; 5] = [
        ProtocolMessage::SelectWindows,
        ProtocolMessage::SelectMac,
        ProtocolMessage::LayerStatusRequest,
        ProtocolMessage::DisableKeyRequest,
        ProtocolMessage::EnableKeyRequest,
    ];

    /// Every message the keyboard sends
    pub const INBOUND: [ProtocolMessage; 6] = [
        ProtocolMessage::WindowsConfirmed,
        ProtocolMessage::MacConfirmed,
        ProtocolMessage::KeyDisabledConfirmed,
        ProtocolMessage::KeyEnabledConfirmed,
        ProtocolMessage::LayerEventWindows,
        ProtocolMessage::LayerEventMac,
    ];

    /// Unpadded wire representation, including the leading STX
    pub fn wire_bytes(&self) -> &[u8] {
        match self {
            ProtocolMessage::SelectWindows => SELECT_WINDOWS,
            ProtocolMessage::SelectMac => SELECT_MAC,
            ProtocolMessage::LayerStatusRequest => LAYER_STATUS_REQUEST,
            ProtocolMessage::DisableKeyRequest => DISABLE_KEY_REQUEST,
            ProtocolMessage::EnableKeyRequest => ENABLE_KEY_REQUEST,
            ProtocolMessage::WindowsConfirmed => WINDOWS_CONFIRMED,
            ProtocolMessage::MacConfirmed => MAC_CONFIRMED,
            ProtocolMessage::KeyDisabledConfirmed => KEY_DISABLED_CONFIRMED,
            ProtocolMessage::KeyEnabledConfirmed => KEY_ENABLED_CONFIRMED,
            ProtocolMessage::LayerEventWindows => LAYER_EVENT_WINDOWS,
            ProtocolMessage::LayerEventMac => LAYER_EVENT_MAC,
            ProtocolMessage::Unrecognized(raw) => raw,
        }
    }

    /// Layer this message is evidence of.
    ///
    /// Confirmations, echoed requests and user-driven layer events all count
    /// the same; the wire format gives no way to tell them apart.
    pub fn layer(&self) -> Option<Layer> {
        match self {
            ProtocolMessage::WindowsConfirmed
            | ProtocolMessage::SelectWindows
            | ProtocolMessage::LayerEventWindows => Some(Layer::Windows),
            ProtocolMessage::MacConfirmed
            | ProtocolMessage::SelectMac
            | ProtocolMessage::LayerEventMac => Some(Layer::Mac),
            _ => None,
        }
    }
}

/// Inbound report could not be turned into a message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("report is not valid UTF-8 text: {0}")]
    InvalidText(#[from] std::str::Utf8Error),
}

/// Encode a message into a report body of exactly `capacity` bytes.
///
/// The report id is not part of the body; the transport prepends it.
pub fn encode(message: &ProtocolMessage, capacity: usize) -> Result<Vec<u8>, TransportError> {
    let bytes = message.wire_bytes();
    if bytes.len() > capacity {
        return Err(TransportError::ReportTooLarge {
            len: bytes.len(),
            capacity,
        });
    }

    let mut report = vec![0u8; capacity];
    report[..bytes.len()].copy_from_slice(bytes);
    Ok(report)
}

/// Decode an inbound report body
pub fn decode(report: &[u8]) -> Result<ProtocolMessage, DecodeError> {
    let trimmed = trim_padding(report);
    std::str::from_utf8(trimmed)?;

    let message = match trimmed {
        SELECT_WINDOWS => ProtocolMessage::SelectWindows,
        SELECT_MAC => ProtocolMessage::SelectMac,
        LAYER_STATUS_REQUEST => ProtocolMessage::LayerStatusRequest,
        DISABLE_KEY_REQUEST => ProtocolMessage::DisableKeyRequest,
        ENABLE_KEY_REQUEST => ProtocolMessage::EnableKeyRequest,
        WINDOWS_CONFIRMED => ProtocolMessage::WindowsConfirmed,
        MAC_CONFIRMED => ProtocolMessage::MacConfirmed,
        KEY_DISABLED_CONFIRMED => ProtocolMessage::KeyDisabledConfirmed,
        KEY_ENABLED_CONFIRMED => ProtocolMessage::KeyEnabledConfirmed,
        LAYER_EVENT_WINDOWS => ProtocolMessage::LayerEventWindows,
        LAYER_EVENT_MAC => ProtocolMessage::LayerEventMac,
        other => ProtocolMessage::Unrecognized(other.to_vec()),
    };

    Ok(message)
}

/// Strip trailing NUL padding
fn trim_padding(report: &[u8]) -> &[u8] {
    let end = report.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &report[..end]
}
