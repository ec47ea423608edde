//! HID module - Raw HID communication with the Sinc keyboard

pub mod descriptor;
mod device;
pub mod protocol;
pub mod transport;

pub use device::{list_devices, open, DeviceSummary, HidManager, OpenedDevice};
pub use protocol::{decode, encode, DecodeError, ProtocolMessage};
pub use transport::{MemoryWriter, ReportWriter, TransportError, TransportHandle};
