//! Sinc Layer Controller
//!
//! Observes and switches the active keymap layer of a Sinc keyboard over its
//! vendor-defined Raw HID interface.
//!
//! # Features
//! - Finds the keyboard by VID/PID and usage page, reconnects on replug
//! - Decodes the keyboard's STX-framed text messages into layer and key state
//! - Selects the Mac layer and locks the layer switch key on every connect
//! - Re-enables the layer switch key on exit
//! - Publishes state changes as [`DomainEvent`]s for whatever UI sits on top

pub mod console;
pub mod core;
pub mod hid;
pub mod signal;

pub use crate::core::config::{Config, HidConfig, SessionConfig};
pub use crate::core::events::{DomainEvent, EventSender, EventSink};
pub use crate::core::session::{attach, KeyboardSession, SessionError};
pub use crate::core::state::{ConnectionState, KeyEnablement, Layer, SessionSnapshot};
pub use crate::hid::{HidManager, ProtocolMessage, TransportError};
