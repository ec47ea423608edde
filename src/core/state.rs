//! Keyboard state types

use crate::hid::protocol::ProtocolMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Keymap layer active on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Layer 0
    Windows,
    /// Layer 1
    Mac,
}

impl Layer {
    /// Request that switches the keyboard to this layer
    pub fn select_message(self) -> ProtocolMessage {
        match self {
            Layer::Windows => ProtocolMessage::SelectWindows,
            Layer::Mac => ProtocolMessage::SelectMac,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Windows => write!(f, "Windows"),
            Layer::Mac => write!(f, "Mac"),
        }
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" | "0" => Ok(Layer::Windows),
            "mac" | "macos" | "1" => Ok(Layer::Mac),
            other => Err(format!("unknown layer: {}", other)),
        }
    }
}

/// Whether the layer switch key is enabled; `None` until the keyboard says so
pub type KeyEnablement = Option<bool>;

/// Link state of the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Consistent copy of the session state, taken under the session lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub layer: Option<Layer>,
    pub key_enabled: KeyEnablement,
    /// Negotiated report size (only while connected)
    pub capacity: Option<usize>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_connected() {
            return write!(f, "disconnected");
        }

        let layer = self
            .layer
            .map_or_else(|| "unknown".to_string(), |l| l.to_string());
        let key = match self.key_enabled {
            Some(true) => "enabled",
            Some(false) => "disabled",
            None => "unknown",
        };
        write!(f, "connected, layer {}, layer key {}", layer, key)
    }
}
