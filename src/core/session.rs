//! Keyboard session state machine
//!
//! [`KeyboardSession`] is the only owner of the per-connection state. The HID
//! delivery thread feeds it connect, report and disconnect notifications;
//! callers on any other thread issue commands and read snapshots. Both sides
//! go through one mutex, so a snapshot never mixes two updates.
//!
//! Commands are fire-and-forget. Confirmations arrive later as ordinary
//! inbound reports and are applied like any other message.

use super::config::SessionConfig;
use super::events::{DomainEvent, EventSink};
use super::state::{ConnectionState, KeyEnablement, Layer, SessionSnapshot};
use crate::hid::protocol::{self, ProtocolMessage};
use crate::hid::transport::{TransportError, TransportHandle};
use crate::hid::HidManager;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned to callers of session commands
#[derive(Debug, Error)]
pub enum SessionError {
    /// Command issued while no keyboard is connected
    #[error("keyboard is not connected")]
    NotConnected,

    /// Toggle requested before the keyboard reported the key state
    #[error("layer key state is not known yet")]
    UnknownKeyState,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// State of one physical connection
#[derive(Debug)]
struct DeviceSession {
    transport: TransportHandle,
    layer: Option<Layer>,
    key_enabled: KeyEnablement,
}

impl DeviceSession {
    fn new(transport: TransportHandle) -> Self {
        Self {
            transport,
            layer: None,
            key_enabled: None,
        }
    }

    fn send(&mut self, message: &ProtocolMessage) -> Result<(), TransportError> {
        let report = protocol::encode(message, self.transport.capacity())?;
        self.transport.send_report(&report)
    }
}

/// Keyboard session shared between the delivery thread and callers
pub struct KeyboardSession {
    /// `None` while disconnected
    device: Mutex<Option<DeviceSession>>,
    sink: Arc<dyn EventSink>,
    config: SessionConfig,
}

impl KeyboardSession {
    pub fn new(config: SessionConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            device: Mutex::new(None),
            sink,
            config,
        }
    }

    /// Transport reported a matching device.
    ///
    /// Always starts from a fresh session, emits `ConnectionChanged(true)`,
    /// then applies the connect policy: select the configured layer and lock
    /// the layer switch key. All of it happens under one hold of the session
    /// lock, so no caller command can land between the policy messages.
    pub fn handle_connect(&self, transport: TransportHandle) {
        let capacity = transport.capacity();
        let mut guard = self.device.lock();
        if guard.is_some() {
            warn!("Connect while a session is open, discarding the stale session");
        }
        let device = guard.insert(DeviceSession::new(transport));

        info!("Keyboard connected (report size {} bytes)", capacity);
        self.sink.emit(DomainEvent::ConnectionChanged(true));

        if let Err(e) = device.send(&self.config.initial_layer.select_message()) {
            warn!("Failed to select initial layer: {}", e);
        }
        if self.config.lock_layer_key {
            if let Err(e) = device.send(&ProtocolMessage::DisableKeyRequest) {
                warn!("Failed to disable layer key: {}", e);
            }
        }
    }

    /// Transport reported the device is gone
    pub fn handle_disconnect(&self) {
        let previous = self.device.lock().take();
        if previous.is_none() {
            debug!("Disconnect while already disconnected");
            return;
        }

        info!("Keyboard disconnected");
        self.sink.emit(DomainEvent::ConnectionChanged(false));
    }

    /// Transport delivered an input report of which `len` bytes are valid
    pub fn handle_report(&self, report: &[u8], len: usize) {
        let body = &report[..len.min(report.len())];
        debug!("Input received: {:02X?}", body);

        match protocol::decode(body) {
            Ok(message) => self.apply(message),
            Err(e) => warn!("Dropping report from keyboard: {}", e),
        }
    }

    /// Apply one decoded message to the session state
    pub fn apply(&self, message: ProtocolMessage) {
        let event = {
            let mut guard = self.device.lock();
            let Some(device) = guard.as_mut() else {
                debug!("Ignoring {:?} while disconnected", message);
                return;
            };

            if let Some(layer) = message.layer() {
                device.layer = Some(layer);
                Some(DomainEvent::LayerChanged(layer))
            } else {
                match message {
                    ProtocolMessage::KeyEnabledConfirmed => {
                        device.key_enabled = Some(true);
                        Some(DomainEvent::KeyEnablementChanged(true))
                    }
                    ProtocolMessage::KeyDisabledConfirmed => {
                        device.key_enabled = Some(false);
                        Some(DomainEvent::KeyEnablementChanged(false))
                    }
                    ProtocolMessage::Unrecognized(raw) => {
                        debug!("Unknown response from keyboard: {:02X?}", raw);
                        None
                    }
                    other => {
                        debug!("Ignoring echoed request {:?}", other);
                        None
                    }
                }
            }
        };

        if let Some(event) = event {
            match event {
                DomainEvent::LayerChanged(layer) => info!("{} layer selected", layer),
                DomainEvent::KeyEnablementChanged(true) => info!("Layer select key enabled"),
                DomainEvent::KeyEnablementChanged(false) => info!("Layer select key disabled"),
                DomainEvent::ConnectionChanged(_) => {}
            }
            self.sink.emit(event);
        }
    }

    /// Ask the keyboard to switch layer
    pub fn select_layer(&self, layer: Layer) -> Result<(), SessionError> {
        self.send(&layer.select_message())
    }

    /// Ask the keyboard to report its current layer
    pub fn refresh_layer_state(&self) -> Result<(), SessionError> {
        self.send(&ProtocolMessage::LayerStatusRequest)
    }

    pub fn enable_layer_key(&self) -> Result<(), SessionError> {
        self.send(&ProtocolMessage::EnableKeyRequest)
    }

    pub fn disable_layer_key(&self) -> Result<(), SessionError> {
        self.send(&ProtocolMessage::DisableKeyRequest)
    }

    /// Flip the layer switch key based on the last state the keyboard reported
    pub fn toggle_layer_key(&self) -> Result<(), SessionError> {
        let snapshot = self.snapshot();
        if !snapshot.is_connected() {
            return Err(SessionError::NotConnected);
        }
        match snapshot.key_enabled {
            Some(true) => self.disable_layer_key(),
            Some(false) => self.enable_layer_key(),
            None => Err(SessionError::UnknownKeyState),
        }
    }

    /// Consistent view of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        match self.device.lock().as_ref() {
            Some(device) => SessionSnapshot {
                connection: ConnectionState::Connected,
                layer: device.layer,
                key_enabled: device.key_enabled,
                capacity: Some(device.transport.capacity()),
            },
            None => SessionSnapshot::default(),
        }
    }

    /// Undo the connect-time key lock before the process exits.
    ///
    /// Best effort: failures are logged, never returned.
    pub fn shutdown(&self) {
        if !self.config.restore_key_on_exit {
            return;
        }
        match self.enable_layer_key() {
            Ok(()) => info!("Layer key re-enabled on exit"),
            Err(SessionError::NotConnected) => debug!("No keyboard to restore on exit"),
            Err(e) => warn!("Failed to re-enable layer key on exit: {}", e),
        }
    }

    fn send(&self, message: &ProtocolMessage) -> Result<(), SessionError> {
        let mut guard = self.device.lock();
        let device = guard.as_mut().ok_or(SessionError::NotConnected)?;
        device.send(message)?;
        debug!("Sent {:?}", message);
        Ok(())
    }
}

/// Route the manager's transport callbacks into `session`
pub fn attach(session: &Arc<KeyboardSession>, manager: &mut HidManager) {
    let on_connect = Arc::clone(session);
    let on_report = Arc::clone(session);
    let on_disconnect = Arc::clone(session);

    manager
        .on_connect(move |transport| on_connect.handle_connect(transport))
        .on_report(move |report, len| on_report.handle_report(report, len))
        .on_disconnect(move || on_disconnect.handle_disconnect());
}
