//! Domain events exposed to the presentation layer

use super::state::Layer;
use tokio::sync::mpsc;
use tracing::debug;

/// Everything the presentation layer learns about the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    /// Keyboard reported (or echoed) a layer
    LayerChanged(Layer),
    /// Layer switch key was enabled (`true`) or disabled (`false`)
    KeyEnablementChanged(bool),
    /// Keyboard connected (`true`) or disconnected (`false`)
    ConnectionChanged(bool),
}

/// Receiver of domain events.
///
/// Called from the HID delivery thread; implementations must not block and
/// must not call back into the session.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Wrapper around `mpsc::UnboundedSender<DomainEvent>`.
///
/// Events are delivered as they occur; there is no history, so a receiver
/// created late only sees what happens after it was created.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<DomainEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: DomainEvent) -> Result<(), mpsc::error::SendError<DomainEvent>> {
        self.tx.send(event)
    }
}

impl EventSink for EventSender {
    fn emit(&self, event: DomainEvent) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped, discarding {:?}", event);
        }
    }
}
