//! Session integration tests
//!
//! Drive a `KeyboardSession` the way the HID delivery thread does, with an
//! in-memory report writer standing in for the device.

use sinc_controller::hid::{decode, encode, MemoryWriter, ProtocolMessage, TransportHandle};
use sinc_controller::{
    DomainEvent, EventSender, KeyboardSession, Layer, SessionConfig, SessionError,
    TransportError,
};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::UnboundedReceiver;

const CAPACITY: usize = 32;

fn new_session() -> (Arc<KeyboardSession>, UnboundedReceiver<DomainEvent>) {
    let (events, rx) = EventSender::channel();
    let session = Arc::new(KeyboardSession::new(SessionConfig::default(), Arc::new(events)));
    (session, rx)
}

fn drain(rx: &mut UnboundedReceiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn sent_messages(writer: &MemoryWriter) -> Vec<ProtocolMessage> {
    writer
        .take()
        .iter()
        .map(|report| {
            assert_eq!(report.len(), CAPACITY + 1);
            assert_eq!(report[0], 0x00, "report id");
            decode(&report[1..]).unwrap()
        })
        .collect()
}

fn inbound(message: &ProtocolMessage) -> Vec<u8> {
    encode(message, CAPACITY).unwrap()
}

#[test]
fn test_connect_sequence() {
    let (session, mut rx) = new_session();
    let writer = MemoryWriter::new();

    session.handle_connect(TransportHandle::new(Box::new(writer.clone()), CAPACITY));

    assert_eq!(drain(&mut rx), vec![DomainEvent::ConnectionChanged(true)]);
    assert_eq!(
        sent_messages(&writer),
        vec![ProtocolMessage::SelectMac, ProtocolMessage::DisableKeyRequest]
    );
}

#[test]
fn test_full_session_lifecycle() {
    let (session, mut rx) = new_session();
    let writer = MemoryWriter::new();
    session.handle_connect(TransportHandle::new(Box::new(writer.clone()), CAPACITY));
    drain(&mut rx);
    writer.take();

    // Keyboard confirms the connect policy
    session.handle_report(&inbound(&ProtocolMessage::MacConfirmed), CAPACITY);
    session.handle_report(&inbound(&ProtocolMessage::KeyDisabledConfirmed), CAPACITY);

    // User asks for Windows, keyboard confirms
    session.select_layer(Layer::Windows).unwrap();
    assert_eq!(sent_messages(&writer), vec![ProtocolMessage::SelectWindows]);
    session.handle_report(&inbound(&ProtocolMessage::WindowsConfirmed), CAPACITY);

    // User flips the layer on the keyboard itself
    session.handle_report(&inbound(&ProtocolMessage::LayerEventMac), 5);

    assert_eq!(
        drain(&mut rx),
        vec![
            DomainEvent::LayerChanged(Layer::Mac),
            DomainEvent::KeyEnablementChanged(false),
            DomainEvent::LayerChanged(Layer::Windows),
            DomainEvent::LayerChanged(Layer::Mac),
        ]
    );

    let snapshot = session.snapshot();
    assert_eq!(snapshot.layer, Some(Layer::Mac));
    assert_eq!(snapshot.key_enabled, Some(false));

    // Exit restores the key
    session.shutdown();
    assert_eq!(sent_messages(&writer), vec![ProtocolMessage::EnableKeyRequest]);

    session.handle_disconnect();
    assert_eq!(drain(&mut rx), vec![DomainEvent::ConnectionChanged(false)]);
    assert!(!session.snapshot().is_connected());
}

#[test]
fn test_disconnect_from_known_state() {
    let (session, mut rx) = new_session();
    session.handle_connect(TransportHandle::new(Box::new(MemoryWriter::new()), CAPACITY));
    session.handle_report(&inbound(&ProtocolMessage::LayerEventMac), CAPACITY);
    session.handle_report(&inbound(&ProtocolMessage::KeyEnabledConfirmed), CAPACITY);
    drain(&mut rx);

    session.handle_disconnect();

    assert_eq!(drain(&mut rx), vec![DomainEvent::ConnectionChanged(false)]);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.layer, None);
    assert_eq!(snapshot.key_enabled, None);
}

#[test]
fn test_select_while_disconnected() {
    let (session, mut rx) = new_session();

    assert!(matches!(
        session.select_layer(Layer::Windows),
        Err(SessionError::NotConnected)
    ));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_small_capacity_rejects_long_messages() {
    let (session, _rx) = new_session();
    let writer = MemoryWriter::new();
    session.handle_connect(TransportHandle::new(Box::new(writer.clone()), 5));

    // "\x02JMLS1" is 6 bytes and never reaches the writer; "\x02JMLD" fits
    let reports = writer.take();
    assert_eq!(reports.len(), 1);
    assert_eq!(decode(&reports[0][1..]).unwrap(), ProtocolMessage::DisableKeyRequest);

    assert!(matches!(
        session.select_layer(Layer::Windows),
        Err(SessionError::Transport(TransportError::ReportTooLarge { .. }))
    ));
    assert!(session.refresh_layer_state().is_ok());
    assert_eq!(writer.take().len(), 1);
}

#[test]
fn test_concurrent_commands_and_reports() {
    let (session, mut rx) = new_session();
    let writer = MemoryWriter::new();
    session.handle_connect(TransportHandle::new(Box::new(writer.clone()), CAPACITY));
    drain(&mut rx);
    writer.take();

    let delivery = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            for i in 0..200 {
                let message = if i % 2 == 0 {
                    ProtocolMessage::LayerEventWindows
                } else {
                    ProtocolMessage::LayerEventMac
                };
                session.handle_report(&inbound(&message), CAPACITY);
            }
        })
    };

    for _ in 0..200 {
        session.refresh_layer_state().unwrap();
        let snapshot = session.snapshot();
        assert!(snapshot.is_connected());
        assert_eq!(snapshot.capacity, Some(CAPACITY));
    }
    delivery.join().unwrap();

    assert_eq!(writer.take().len(), 200);
    assert_eq!(drain(&mut rx).len(), 200);
    assert_eq!(session.snapshot().layer, Some(Layer::Mac));
}
