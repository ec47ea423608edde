//! Report channel between the keyboard session and the device
//!
//! The session never touches `hidapi` directly. It only sees a
//! [`TransportHandle`], which owns a [`ReportWriter`] and the report capacity
//! negotiated when the device was opened.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Report id used for every outbound report (the keyboard has no numbered reports)
pub const REPORT_ID: u8 = 0x00;

/// Errors raised by the device transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Message does not fit in the negotiated report size
    #[error("report of {len} bytes exceeds capacity of {capacity} bytes")]
    ReportTooLarge { len: usize, capacity: usize },

    /// No HID interface matches the configured descriptor
    #[error(
        "Sinc keyboard not found (VID: 0x{vendor_id:04X}, PID: 0x{product_id:04X}, Usage: 0x{usage_page:04X}/0x{usage_id:02X})"
    )]
    NotFound {
        vendor_id: u16,
        product_id: u16,
        usage_page: u16,
        usage_id: u16,
    },

    /// Device handle was closed underneath the writer
    #[error("device is closed")]
    Closed,

    /// Error reported by hidapi
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
}

/// Sink for raw output reports.
///
/// `report[0]` is the report id; the body follows.
pub trait ReportWriter: Send {
    fn write_report(&mut self, report: &[u8]) -> Result<usize, TransportError>;
}

/// Open report channel for one physical connection
pub struct TransportHandle {
    writer: Box<dyn ReportWriter>,
    capacity: usize,
}

impl TransportHandle {
    /// Wrap a writer with the capacity negotiated for this connection
    pub fn new(writer: Box<dyn ReportWriter>, capacity: usize) -> Self {
        Self { writer, capacity }
    }

    /// Report body size in bytes, fixed for the life of the connection
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Send one report body.
    ///
    /// Bodies shorter than the capacity are zero-padded; longer ones are
    /// rejected without touching the writer.
    pub fn send_report(&mut self, body: &[u8]) -> Result<(), TransportError> {
        if body.len() > self.capacity {
            return Err(TransportError::ReportTooLarge {
                len: body.len(),
                capacity: self.capacity,
            });
        }

        let mut report = Vec::with_capacity(self.capacity + 1);
        report.push(REPORT_ID);
        report.extend_from_slice(body);
        report.resize(self.capacity + 1, 0);

        debug!("Sending output: {:02X?}", &report[..body.len() + 1]);
        let written = self.writer.write_report(&report)?;
        debug!("Wrote {} bytes to HID device", written);

        Ok(())
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Writer that keeps every report in memory.
///
/// Clones share the same log, so a test can hand one clone to the session
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    reports: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every report written so far, report id included
    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.reports.lock().clone()
    }

    /// Drain the report log
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.reports.lock())
    }
}

impl ReportWriter for MemoryWriter {
    fn write_report(&mut self, report: &[u8]) -> Result<usize, TransportError> {
        self.reports.lock().push(report.to_vec());
        Ok(report.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_report_prepends_id_and_pads() {
        let writer = MemoryWriter::new();
        let mut handle = TransportHandle::new(Box::new(writer.clone()), 8);

        handle.send_report(b"\x02JMLR").unwrap();

        let reports = writer.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0], vec![0x00, 0x02, b'J', b'M', b'L', b'R', 0, 0, 0]);
    }

    #[test]
    fn test_send_report_too_large_never_writes() {
        let writer = MemoryWriter::new();
        let mut handle = TransportHandle::new(Box::new(writer.clone()), 4);

        let err = handle.send_report(b"\x02JMLS0").unwrap_err();
        assert!(matches!(
            err,
            TransportError::ReportTooLarge { len: 6, capacity: 4 }
        ));
        assert!(writer.reports().is_empty());
    }

    #[test]
    fn test_send_report_full_capacity() {
        let writer = MemoryWriter::new();
        let mut handle = TransportHandle::new(Box::new(writer.clone()), 4);

        handle.send_report(&[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.take(), vec![vec![0x00, 1, 2, 3, 4]]);
        assert!(writer.reports().is_empty());
    }

    #[test]
    fn test_writer_error_propagates() {
        struct ClosedWriter;
        impl ReportWriter for ClosedWriter {
            fn write_report(&mut self, _report: &[u8]) -> Result<usize, TransportError> {
                Err(TransportError::Closed)
            }
        }

        let mut handle = TransportHandle::new(Box::new(ClosedWriter), 32);
        assert!(matches!(
            handle.send_report(b"\x02JMLE"),
            Err(TransportError::Closed)
        ));
    }
}
