//! HID report descriptor inspection
//!
//! Only enough of the descriptor grammar is understood to size input reports:
//! Report Size, Report Count, Report ID, Push/Pop and Input main items.

use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Largest input report accepted from a descriptor, in bytes
pub const MAX_REPORT_LEN: usize = 4096;

const ITEM_INPUT: u8 = 0x80;
const ITEM_REPORT_SIZE: u8 = 0x74;
const ITEM_REPORT_ID: u8 = 0x84;
const ITEM_REPORT_COUNT: u8 = 0x94;
const ITEM_PUSH: u8 = 0xA4;
const ITEM_POP: u8 = 0xB4;
const LONG_ITEM: u8 = 0xFE;

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Largest input report described, in bytes.
///
/// When the device uses numbered reports the id byte is counted too, the same
/// way the host's max-input-report-size property does. Returns `None` when the
/// descriptor has no input items or is truncated mid-item. Absurd sizes
/// saturate instead of overflowing.
pub fn max_input_report_len(descriptor: &[u8]) -> Option<usize> {
    let mut state = GlobalState::default();
    let mut stack: Vec<GlobalState> = Vec::new();
    let mut input_bits: BTreeMap<u8, u64> = BTreeMap::new();

    let mut pos = 0;
    while pos < descriptor.len() {
        let prefix = descriptor[pos];

        if prefix == LONG_ITEM {
            let data_len = *descriptor.get(pos + 1)? as usize;
            pos = pos.saturating_add(3 + data_len);
            continue;
        }

        let data_len = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let data = descriptor.get(pos + 1..pos + 1 + data_len)?;
        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);

        match prefix & 0xFC {
            ITEM_REPORT_SIZE => state.report_size = value,
            ITEM_REPORT_COUNT => state.report_count = value,
            ITEM_REPORT_ID => state.report_id = value as u8,
            ITEM_PUSH => stack.push(state),
            ITEM_POP => state = stack.pop().unwrap_or_default(),
            ITEM_INPUT => {
                let bits = input_bits.entry(state.report_id).or_default();
                *bits = bits.saturating_add(state.report_size as u64 * state.report_count as u64);
            }
            _ => {}
        }

        pos += 1 + data_len;
    }

    input_bits
        .into_iter()
        .map(|(id, bits)| {
            let bytes = usize::try_from(bits.div_ceil(8)).unwrap_or(usize::MAX);
            if id == 0 {
                bytes
            } else {
                bytes.saturating_add(1)
            }
        })
        .max()
}

/// Input report capacity for a device, or `fallback` when the descriptor
/// describes no usable input report.
pub fn capacity_from_descriptor(descriptor: &[u8], fallback: usize) -> usize {
    match max_input_report_len(descriptor) {
        Some(0) | None => {
            debug!("No input reports in descriptor, using {} bytes", fallback);
            fallback
        }
        Some(len) if len > MAX_REPORT_LEN => {
            warn!(
                "Descriptor claims {} byte input reports (limit {}), using {} bytes",
                len, MAX_REPORT_LEN, fallback
            );
            fallback
        }
        Some(len) => len,
    }
}
