//! HID device discovery and connection management

use super::descriptor;
use super::transport::{ReportWriter, TransportError, TransportHandle};
use crate::core::config::{HidConfig, MIN_READ_TIMEOUT_MS, MIN_RECONNECT_MS};
use anyhow::{Context, Result};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest report descriptor a HID device may report
const MAX_DESCRIPTOR_SIZE: usize = 4096;

/// Granularity at which sleeping threads notice a stop request
const STOP_POLL_MS: u64 = 50;

type ConnectCallback = Box<dyn FnMut(TransportHandle) + Send>;
type ReportCallback = Box<dyn FnMut(&[u8], usize) + Send>;
type DisconnectCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct TransportCallbacks {
    on_connect: Option<ConnectCallback>,
    on_report: Option<ReportCallback>,
    on_disconnect: Option<DisconnectCallback>,
}

/// An opened Sinc keyboard interface
pub struct OpenedDevice {
    pub device: HidDevice,
    /// Negotiated input report size in bytes
    pub capacity: usize,
    pub name: String,
}

/// Summary of a matching HID interface, for listing
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub path: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: Option<String>,
}

/// Manager for HID device communication with the Sinc keyboard.
///
/// Owns the delivery thread: it looks for the keyboard with exponential
/// backoff, opens it, reads input reports until the device goes away, then
/// starts looking again. Every callback runs on that thread.
pub struct HidManager {
    /// Configuration
    config: HidConfig,
    /// Callbacks, moved into the delivery thread on `start`
    callbacks: Option<TransportCallbacks>,
    /// Whether a device is currently open
    connected: Arc<AtomicBool>,
    /// Whether the delivery thread should stop
    stop_monitor: Arc<AtomicBool>,
    /// Delivery thread handle
    monitor: Option<thread::JoinHandle<()>>,
}

impl HidManager {
    /// Create a new HID manager. Nothing happens until [`HidManager::start`].
    pub fn new(config: HidConfig) -> Self {
        Self {
            config: config.normalized(),
            callbacks: Some(TransportCallbacks::default()),
            connected: Arc::new(AtomicBool::new(false)),
            stop_monitor: Arc::new(AtomicBool::new(false)),
            monitor: None,
        }
    }

    /// Register the callback fired each time the keyboard is opened
    pub fn on_connect(&mut self, f: impl FnMut(TransportHandle) + Send + 'static) -> &mut Self {
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_connect = Some(Box::new(f));
        } else {
            warn!("on_connect registered after start, ignoring");
        }
        self
    }

    /// Register the callback fired for every input report.
    ///
    /// Receives the report buffer and the number of bytes actually delivered.
    pub fn on_report(&mut self, f: impl FnMut(&[u8], usize) + Send + 'static) -> &mut Self {
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_report = Some(Box::new(f));
        } else {
            warn!("on_report registered after start, ignoring");
        }
        self
    }

    /// Register the callback fired each time the open keyboard goes away
    pub fn on_disconnect(&mut self, f: impl FnMut() + Send + 'static) -> &mut Self {
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_disconnect = Some(Box::new(f));
        } else {
            warn!("on_disconnect registered after start, ignoring");
        }
        self
    }

    /// Start the delivery thread
    pub fn start(&mut self) -> Result<()> {
        let Some(callbacks) = self.callbacks.take() else {
            warn!("HID manager already started");
            return Ok(());
        };

        let api = HidApi::new().context("Failed to initialize HID API")?;

        // Don't seize the keyboard exclusively on macOS: only the vendor
        // interface is ours, the keyboard interface must keep typing.
        #[cfg(target_os = "macos")]
        {
            api.set_open_exclusive(false);
        }

        let config = self.config.clone();
        let connected = Arc::clone(&self.connected);
        let stop_monitor = Arc::clone(&self.stop_monitor);

        let handle = thread::Builder::new()
            .name("sinc-hid".to_string())
            .spawn(move || run_monitor(api, config, callbacks, connected, stop_monitor))
            .context("Failed to spawn HID thread")?;
        self.monitor = Some(handle);

        Ok(())
    }

    /// Check if the keyboard is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Stop the delivery thread and close the device
    pub fn stop(&mut self) {
        self.stop_monitor.store(true, Ordering::Relaxed);
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!("HID thread panicked");
            }
        }
    }
}

impl Drop for HidManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delivery thread body
fn run_monitor(
    mut api: HidApi,
    config: HidConfig,
    mut callbacks: TransportCallbacks,
    connected: Arc<AtomicBool>,
    stop_monitor: Arc<AtomicBool>,
) {
    info!("HID monitor thread started");
    let mut backoff = Backoff::new(config.reconnect_initial_ms, config.reconnect_max_ms);

    while !stop_monitor.load(Ordering::Relaxed) {
        // Refresh device list to see newly connected devices
        if let Err(e) = api.refresh_devices() {
            debug!("Failed to refresh device list: {}", e);
        }

        let opened = match open(&api, &config) {
            Ok(opened) => opened,
            Err(e) => {
                let delay_ms = backoff.next_delay();
                match e {
                    TransportError::NotFound { .. } => {
                        debug!("{}, next attempt in {}ms", e, delay_ms)
                    }
                    _ => warn!("Failed to open keyboard: {}, retrying in {}ms", e, delay_ms),
                }
                sleep_unless_stopped(&stop_monitor, delay_ms);
                continue;
            }
        };
        backoff.reset();

        info!("Connected to {} ({} byte reports)", opened.name, opened.capacity);
        let capacity = opened.capacity;
        let device = Arc::new(Mutex::new(Some(opened.device)));
        connected.store(true, Ordering::Relaxed);

        if let Some(on_connect) = callbacks.on_connect.as_mut() {
            let writer = HidReportWriter {
                device: Arc::clone(&device),
            };
            on_connect(TransportHandle::new(Box::new(writer), capacity));
        }

        read_until_closed(&device, capacity, &config, &mut callbacks, &stop_monitor);

        *device.lock() = None;
        connected.store(false, Ordering::Relaxed);
        info!("Disconnected from Sinc keyboard");

        if let Some(on_disconnect) = callbacks.on_disconnect.as_mut() {
            on_disconnect();
        }
    }

    info!("HID monitor thread stopped");
}

/// Read input reports until the device errors out or a stop is requested
fn read_until_closed(
    device: &Mutex<Option<HidDevice>>,
    capacity: usize,
    config: &HidConfig,
    callbacks: &mut TransportCallbacks,
    stop_monitor: &AtomicBool,
) {
    let timeout_ms =
        i32::try_from(config.read_timeout_ms.max(MIN_READ_TIMEOUT_MS)).unwrap_or(i32::MAX);
    let mut buffer = vec![0u8; capacity];

    while !stop_monitor.load(Ordering::Relaxed) {
        // Lock only for the read so writers from other threads get a turn
        let result = {
            let guard = device.lock();
            match guard.as_ref() {
                Some(dev) => dev.read_timeout(&mut buffer, timeout_ms),
                None => return,
            }
        };

        match result {
            Ok(0) => continue,
            Ok(n) => {
                if let Some(on_report) = callbacks.on_report.as_mut() {
                    on_report(&buffer[..], n);
                }
                buffer.fill(0);
            }
            Err(e) => {
                warn!("HID read error: {}", e);
                return;
            }
        }
    }
}

/// Exponential reconnect delay: grows 1.5x per failed attempt up to a cap
#[derive(Debug, Clone)]
struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    fn new(initial_ms: u64, max_ms: u64) -> Self {
        let max_ms = max_ms.max(MIN_RECONNECT_MS);
        let initial_ms = initial_ms.clamp(MIN_RECONNECT_MS, max_ms);
        Self {
            initial_ms,
            max_ms,
            current_ms: initial_ms,
        }
    }

    /// Delay before the next attempt; advances the schedule
    fn next_delay(&mut self) -> u64 {
        let delay = self.current_ms;
        self.current_ms = next_backoff(self.current_ms, self.max_ms);
        delay
    }

    /// Start over after a successful open
    fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }
}

fn next_backoff(current_ms: u64, max_ms: u64) -> u64 {
    let grown = current_ms.saturating_add(current_ms / 2);
    grown.max(current_ms.saturating_add(1)).min(max_ms)
}

fn sleep_unless_stopped(stop_monitor: &AtomicBool, total_ms: u64) {
    let mut remaining = total_ms;
    while remaining > 0 && !stop_monitor.load(Ordering::Relaxed) {
        let step = remaining.min(STOP_POLL_MS);
        thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

fn matches_config(info: &DeviceInfo, config: &HidConfig) -> bool {
    info.vendor_id() == config.vendor_id
        && info.product_id() == config.product_id
        && info.usage_page() == config.usage_page
        && info.usage() == config.usage_id
}

/// Find and open the keyboard's raw HID interface
pub fn open(api: &HidApi, config: &HidConfig) -> Result<OpenedDevice, TransportError> {
    let device_info = api
        .device_list()
        .find(|d| matches_config(d, config))
        .ok_or(TransportError::NotFound {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            usage_page: config.usage_page,
            usage_id: config.usage_id,
        })?;

    let name = format!(
        "{} {}",
        device_info.manufacturer_string().unwrap_or("Unknown"),
        device_info.product_string().unwrap_or("Unknown")
    );

    let device = device_info.open_device(api)?;
    let capacity = negotiate_capacity(&device, config.report_size);

    Ok(OpenedDevice {
        device,
        capacity,
        name,
    })
}

/// Input report size from the report descriptor, or `fallback`
fn negotiate_capacity(device: &HidDevice, fallback: usize) -> usize {
    let mut buf = vec![0u8; MAX_DESCRIPTOR_SIZE];
    match device.get_report_descriptor(&mut buf) {
        Ok(len) => descriptor::capacity_from_descriptor(&buf[..len.min(buf.len())], fallback),
        Err(e) => {
            debug!("Failed to read report descriptor ({}), using {} bytes", e, fallback);
            fallback
        }
    }
}

/// List every interface matching the configured descriptor
pub fn list_devices(api: &HidApi, config: &HidConfig) -> Vec<DeviceSummary> {
    api.device_list()
        .filter(|d| matches_config(d, config))
        .map(|d| DeviceSummary {
            path: d.path().to_string_lossy().into_owned(),
            manufacturer: d.manufacturer_string().unwrap_or("Unknown").to_string(),
            product: d.product_string().unwrap_or("Unknown").to_string(),
            serial: d.serial_number().map(str::to_string),
        })
        .collect()
}

/// Writes output reports to the shared device handle
struct HidReportWriter {
    device: Arc<Mutex<Option<HidDevice>>>,
}

impl ReportWriter for HidReportWriter {
    fn write_report(&mut self, report: &[u8]) -> Result<usize, TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Closed)?;
        Ok(device.write(report)?)
    }
}
