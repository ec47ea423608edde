//! Configuration management

use super::state::Layer;
use crate::hid::descriptor::MAX_REPORT_LEN;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Shortest reconnect delay, so a zero cannot spin the delivery thread
pub const MIN_RECONNECT_MS: u64 = 10;

/// Shortest read timeout, so a zero cannot busy-poll the device
pub const MIN_READ_TIMEOUT_MS: u64 = 10;

/// HID device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidConfig {
    /// USB Vendor ID
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// USB Product ID
    #[serde(default = "default_product_id")]
    pub product_id: u16,
    /// HID Usage Page
    #[serde(default = "default_usage_page")]
    pub usage_page: u16,
    /// HID Usage ID
    #[serde(default = "default_usage_id")]
    pub usage_id: u16,
    /// Report size used when the report descriptor cannot be read
    #[serde(default = "default_report_size")]
    pub report_size: usize,
    /// Read timeout on the delivery thread in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,
    /// Upper bound for the reconnect backoff in milliseconds
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

fn default_vendor_id() -> u16 {
    0xCB10
}
fn default_product_id() -> u16 {
    0x1267
}
fn default_usage_page() -> u16 {
    0xFF60
}
fn default_usage_id() -> u16 {
    0x61
}
fn default_report_size() -> usize {
    32
}
fn default_read_timeout() -> u64 {
    100
}
fn default_reconnect_initial() -> u64 {
    500
}
fn default_reconnect_max() -> u64 {
    5000
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            usage_page: default_usage_page(),
            usage_id: default_usage_id(),
            report_size: default_report_size(),
            read_timeout_ms: default_read_timeout(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
        }
    }
}

impl HidConfig {
    /// Clamp timings and sizes into ranges the delivery thread can work with
    pub fn normalized(mut self) -> Self {
        if self.report_size == 0 || self.report_size > MAX_REPORT_LEN {
            let clamped = self.report_size.clamp(1, MAX_REPORT_LEN);
            warn!("hid.report_size {} out of range, using {}", self.report_size, clamped);
            self.report_size = clamped;
        }
        if self.read_timeout_ms < MIN_READ_TIMEOUT_MS {
            warn!("hid.read_timeout_ms {} too small, using {}", self.read_timeout_ms, MIN_READ_TIMEOUT_MS);
            self.read_timeout_ms = MIN_READ_TIMEOUT_MS;
        }
        if self.reconnect_initial_ms < MIN_RECONNECT_MS {
            warn!(
                "hid.reconnect_initial_ms {} too small, using {}",
                self.reconnect_initial_ms, MIN_RECONNECT_MS
            );
            self.reconnect_initial_ms = MIN_RECONNECT_MS;
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            warn!(
                "hid.reconnect_max_ms {} below reconnect_initial_ms, using {}",
                self.reconnect_max_ms, self.reconnect_initial_ms
            );
            self.reconnect_max_ms = self.reconnect_initial_ms;
        }
        self
    }
}

/// What the session does on connect and on exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Layer requested on every fresh connection
    #[serde(default = "default_initial_layer")]
    pub initial_layer: Layer,
    /// Disable the layer switch key on every fresh connection
    #[serde(default = "default_true")]
    pub lock_layer_key: bool,
    /// Re-enable the layer switch key when the process exits
    #[serde(default = "default_true")]
    pub restore_key_on_exit: bool,
}

fn default_initial_layer() -> Layer {
    Layer::Mac
}
fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_layer: default_initial_layer(),
            lock_layer_key: true,
            restore_key_on_exit: true,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HID device configuration
    #[serde(default)]
    pub hid: HidConfig,
    /// Session policy
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.hid = config.hid.normalized();
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "sinc", "SincController")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }
}
