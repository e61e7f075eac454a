//! Daemon configuration schema.
//!
//! [`AppConfig`] is read once at startup from an optional TOML file and then
//! overridden field-by-field from the command line.  Every field has a serde
//! default, so an empty file (or no file at all) yields a working daemon:
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! unix_path = "/run/kvmd/kvmd.sock"
//! unix_rm = true
//! unix_mode = 0o660
//! heartbeat = 15.0
//! ws_path = "/ws"
//!
//! [hid]
//! ignore_keys = ["PrintScreen"]
//! mouse_x_range = { min = -32768, max = 32767 }
//! mouse_y_range = { min = -32768, max = 32767 }
//!
//! [hid.jiggler]
//! enabled = true
//! active = false
//! interval = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kvmd_core::MouseRange;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed fine but is out of its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub hid: HidConfig,
}

/// Unix socket and WebSocket settings for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Filesystem path of the listening unix socket.
    #[serde(default = "default_unix_path")]
    pub unix_path: PathBuf,
    /// Remove a stale socket file before binding.
    #[serde(default = "default_true")]
    pub unix_rm: bool,
    /// Permission bits applied to the socket after binding.  `0` leaves the
    /// umask-derived mode untouched.
    #[serde(default = "default_unix_mode")]
    pub unix_mode: u32,
    /// Seconds between WebSocket Ping frames.  `0` disables the heartbeat.
    #[serde(default = "default_heartbeat")]
    pub heartbeat: f64,
    /// Path of the WebSocket upgrade endpoint.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

/// HID behaviour shared by every backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HidConfig {
    /// Key names silently dropped before they reach the backend.
    #[serde(default)]
    pub ignore_keys: Vec<String>,
    #[serde(default)]
    pub mouse_x_range: AxisRange,
    #[serde(default)]
    pub mouse_y_range: AxisRange,
    #[serde(default)]
    pub jiggler: JigglerConfig,
}

/// Output range an absolute mouse axis is remapped into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisRange {
    #[serde(default = "default_axis_min")]
    pub min: i32,
    #[serde(default = "default_axis_max")]
    pub max: i32,
}

/// Mouse jiggler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JigglerConfig {
    /// Whether clients may turn the jiggler on at all.
    #[serde(default)]
    pub enabled: bool,
    /// Initial on/off state.
    #[serde(default)]
    pub active: bool,
    /// Idle seconds before the jiggler moves the mouse.
    #[serde(default = "default_jiggler_interval")]
    pub interval: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_unix_path() -> PathBuf {
    PathBuf::from("/run/kvmd/kvmd.sock")
}
fn default_true() -> bool {
    true
}
fn default_unix_mode() -> u32 {
    0o660
}
fn default_heartbeat() -> f64 {
    15.0
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_axis_min() -> i32 {
    MouseRange::MIN
}
fn default_axis_max() -> i32 {
    MouseRange::MAX
}
fn default_jiggler_interval() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerSettings::default(),
            hid: HidConfig::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            unix_path: default_unix_path(),
            unix_rm: default_true(),
            unix_mode: default_unix_mode(),
            heartbeat: default_heartbeat(),
            ws_path: default_ws_path(),
        }
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self {
            min: default_axis_min(),
            max: default_axis_max(),
        }
    }
}

impl Default for JigglerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            active: false,
            interval: default_jiggler_interval(),
        }
    }
}

// ── Accessors and validation ──────────────────────────────────────────────────

impl ServerSettings {
    /// Heartbeat period, or `None` when the heartbeat is disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat > 0.0 {
            Some(Duration::from_secs_f64(self.heartbeat))
        } else {
            None
        }
    }
}

impl AxisRange {
    /// `true` when the range equals the full wire range, so no remap is needed.
    pub fn is_full(&self) -> bool {
        self.min == MouseRange::MIN && self.max == MouseRange::MAX
    }
}

impl AppConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, plus everything
    /// [`AppConfig::from_toml_str`] can return.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.heartbeat.is_finite() || self.server.heartbeat < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "server.heartbeat must be a non-negative number, got {}",
                self.server.heartbeat
            )));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.ws_path must start with '/', got {:?}",
                self.server.ws_path
            )));
        }
        if self.server.unix_mode > 0o7777 {
            return Err(ConfigError::Invalid(format!(
                "server.unix_mode {:o} is not a permission mode",
                self.server.unix_mode
            )));
        }
        for (name, range) in [
            ("hid.mouse_x_range", &self.hid.mouse_x_range),
            ("hid.mouse_y_range", &self.hid.mouse_y_range),
        ] {
            if range.min < MouseRange::MIN || range.max > MouseRange::MAX || range.min >= range.max
            {
                return Err(ConfigError::Invalid(format!(
                    "{name} must satisfy {} <= min < max <= {}, got {}..{}",
                    MouseRange::MIN,
                    MouseRange::MAX,
                    range.min,
                    range.max
                )));
            }
        }
        if self.hid.jiggler.interval == 0 {
            return Err(ConfigError::Invalid(
                "hid.jiggler.interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
