//! Configuration Data Structures for Quill.
//!
//! These structs are populated by deserializing the compositor's TOML
//! configuration file. Fields missing from the file fall back to the values in
//! [`super::defaults`], and unknown fields are rejected through
//! `#[serde(deny_unknown_fields)]`.

use super::defaults;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration settings for the logging subsystem.
///
/// # Examples
///
/// ```
/// use quill_core::config::LoggingConfig;
/// use std::path::PathBuf;
///
/// let default_log_config = LoggingConfig::default();
/// assert_eq!(default_log_config.level, "info");
/// assert_eq!(default_log_config.file_path, None);
/// assert_eq!(default_log_config.format, "text");
///
/// let toml_str = r#"
/// level = "debug"
/// file_path = "/var/log/quill/compositor.log"
/// format = "json"
/// "#;
/// let log_config: LoggingConfig = toml::from_str(toml_str).unwrap();
/// assert_eq!(log_config.level, "debug");
/// assert_eq!(log_config.file_path, Some(PathBuf::from("/var/log/quill/compositor.log")));
/// assert_eq!(log_config.format, "json");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// The minimum log level to record.
    /// Valid values (case-insensitive): "trace", "debug", "info", "warn", "error".
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Optional path to a file where logs should be written.
    /// If `None`, file logging is disabled.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// The format for log messages. Valid values (case-insensitive): "text", "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        defaults::default_logging_config()
    }
}

/// Physical display settings.
///
/// The compositor cannot start without the framebuffer device named here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    /// Framebuffer device node.
    #[serde(default = "defaults::default_framebuffer_device")]
    pub device: PathBuf,
    /// Visible width of the panel in pixels.
    #[serde(default = "defaults::default_screen_width")]
    pub width: u32,
    /// Visible height of the panel in pixels.
    #[serde(default = "defaults::default_screen_height")]
    pub height: u32,
    /// Bytes per framebuffer line. Some panels pad their lines (the
    /// reMarkable 1 uses a 1408 pixel virtual width), so this may be larger
    /// than `width * bytes_per_pixel`. `None` means unpadded.
    #[serde(default)]
    pub stride: Option<u32>,
    /// Name of the framebuffer pixel format, e.g. "rgb16" or "grayscale8".
    #[serde(default = "defaults::default_pixel_format")]
    pub pixel_format: String,
    /// Temperature hint sent with every update.
    #[serde(default = "defaults::default_temperature")]
    pub temperature: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        defaults::default_display_config()
    }
}

/// Timing knobs of the compositor and the completion correlator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositorConfig {
    /// Age after which a pending marker wait is released as complete.
    #[serde(default = "defaults::default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Lifetime of a completed-marker record before it is purged.
    #[serde(default = "defaults::default_completed_ttl_ms")]
    pub completed_ttl_ms: u64,
    /// How often the correlator re-evaluates pending waits.
    #[serde(default = "defaults::default_correlator_tick_ms")]
    pub correlator_tick_ms: u64,
    /// Bound on joining a worker thread during shutdown.
    #[serde(default = "defaults::default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Interval between liveness pings on a window's event pipe.
    #[serde(default = "defaults::default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Time a client has to answer a ping before it is reported as unresponsive.
    #[serde(default = "defaults::default_ping_deadline_ms")]
    pub ping_deadline_ms: u64,
}

impl CompositorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn completed_ttl(&self) -> Duration {
        Duration::from_millis(self.completed_ttl_ms)
    }

    pub fn correlator_tick(&self) -> Duration {
        Duration::from_millis(self.correlator_tick_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_deadline_ms)
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        defaults::default_compositor_config()
    }
}

/// Root configuration structure of the compositor service.
///
/// # Examples
///
/// ```
/// use quill_core::config::CoreConfig;
///
/// let toml_str = r#"
/// [logging]
/// level = "warn"
///
/// [display]
/// device = "/dev/fb1"
/// "#;
/// let loaded: CoreConfig = toml::from_str(toml_str).unwrap();
/// assert_eq!(loaded.logging.level, "warn");
/// assert_eq!(loaded.display.device.to_str(), Some("/dev/fb1"));
/// assert_eq!(loaded.display.width, 1404);
/// assert_eq!(loaded.compositor.wait_timeout_ms, 7000);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
    #[serde(default = "defaults::default_display_config")]
    pub display: DisplayConfig,
    #[serde(default = "defaults::default_compositor_config")]
    pub compositor: CompositorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            logging: defaults::default_logging_config(),
            display: defaults::default_display_config(),
            compositor: defaults::default_compositor_config(),
        }
    }
}
