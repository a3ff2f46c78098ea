//! Default configuration values for Quill.
//!
//! These functions are used by `serde`'s `default` attribute in the configuration
//! structures to provide sensible default values when they are not specified in
//! the configuration file. The display defaults describe a reMarkable 1 panel.

use crate::config::{CompositorConfig, DisplayConfig, LoggingConfig};
use std::path::PathBuf;

/// Path searched when no explicit configuration path is given and
/// `QUILL_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/quill/compositor.toml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "QUILL_CONFIG";

pub(super) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

pub(super) fn default_display_config() -> DisplayConfig {
    DisplayConfig {
        device: default_framebuffer_device(),
        width: default_screen_width(),
        height: default_screen_height(),
        stride: None,
        pixel_format: default_pixel_format(),
        temperature: default_temperature(),
    }
}

pub(super) fn default_compositor_config() -> CompositorConfig {
    CompositorConfig {
        wait_timeout_ms: default_wait_timeout_ms(),
        completed_ttl_ms: default_completed_ttl_ms(),
        correlator_tick_ms: default_correlator_tick_ms(),
        shutdown_timeout_ms: default_shutdown_timeout_ms(),
        ping_interval_ms: default_ping_interval_ms(),
        ping_deadline_ms: default_ping_deadline_ms(),
    }
}

/// Returns the default log level string (`"info"`).
pub(super) fn default_log_level() -> String {
    "info".to_string()
}

/// Returns the default log file path (`None`, console only).
pub(super) fn default_log_file_path() -> Option<PathBuf> {
    None
}

/// Returns the default log format string (`"text"`).
pub(super) fn default_log_format() -> String {
    "text".to_string()
}

pub(super) fn default_framebuffer_device() -> PathBuf {
    PathBuf::from("/dev/fb0")
}

pub(super) fn default_screen_width() -> u32 {
    1404
}

pub(super) fn default_screen_height() -> u32 {
    1872
}

pub(super) fn default_pixel_format() -> String {
    "rgb16".to_string()
}

/// Temperature hint passed with every update; 0x18 is what the stock
/// driver uses for room temperature.
pub(super) fn default_temperature() -> i32 {
    0x0018
}

pub(super) fn default_wait_timeout_ms() -> u64 {
    7_000
}

pub(super) fn default_completed_ttl_ms() -> u64 {
    30_000
}

pub(super) fn default_correlator_tick_ms() -> u64 {
    50
}

pub(super) fn default_shutdown_timeout_ms() -> u64 {
    6_000
}

pub(super) fn default_ping_interval_ms() -> u64 {
    10_000
}

pub(super) fn default_ping_deadline_ms() -> u64 {
    5_000
}
