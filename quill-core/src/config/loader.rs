//! Configuration Loading for Quill.
//!
//! [`ConfigLoader`] locates the compositor's TOML configuration file, parses it,
//! fills in defaults for anything omitted, and validates the result.
//!
//! ## Configuration File Location
//!
//! `ConfigLoader::load(None)` reads the path named by the `QUILL_CONFIG`
//! environment variable, or `/etc/quill/compositor.toml` when it is unset.
//! A missing file is not an error: the default configuration is used instead.
//!
//! ## Validation
//!
//! - Log levels and formats are normalized to lowercase and checked.
//! - Parent directories of the log file are created.
//! - Display geometry must be non-zero and the stride, if given, must cover a
//!   full line of pixels.
//! - Compositor timings must be non-zero, and the ping deadline must be shorter
//!   than the ping interval.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defaults::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use crate::config::{CompositorConfig, CoreConfig, DisplayConfig};
use crate::error::{ConfigError, CoreError};
use crate::utils::fs as quill_fs;

/// Pixel format names understood by the buffer layer, with their size in bytes.
const KNOWN_PIXEL_FORMATS: &[(&str, u32)] = &[
    ("rgb16", 2),
    ("rgb32", 4),
    ("argb32", 4),
    ("argb32_premultiplied", 4),
    ("rgbx8888", 4),
    ("rgba8888", 4),
    ("grayscale8", 1),
];

/// `ConfigLoader` provides static methods to load and validate `CoreConfig`.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates the `CoreConfig`.
    ///
    /// With `path == None` the location comes from `QUILL_CONFIG`, falling back
    /// to [`DEFAULT_CONFIG_PATH`]. A file that does not exist yields the default
    /// configuration; any other read failure is a [`ConfigError::ReadError`].
    pub fn load(path: Option<&Path>) -> Result<CoreConfig, CoreError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::resolve_config_path(),
        };

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => {
                tracing::debug!(path = %config_path.display(), "Loaded configuration file");
                Self::parse(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %config_path.display(),
                    "Configuration file not found, using defaults"
                );
                CoreConfig::default()
            }
            Err(e) => {
                return Err(CoreError::Config(ConfigError::ReadError {
                    path: config_path,
                    source: e,
                }));
            }
        };

        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Parses and validates configuration from an in-memory TOML string.
    pub fn load_from_str(content: &str) -> Result<CoreConfig, CoreError> {
        let mut config = Self::parse(content)?;
        Self::validate_config(&mut config)?;
        Ok(config)
    }

    fn resolve_config_path() -> PathBuf {
        match env::var_os(CONFIG_PATH_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    fn parse(content: &str) -> Result<CoreConfig, CoreError> {
        if content.trim().is_empty() {
            return Ok(CoreConfig::default());
        }
        toml::from_str(content).map_err(|e| CoreError::Config(ConfigError::ParseError(e)))
    }

    /// Validates the configuration, normalizing string fields in place.
    pub fn validate_config(config: &mut CoreConfig) -> Result<(), CoreError> {
        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {
                config.logging.level = level_lower;
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                ))));
            }
        }

        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => {
                config.logging.format = format_lower;
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                ))));
            }
        }

        if let Some(log_path) = &config.logging.file_path {
            if let Some(parent_dir) = log_path.parent() {
                if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                    quill_fs::ensure_dir_exists(parent_dir)?;
                }
            }
        }

        Self::validate_display_config(&mut config.display)?;
        Self::validate_compositor_config(&config.compositor)?;
        Ok(())
    }

    fn validate_display_config(display: &mut DisplayConfig) -> Result<(), CoreError> {
        if display.width == 0 || display.height == 0 {
            return Err(CoreError::Config(ConfigError::ValidationError(format!(
                "Invalid display geometry: {}x{}. Width and height must be positive.",
                display.width, display.height
            ))));
        }

        let format_lower = display.pixel_format.to_lowercase();
        let bytes_per_pixel = KNOWN_PIXEL_FORMATS
            .iter()
            .find(|(name, _)| *name == format_lower)
            .map(|(_, bpp)| *bpp)
            .ok_or_else(|| {
                CoreError::Config(ConfigError::ValidationError(format!(
                    "Unknown pixel format: '{}'.",
                    display.pixel_format
                )))
            })?;
        display.pixel_format = format_lower;

        if let Some(stride) = display.stride {
            let min_stride = u64::from(display.width) * u64::from(bytes_per_pixel);
            if u64::from(stride) < min_stride {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Display stride {} is shorter than one line of pixels ({} bytes).",
                    stride, min_stride
                ))));
            }
        }
        Ok(())
    }

    fn validate_compositor_config(compositor: &CompositorConfig) -> Result<(), CoreError> {
        let timings = [
            ("wait_timeout_ms", compositor.wait_timeout_ms),
            ("completed_ttl_ms", compositor.completed_ttl_ms),
            ("correlator_tick_ms", compositor.correlator_tick_ms),
            ("shutdown_timeout_ms", compositor.shutdown_timeout_ms),
            ("ping_interval_ms", compositor.ping_interval_ms),
            ("ping_deadline_ms", compositor.ping_deadline_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::Config(ConfigError::ValidationError(format!(
                "Compositor timing '{}' must be greater than zero.",
                name
            ))));
        }
        if compositor.ping_deadline_ms >= compositor.ping_interval_ms {
            return Err(CoreError::Config(ConfigError::ValidationError(
                "ping_deadline_ms must be shorter than ping_interval_ms.".to_string(),
            )));
        }
        Ok(())
    }
}
