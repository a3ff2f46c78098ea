//! Errors of the Quill core layer.
//!
//! [`CoreError`] is what the loader and the logging setup return. It wraps the
//! narrower [`ConfigError`] and [`LoggingError`].

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for the Quill compositor.
///
/// This enum represents all possible errors that can occur in the core layer.
/// Other crates wrap it when they surface configuration or logging failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Errors related to configuration loading, parsing, or validation.
    /// Wraps a [`ConfigError`].
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    /// Errors that occur during the initialization of the logging system.
    /// Wraps a [`LoggingError`].
    #[error("Logging Error: {0}")]
    Logging(#[from] LoggingError),

    /// Errors related to filesystem operations, such as creating directories,
    /// that are not covered by more specific configuration or logging I/O errors.
    #[error("Filesystem Error: {message} (Path: {path:?})")]
    Filesystem {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// General I/O errors not covered by other specific variants.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for configuration-related operations.
///
/// It is typically wrapped by [`CoreError::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An error occurred while attempting to read a configuration file.
    #[error("Failed to read configuration file from {path:?}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error occurred while parsing a configuration file (e.g., invalid TOML).
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// An error occurred due to invalid configuration values after successful parsing.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Error type for logging-related operations.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// A global subscriber was already installed or the configured level is
    /// unknown.
    #[error("Failed to initialize logging: {0}")]
    InitializationFailure(String),
}
