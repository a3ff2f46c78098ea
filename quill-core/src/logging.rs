//! Logging setup for Quill.
//!
//! Built on the `tracing` ecosystem: a console layer on stdout and an optional
//! daily-rolling file layer, both in text or JSON format.

use crate::config::LoggingConfig;
use crate::error::{CoreError, LoggingError};
use crate::utils;

use once_cell::sync::Lazy;
use std::io::stdout;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initializes a minimal logging setup, directing messages to `stderr`.
///
/// Intended for tests and for the window between process start and
/// configuration load. Honors `RUST_LOG`, defaulting to "info". Errors (e.g. a
/// subscriber that is already installed) are ignored.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

/// Creates the file logging layer and the guard that flushes it.
fn create_file_layer(log_path: &Path, format: &str) -> Result<(BoxedLayer, WorkerGuard), CoreError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            utils::fs::ensure_dir_exists(parent)?;
        }
    }

    let file_appender = tracing_appender::rolling::daily(
        log_path.parent().unwrap_or_else(|| Path::new(".")),
        log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("compositor.log")),
    );
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let layer: BoxedLayer = match format.to_lowercase().as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .boxed(),
        _ => fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .boxed(),
    };
    Ok((layer, guard))
}

/// Keeps the file writer's guard alive so buffered lines are flushed on exit.
static LOG_WORKER_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

fn level_filter(level: &str) -> Result<String, CoreError> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        invalid_level => {
            return Err(CoreError::Logging(LoggingError::InitializationFailure(
                format!("Invalid log level in config: {}", invalid_level),
            )));
        }
    };
    Ok(level.to_string())
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// With `is_reload == false` an already-installed subscriber is an error. With
/// `is_reload == true` the failure is reported on stderr and the previous
/// subscriber stays in place, though the file guard is still swapped.
pub fn initialize_logging(config: &LoggingConfig, is_reload: bool) -> Result<(), CoreError> {
    let level_filter_str = level_filter(&config.level)?;

    let stdout_filter = EnvFilter::new(level_filter_str.clone());
    let stdout_layer: BoxedLayer = match config.format.to_lowercase().as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(stdout)
            .with_ansi(false)
            .with_filter(stdout_filter)
            .boxed(),
        _ => fmt::layer()
            .with_writer(stdout)
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_filter(stdout_filter)
            .boxed(),
    };

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer];
    let mut new_file_guard: Option<WorkerGuard> = None;
    if let Some(log_path) = &config.file_path {
        let (file_layer, guard) = create_file_layer(log_path, &config.format)?;
        new_file_guard = Some(guard);
        layers.push(
            file_layer
                .with_filter(EnvFilter::new(level_filter_str))
                .boxed(),
        );
    }

    let result = Registry::default().with(layers).try_init();

    match LOG_WORKER_GUARD.lock() {
        Ok(mut guard_slot) => {
            // Dropping the previous guard flushes the old file writer.
            *guard_slot = new_file_guard;
        }
        Err(e) => {
            eprintln!(
                "[ERROR] Failed to lock LOG_WORKER_GUARD to update: {}. Log flushing may be affected.",
                e
            );
        }
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) if !is_reload => Err(CoreError::Logging(LoggingError::InitializationFailure(
            format!(
                "Failed to set global tracing subscriber. Was it already initialized? Error: {}",
                e
            ),
        ))),
        Err(e) => {
            eprintln!(
                "[INFO] Re-initializing logging configuration attempted. Previous logger may persist. Error: {}",
                e
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_minimal_logging_runs_without_panic() {
        init_minimal_logging();
        init_minimal_logging();
        tracing::info!("minimal logging initialized twice");
    }

    #[test]
    fn test_create_file_layer_formats() {
        let temp_dir = TempDir::new().unwrap();
        for format in ["text", "json"] {
            let log_path = temp_dir.path().join(format!("{}.log", format));
            let result = create_file_layer(&log_path, format);
            assert!(result.is_ok(), "create_file_layer failed: {:?}", result.err());
        }
    }

    #[test]
    fn test_create_file_layer_ensures_parent_dir_exists() {
        let temp_dir = TempDir::new().unwrap();
        let nested_log_path = temp_dir.path().join("new_parent_dir/nested.log");
        assert!(!nested_log_path.parent().unwrap().exists());

        let result = create_file_layer(&nested_log_path, "text");
        assert!(result.is_ok(), "create_file_layer failed: {:?}", result.err());
        assert!(nested_log_path.parent().unwrap().exists());
    }

    #[test]
    fn test_level_filter_rejects_unknown_level() {
        match level_filter("supertrace") {
            Err(CoreError::Logging(LoggingError::InitializationFailure(msg))) => {
                assert!(msg.contains("Invalid log level in config: supertrace"));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(level_filter("WARN").unwrap(), "WARN");
    }

    #[test]
    fn test_initialize_logging_invalid_level_returns_error() {
        let config = LoggingConfig {
            level: "supertrace".to_string(),
            file_path: None,
            format: "text".to_string(),
        };
        assert!(matches!(
            initialize_logging(&config, false),
            Err(CoreError::Logging(LoggingError::InitializationFailure(_)))
        ));
    }

    #[test]
    fn test_reload_never_errors() {
        let temp_dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            file_path: Some(temp_dir.path().join("reload.log")),
            format: "json".to_string(),
        };
        // Another test may already own the global subscriber; a reload tolerates that.
        assert!(initialize_logging(&config, true).is_ok());
        assert!(LOG_WORKER_GUARD.lock().unwrap().is_some());

        let console_only = LoggingConfig {
            file_path: None,
            ..config
        };
        assert!(initialize_logging(&console_only, true).is_ok());
        assert!(LOG_WORKER_GUARD.lock().unwrap().is_none());
    }
}
