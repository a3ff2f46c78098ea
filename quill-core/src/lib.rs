//! # Quill Core Library (`quill-core`)
//!
//! `quill-core` is the foundational library of the Quill e-paper compositor.
//! It provides the pieces every other crate in the workspace leans on:
//!
//! - **Error Handling**: A unified error system through the [`CoreError`] enum and its
//!   associated specific error types [`ConfigError`] and [`LoggingError`].
//! - **Geometry**: Integer screen geometry ([`Point`], [`Size`], [`Rect`]) and the
//!   disjoint-rectangle [`Region`] used for damage and occlusion tracking.
//! - **Configuration Management**: TOML configuration loading with default fallbacks
//!   and validation through [`ConfigLoader`] and [`CoreConfig`].
//! - **Logging**: A logging setup built on top of the `tracing` crate, configurable for
//!   console and file output in text or JSON format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quill_core::config::ConfigLoader;
//! use quill_core::logging::initialize_logging;
//! use quill_core::error::CoreError;
//!
//! fn main() -> Result<(), CoreError> {
//!     let config = ConfigLoader::load(None)?;
//!     initialize_logging(&config.logging, false)?;
//!     tracing::info!(device = ?config.display.device, "Quill core initialized");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use config::{CompositorConfig, ConfigLoader, CoreConfig, DisplayConfig, LoggingConfig};
pub use error::{ConfigError, CoreError, LoggingError};
pub use logging::{init_minimal_logging, initialize_logging};
pub use types::{Point, Rect, Region, Size};
