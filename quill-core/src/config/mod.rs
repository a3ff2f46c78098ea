//! Configuration Management for Quill.
//!
//! - [`types`]: The configuration schema ([`CoreConfig`] and its sections).
//! - [`defaults`]: Default values used when the file is missing or incomplete.
//! - [`loader`]: [`ConfigLoader`], which reads, parses and validates the file.
//!
//! # Examples
//!
//! ```rust,ignore
//! use quill_core::config::ConfigLoader;
//!
//! match ConfigLoader::load(None) {
//!     Ok(config) => println!("Framebuffer: {}", config.display.device.display()),
//!     Err(e) => {
//!         quill_core::logging::init_minimal_logging();
//!         tracing::error!("Configuration error: {}", e);
//!     }
//! }
//! ```

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{CompositorConfig, CoreConfig, DisplayConfig, LoggingConfig};
