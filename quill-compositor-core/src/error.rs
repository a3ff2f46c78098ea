use std::io;
use std::path::PathBuf;

use quill_buffer_manager::BufferError;
use quill_core::error::CoreError;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors surfaced by the compositor crate.
///
/// Most runtime failures are logged and absorbed where they happen (a failed
/// update becomes "no hardware marker", a failed buffer leaves the window
/// bufferless). Only startup failures propagate to the caller as errors.
#[derive(Debug, Error)]
pub enum CompositorError {
    /// The framebuffer device could not be opened or mapped. Fatal at startup.
    #[error("Framebuffer device {path:?} is unavailable: {source}")]
    FramebufferUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Display driver error: {0}")]
    Driver(String),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Event channel I/O error: {0}")]
    Io(#[from] io::Error),
}
