use crate::format::PixelFormat;
use std::io;
use thiserror::Error;

/// Errors raised while allocating or mapping pixel buffers.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Invalid buffer geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("Failed to create shared memory: {0}")]
    MemfdCreate(#[source] io::Error),

    #[error("Failed to size shared memory to {size} bytes: {source}")]
    Truncate {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to seal shared memory: {0}")]
    Seal(#[source] io::Error),

    #[error("Failed to map buffer memory: {0}")]
    Map(#[source] io::Error),

    #[error("Mapping of {len} bytes is too small for {required} bytes of pixels")]
    MappingTooSmall { len: usize, required: usize },

    #[error("Buffer I/O error: {0}")]
    Io(#[from] io::Error),
}
