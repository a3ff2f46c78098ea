//! # Quill Buffer Manager
//!
//! Pixel storage for the Quill compositor: the [`PixelFormat`]s and [`Color`]s
//! that windows and the framebuffer use, and [`PixelBuffer`]s backed either by
//! sealed shared memory (window surfaces handed to clients) or by anonymous
//! mappings. The [`BufferManager`] allocates buffers and keeps track of the
//! ones still in use.

pub mod buffer;
pub mod error;
pub mod format;

pub use buffer::{AnonymousAllocator, BufferAllocator, BufferId, BufferManager, MemfdAllocator, PixelBuffer};
pub use error::BufferError;
pub use format::{Color, PixelFormat};
