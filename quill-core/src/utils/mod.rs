//! Small helpers shared across Quill crates.

pub mod fs;
