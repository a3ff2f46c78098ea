//! Filesystem Utilities.
//!
//! Helpers that map `std::io::Error` into [`CoreError::Filesystem`] with the
//! offending path attached.

use crate::error::CoreError;
use std::fs;
use std::path::Path;

/// Ensures that a directory exists at the given path, creating it and any
/// missing parents.
///
/// Fails if the path exists but is not a directory.
///
/// # Examples
///
/// ```no_run
/// # use quill_core::utils::fs::ensure_dir_exists;
/// let temp_dir = tempfile::tempdir().unwrap();
/// let dir_path = temp_dir.path().join("logs");
/// ensure_dir_exists(&dir_path).unwrap();
/// assert!(dir_path.is_dir());
/// ```
pub fn ensure_dir_exists(path: &Path) -> Result<(), CoreError> {
    if path.exists() {
        if !path.is_dir() {
            Err(CoreError::Filesystem {
                message: "Path exists but is not a directory".to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "Path exists but is not a directory",
                ),
            })
        } else {
            Ok(())
        }
    } else {
        fs::create_dir_all(path).map_err(|e| CoreError::Filesystem {
            message: "Failed to create directory".to_string(),
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_exists_creates_nested() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op.
        ensure_dir_exists(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("occupied");
        fs::write(&file_path, b"x").unwrap();

        match ensure_dir_exists(&file_path) {
            Err(CoreError::Filesystem { path, .. }) => assert_eq!(path, file_path),
            other => panic!("Expected Filesystem error, got {:?}", other),
        }
    }
}
