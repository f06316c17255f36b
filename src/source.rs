//! Source file loading.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Read a source file's raw bytes.
///
/// # Errors
///
/// [`IndexError::FileNotFound`] when the path does not exist, and
/// [`IndexError::Io`] for any other read failure (permissions, directory).
pub fn load_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => IndexError::FileNotFound(path.to_path_buf()),
        _ => IndexError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}
