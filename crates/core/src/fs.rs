//! Filesystem utilities

use std::fs;
use std::path::Path;

use log::info;

/// Create a directory and all parent directories if they don't exist
///
/// This is a wrapper around `std::fs::create_dir_all` with logging.
pub fn create_dir_all(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Make sure the directory that will hold `file` exists.
pub fn ensure_parent_dir(file: impl AsRef<Path>) -> std::io::Result<()> {
    match file.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Check if a path exists
pub fn path_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_exists() {
        // Current directory should exist
        assert!(path_exists("."));

        // Random path should not exist
        assert!(!path_exists("/nonexistent/path/12345"));
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("raw").join("diario").join("out.parquet");

        ensure_parent_dir(&file).unwrap();

        assert!(tmp.path().join("raw").join("diario").is_dir());
        assert!(!file.exists());
    }

    #[test]
    fn test_ensure_parent_dir_accepts_bare_file_name() {
        assert!(ensure_parent_dir("watermark.txt").is_ok());
    }
}
