//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Handles ~/.codeviz/ and the files inside it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the CodeViz directory (~/.codeviz/)
pub fn codeviz_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".codeviz"))
}

/// Get the config file path (~/.codeviz/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(codeviz_dir()?.join("config.json"))
}

/// Get the database file path (~/.codeviz/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(codeviz_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codeviz_dir() {
        let dir = codeviz_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.to_string_lossy().contains(".codeviz"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path();
        assert!(path.is_ok());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn test_database_path() {
        let path = database_path();
        assert!(path.is_ok());
        assert!(path.unwrap().to_string_lossy().contains("data.db"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
