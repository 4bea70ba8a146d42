//! Cross-Platform Path Utilities
//!
//! Functions for resolving the client's directories (`~/.seo-pipeline/`).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the client directory (~/.seo-pipeline/)
pub fn app_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".seo-pipeline"))
}

/// Get the config file path (~/.seo-pipeline/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Get the durable client storage path (~/.seo-pipeline/storage.json)
pub fn storage_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("storage.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure the parent directory of a file exists
pub fn ensure_parent_dir(file: &Path) -> AppResult<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
