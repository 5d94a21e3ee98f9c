//! JSON Configuration Management
//!
//! Reads and writes ~/.codeviz/config.json. A missing file yields defaults
//! and is written back on first load.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, database_path, ensure_dir};

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load the user's configuration from the default location
    pub fn new() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Load configuration from `path`, creating it with defaults if absent
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = AppConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            tracing::info!("[Config] Wrote defaults to {}", config_path.display());
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))?;
        config.validate().map_err(AppError::config)?;
        Ok(config)
    }

    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::config)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Database file in effect: the configured override or ~/.codeviz/data.db
    pub fn database_path(&self) -> AppResult<PathBuf> {
        match &self.config.database_path {
            Some(path) => Ok(path.clone()),
            None => database_path(),
        }
    }

    /// Apply a partial update and persist it. An update that fails
    /// validation leaves both memory and disk untouched.
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut next = self.config.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = AppConfig::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cfg").join("config.json");

        let service = ConfigService::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(service.get_config(), &AppConfig::default());
    }

    #[test]
    fn test_config_update_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();

        let update = SettingsUpdate {
            default_extension: Some("ts".to_string()),
            ..Default::default()
        };
        let updated = service.update_config(update).unwrap();
        assert_eq!(updated.sync.default_extension, "ts");

        let reloaded = ConfigService::open(&path).unwrap();
        assert_eq!(reloaded.get_config().sync.default_extension, "ts");
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();

        let update = SettingsUpdate {
            max_file_bytes: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            service.update_config(update),
            Err(AppError::Config(_))
        ));
        assert_eq!(
            service.get_config().sync.max_file_bytes,
            AppConfig::default().sync.max_file_bytes
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ConfigService::open(&path),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_database_path_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();
        service
            .update_config(SettingsUpdate {
                database_path: Some(temp_dir.path().join("viz.db")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            service.database_path().unwrap(),
            temp_dir.path().join("viz.db")
        );
    }
}
