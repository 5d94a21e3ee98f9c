//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application configuration stored in config.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Overrides ~/.codeviz/data.db when set
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub limits: LimitSettings,
}

/// Git synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Extension for exported nodes without a language tag
    pub default_extension: String,
    /// Files larger than this are skipped on import
    pub max_file_bytes: u64,
    /// Executable invoked by installed git hooks
    pub hook_command: String,
    /// Run `sync_to_git` from the pre-commit hook
    pub sync_on_pre_commit: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_extension: "js".to_string(),
            max_file_bytes: 2 * 1024 * 1024,
            hook_command: "codeviz".to_string(),
            sync_on_pre_commit: false,
        }
    }
}

/// Time and size bounds for long operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Repository scan deadline; 0 disables it
    pub scan_timeout_ms: u64,
    /// Snapshot capture/restore deadline; 0 disables it
    pub snapshot_timeout_ms: u64,
    /// Default page size for change-log queries
    pub change_log_page: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 30_000,
            snapshot_timeout_ms: 30_000,
            change_log_page: 100,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub database_path: Option<PathBuf>,
    pub default_extension: Option<String>,
    pub max_file_bytes: Option<u64>,
    pub hook_command: Option<String>,
    pub sync_on_pre_commit: Option<bool>,
    pub scan_timeout_ms: Option<u64>,
    pub snapshot_timeout_ms: Option<u64>,
    pub change_log_page: Option<u32>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(path) = update.database_path {
            self.database_path = Some(path);
        }
        if let Some(ext) = update.default_extension {
            self.sync.default_extension = ext;
        }
        if let Some(max) = update.max_file_bytes {
            self.sync.max_file_bytes = max;
        }
        if let Some(command) = update.hook_command {
            self.sync.hook_command = command;
        }
        if let Some(enabled) = update.sync_on_pre_commit {
            self.sync.sync_on_pre_commit = enabled;
        }
        if let Some(ms) = update.scan_timeout_ms {
            self.limits.scan_timeout_ms = ms;
        }
        if let Some(ms) = update.snapshot_timeout_ms {
            self.limits.snapshot_timeout_ms = ms;
        }
        if let Some(page) = update.change_log_page {
            self.limits.change_log_page = page;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let ext = &self.sync.default_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "Invalid default_extension: {:?}. Must be non-empty and alphanumeric",
                ext
            ));
        }

        if self.sync.max_file_bytes == 0 {
            return Err("max_file_bytes must be greater than 0".to_string());
        }

        if self.sync.hook_command.trim().is_empty() {
            return Err("hook_command cannot be empty".to_string());
        }

        if self.limits.change_log_page == 0 || self.limits.change_log_page > 10_000 {
            return Err("change_log_page must be between 1 and 10000".to_string());
        }

        Ok(())
    }
}
