//! Centralized configuration for the project memory store.
//!
//! Constants for the SQLite connection, the schema upgrade, and default
//! on-disk locations.

use crate::error::{MemoryError, Result};
use std::path::PathBuf;

/// SQLite connection settings.
pub struct StoreConfig;

impl StoreConfig {
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
    pub const DB_FILE_NAME: &'static str = "memory.db";
    /// Environment variable that overrides the default store location.
    pub const DB_PATH_ENV: &'static str = "PROJECT_MEMORY_DB";
}

/// Schema upgrade settings.
pub struct MigrationConfig;

impl MigrationConfig {
    /// Version string recorded in `migration_history` once v1 data is upgraded.
    pub const CURRENT_SCHEMA_VERSION: &'static str = "2.0.0";
    /// Fixed id of the v1 to v2 completion marker row.
    pub const HISTORY_SENTINEL_ID: &'static str = "v1_to_v2";
    /// Marker inserted into backup file names.
    pub const BACKUP_MARKER: &'static str = "v1-backup";
    /// Table the v1 `decisions` table is renamed to before v2 takes its name.
    pub const LEGACY_DECISIONS_TABLE: &'static str = "legacy_decisions";
    /// Maximum length of a constraint key derived from an anti-pattern.
    pub const CONSTRAINT_KEY_MAX_LEN: usize = 50;
}

/// Shared directory and path configuration.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATA_DIR_NAME: &'static str = "project-memory";
}

/// Resolve the default store path: `$PROJECT_MEMORY_DB`, else
/// `<data dir>/project-memory/memory.db`.
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(StoreConfig::DB_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let data_dir = dirs::data_dir().ok_or_else(|| MemoryError::Config {
        message: "Could not determine data directory".to_string(),
    })?;
    Ok(data_dir
        .join(PathsConfig::DATA_DIR_NAME)
        .join(StoreConfig::DB_FILE_NAME))
}
