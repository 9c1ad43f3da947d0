//! SQLite-based persistence layer
//!
//! This module provides:
//! - Database initialization and migrations
//! - The persisted permission grant
//! - Application settings
//! - Connection pooling

mod migrations;
mod queries;

pub use migrations::run_migrations;
pub use queries::*;

use crate::error::{Error, Result, StorageError};
use crate::types::AppSettings;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;

/// Settings key holding the serialized [`AppSettings`]
pub const APP_SETTINGS_KEY: &str = "app_settings";

/// Storage manager for database operations
pub struct Storage {
    pool: DbPool,
    db_path: PathBuf,
}

impl Storage {
    /// Create a new storage instance with a directory path
    pub fn new_with_path(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        std::fs::create_dir_all(data_dir).map_err(|e| {
            Error::Storage(StorageError::Database(format!(
                "Failed to create data directory: {}",
                e
            )))
        })?;

        let db_path = data_dir.join("whatsbuddy.db");
        info!("Database path: {:?}", db_path);

        Self::from_path(db_path)
    }

    /// Create storage from a specific path
    pub fn from_path(db_path: PathBuf) -> Result<Self> {
        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self { pool, db_path };
        storage.initialize()?;

        Ok(storage)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };

        storage.initialize()?;

        Ok(storage)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.pool.get()?;
        run_migrations(&conn)?;
        info!("Database initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Load application settings, falling back to defaults
    pub fn load_settings(&self) -> AppSettings {
        let conn = match self.connection() {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to get storage connection: {}", e);
                return AppSettings::default();
            }
        };

        let raw = match get_setting(&conn, APP_SETTINGS_KEY) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to read app settings: {}", e);
                return AppSettings::default();
            }
        };

        raw.and_then(|v| match serde_json::from_str::<AppSettings>(&v) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("Ignoring unreadable app settings: {}", e);
                None
            }
        })
        .unwrap_or_default()
    }

    /// Persist application settings
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let conn = self.connection()?;
        let value = serde_json::to_string(settings)?;
        set_setting(&conn, APP_SETTINGS_KEY, &value)?;
        info!("Saved app settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessMode;

    #[test]
    fn test_in_memory_storage() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.connection().is_ok());
    }

    #[test]
    fn test_settings_default_when_missing() {
        let storage = Storage::in_memory().unwrap();
        assert_eq!(storage.load_settings(), AppSettings::default());
    }

    #[test]
    fn test_settings_round_trip() {
        let storage = Storage::in_memory().unwrap();
        let settings = AppSettings {
            name_prefix: "saved_".into(),
            access_mode: AccessMode::ReadWrite,
            ..AppSettings::default()
        };

        storage.save_settings(&settings).unwrap();
        assert_eq!(storage.load_settings(), settings);
    }

    #[test]
    fn test_unreadable_settings_fall_back() {
        let storage = Storage::in_memory().unwrap();
        let conn = storage.connection().unwrap();
        set_setting(&conn, APP_SETTINGS_KEY, "not json").unwrap();
        drop(conn);

        assert_eq!(storage.load_settings(), AppSettings::default());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::new_with_path(dir.path()).unwrap();
            let conn = storage.connection().unwrap();
            set_setting(&conn, "k", "v").unwrap();
        }

        let storage = Storage::new_with_path(dir.path()).unwrap();
        let conn = storage.connection().unwrap();
        assert_eq!(get_setting(&conn, "k").unwrap(), Some("v".to_string()));
    }
}
