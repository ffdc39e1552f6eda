//! SQLite-backed project memory store.
//!
//! The store owns a single connection; every call locks it for its whole
//! duration, so migrations and consolidations never interleave with other
//! access.

mod backup;
pub mod schema;

pub use backup::{backup_path_for, sha256_file, BackupArtifact};
pub use schema::{DecisionsLayout, MigrationHistoryEntry};

use crate::config::StoreConfig;
use crate::error::{MemoryError, Result};
use rusqlite::{Connection, Params, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Handle to the embedded store.
#[derive(Clone)]
pub struct Store {
    /// `None` for in-memory stores, which cannot be backed up.
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open the store at a specific path.
    ///
    /// Creates the database, parent directories, and current tables if they
    /// don't exist. Legacy tables are left untouched.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MemoryError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| MemoryError::Database {
            message: format!("Failed to open store at {}: {}", db_path.display(), e),
            source: Some(e),
        })?;
        Self::configure_connection(&conn)?;
        schema::ensure_current_schema(&conn)?;

        debug!("Opened project memory store at {}", db_path.display());

        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::ensure_current_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MemoryError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    /// Execute a parameterized statement, returning the number of rows changed.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let conn = self.lock_conn()?;
        Ok(conn.execute(sql, params)?)
    }

    /// Run a parameterized query and map every row.
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Run read-only work against the connection under a single lock.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err`. A panic
    /// inside `f` drops the transaction, which also rolls back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed after error '{}': {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Take a verified, byte-identical backup of the store file.
    pub fn backup_file(&self) -> Result<BackupArtifact> {
        let db_path = self.db_path.as_deref().ok_or_else(|| MemoryError::Backup {
            message: "In-memory stores cannot be backed up".to_string(),
            path: None,
            source: None,
        })?;
        let conn = self.lock_conn()?;
        backup::create_backup(&conn, db_path)
    }
}
