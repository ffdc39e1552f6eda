//! v1 to v2 schema migration.
//!
//! A migration runs in three phases:
//! 1. Verified file backup of the store (abort before any write on failure)
//! 2. One transaction that moves the v1 `decisions` table aside, creates the
//!    v2 `decisions` table, and rewrites every legacy family into its
//!    destination table
//! 3. Completion marker in `migration_history`, written after commit
//!
//! Failures in phase 2 roll back every write; the backup stays on disk.

use crate::config::MigrationConfig;
use crate::error::{MemoryError, Result};
use crate::records::{read_family, CurrentFamily, LegacyFamily};
use crate::store::schema::{self, DecisionsLayout, MigrationHistoryEntry};
use crate::store::Store;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    NotNeeded,
    NeedsMigration,
    InProgress,
    Completed,
    Failed,
}

/// Rows rewritten from one legacy family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigratedTable {
    pub table: String,
    pub destination: CurrentFamily,
    pub records: u64,
}

/// Outcome of [`SchemaMigrator::migrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    pub migrated_tables: Vec<MigratedTable>,
    pub records_copied: u64,
    pub errors: Vec<String>,
    pub backup_path: Option<PathBuf>,
}

impl MigrationResult {
    fn failed(error: String, backup_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            migrated_tables: Vec::new(),
            records_copied: 0,
            errors: vec![error],
            backup_path,
        }
    }
}

/// Read-only migration report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub state: MigrationState,
    /// Latest version recorded in `migration_history`, if any.
    pub current_version: Option<String>,
    pub target_version: String,
    pub history: Vec<MigrationHistoryEntry>,
    pub legacy_counts: BTreeMap<String, i64>,
    pub current_counts: BTreeMap<String, i64>,
}

/// Upgrades a store from the v1 layout to the current one.
pub struct SchemaMigrator {
    store: Store,
    state: MigrationState,
}

impl SchemaMigrator {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            state: MigrationState::NotNeeded,
        }
    }

    /// Last state observed or reached by this migrator.
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Re-evaluate the state from the store.
    pub fn detect(&mut self) -> Result<MigrationState> {
        self.state = self.store.read(detect_state)?;
        debug!("Schema migration state: {:?}", self.state);
        Ok(self.state)
    }

    /// True when no completion marker exists, some legacy table holds rows,
    /// and every current table is empty.
    pub fn needs_migration(&self) -> Result<bool> {
        self.store.read(needs_migration)
    }

    /// Back up the store and rewrite all legacy rows in one transaction.
    ///
    /// Never returns `Err`; failures are reported in the result.
    pub fn migrate(&mut self) -> MigrationResult {
        let version = MigrationConfig::CURRENT_SCHEMA_VERSION;

        match self
            .store
            .read(|conn| schema::has_history(conn, version))
        {
            Ok(true) => {
                info!("Schema already at version {}, nothing to migrate", version);
                self.state = MigrationState::Completed;
                return MigrationResult {
                    success: true,
                    migrated_tables: Vec::new(),
                    records_copied: 0,
                    errors: Vec::new(),
                    backup_path: None,
                };
            }
            Ok(false) => {}
            Err(e) => {
                error!("Could not read migration history: {}", e);
                self.state = MigrationState::Failed;
                return MigrationResult::failed(e.to_string(), None);
            }
        }

        self.state = MigrationState::InProgress;
        info!("Starting schema migration to {}", version);

        let backup = match self.store.backup_file() {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Aborting migration, backup failed: {}", e);
                self.state = MigrationState::Failed;
                return MigrationResult::failed(e.to_string(), None);
            }
        };
        let backup_path = Some(backup.path.clone());

        let now_ms = Utc::now().timestamp_millis();
        let migrated_tables = match self.store.transaction(|tx| {
            // Another caller may have migrated since the check above, or a
            // committed run may have lost its history row.
            if !needs_migration(tx)? {
                return Ok(None);
            }
            migrate_families(tx, now_ms).map(Some)
        }) {
            Ok(Some(tables)) => tables,
            Ok(None) => {
                info!("Nothing left to migrate, leaving the store unchanged");
                self.state = MigrationState::Completed;
                return MigrationResult {
                    success: true,
                    migrated_tables: Vec::new(),
                    records_copied: 0,
                    errors: Vec::new(),
                    backup_path,
                };
            }
            Err(e) => {
                error!("Schema migration rolled back: {}", e);
                self.state = MigrationState::Failed;
                return MigrationResult::failed(e.to_string(), backup_path);
            }
        };

        let records_copied: u64 = migrated_tables.iter().map(|t| t.records).sum();
        let mut errors = Vec::new();
        if let Err(e) = self.store.execute(
            "INSERT OR IGNORE INTO migration_history (id, version, completed_at) VALUES (?1, ?2, ?3)",
            params![
                MigrationConfig::HISTORY_SENTINEL_ID,
                version,
                Utc::now().timestamp_millis()
            ],
        ) {
            warn!("Migration committed but history row was not written: {}", e);
            errors.push(format!("Failed to record migration history: {}", e));
        }

        info!(
            "Schema migration complete: {} records copied, backup at {}",
            records_copied,
            backup.path.display()
        );
        self.state = MigrationState::Completed;

        MigrationResult {
            success: true,
            migrated_tables,
            records_copied,
            errors,
            backup_path,
        }
    }

    pub fn status(&self) -> Result<MigrationStatus> {
        self.store.read(|conn| {
            let history = schema::history_entries(conn)?;
            Ok(MigrationStatus {
                state: detect_state(conn)?,
                current_version: history.last().map(|h| h.version.clone()),
                target_version: MigrationConfig::CURRENT_SCHEMA_VERSION.to_string(),
                history,
                legacy_counts: schema::legacy_counts(conn)?.into_iter().collect(),
                current_counts: schema::current_counts(conn)?.into_iter().collect(),
            })
        })
    }
}

fn detect_state(conn: &Connection) -> Result<MigrationState> {
    if schema::has_history(conn, MigrationConfig::CURRENT_SCHEMA_VERSION)? {
        return Ok(MigrationState::Completed);
    }
    if needs_migration(conn)? {
        Ok(MigrationState::NeedsMigration)
    } else {
        Ok(MigrationState::NotNeeded)
    }
}

fn needs_migration(conn: &Connection) -> Result<bool> {
    if schema::has_history(conn, MigrationConfig::CURRENT_SCHEMA_VERSION)? {
        return Ok(false);
    }
    let has_legacy_rows = schema::legacy_counts(conn)?.iter().any(|(_, n)| *n > 0);
    let current_empty = schema::current_counts(conn)?.iter().all(|(_, n)| *n == 0);
    Ok(has_legacy_rows && current_empty)
}

/// Give the `decisions` name to the v2 table, keeping v1 rows under
/// `legacy_decisions`.
fn move_legacy_decisions(conn: &Connection) -> Result<()> {
    if schema::decisions_layout(conn)? != DecisionsLayout::Legacy {
        return Ok(());
    }
    let renamed = MigrationConfig::LEGACY_DECISIONS_TABLE;
    if schema::table_exists(conn, renamed)? {
        return Err(MemoryError::Other(format!(
            "Both a v1 decisions table and {} exist; refusing to migrate",
            renamed
        )));
    }

    // The index follows the table on rename and would shadow the v2 one.
    conn.execute_batch(&format!(
        "ALTER TABLE decisions RENAME TO {};\n\
         DROP INDEX IF EXISTS idx_decisions_project;",
        renamed
    ))?;
    conn.execute_batch(schema::CURRENT_DECISIONS_SQL)?;
    debug!("Renamed v1 decisions table to {}", renamed);
    Ok(())
}

fn migrate_families(conn: &Connection, now_ms: i64) -> Result<Vec<MigratedTable>> {
    move_legacy_decisions(conn)?;

    let mut migrated = Vec::with_capacity(LegacyFamily::MIGRATION_ORDER.len());
    for family in LegacyFamily::MIGRATION_ORDER {
        let records = match schema::legacy_source_table(conn, family.table())? {
            Some(source) => {
                let rows = read_family(conn, family, &source)?;
                let count = rows.len() as u64;
                for row in rows {
                    row.into_current(now_ms)?.insert(conn)?;
                }
                count
            }
            None => 0,
        };

        info!(
            "Migrated {} {} rows into {}",
            records,
            family,
            family.destination()
        );
        migrated.push(MigratedTable {
            table: family.table().to_string(),
            destination: family.destination(),
            records,
        });
    }
    Ok(migrated)
}
