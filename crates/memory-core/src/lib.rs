//! Project Memory - Headless store for per-project agent memory.
//!
//! The store keeps decisions, notes, problems, constraints, active work and
//! goals keyed by project. This crate owns the maintenance side of that
//! store: upgrading stores written by v1 releases to the current layout and
//! merging project rows that point at the same directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use project_memory::MemoryApi;
//!
//! fn main() -> project_memory::Result<()> {
//!     let api = MemoryApi::open_at("/path/to/memory.db")?;
//!
//!     let report = api.run_startup_gate()?;
//!     if let Some(notice) = report.notice {
//!         println!("{}", notice);
//!     }
//!
//!     let stats = api.duplicate_stats()?;
//!     println!("{} duplicate projects", stats.total_duplicates);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consolidation;
pub mod error;
pub mod gate;
pub mod identity;
pub mod migration;
pub mod records;
pub mod store;

pub use consolidation::{ConsolidationResult, DuplicateConsolidator, DuplicateGroup, DuplicateStats};
pub use error::{MemoryError, Result};
pub use gate::{GateReport, MigrationGate};
pub use identity::{folder_name, PathIdentity};
pub use migration::{MigratedTable, MigrationResult, MigrationState, MigrationStatus, SchemaMigrator};
pub use store::{BackupArtifact, Store};

use std::path::Path;
use tracing::debug;

/// Main entry point for programmatic access to the store.
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Clone)]
pub struct MemoryApi {
    store: Store,
}

impl MemoryApi {
    /// Open the store at the default location (see [`config::default_db_path`]).
    pub fn open() -> Result<Self> {
        let db_path = config::default_db_path()?;
        Self::open_at(db_path)
    }

    pub fn open_at(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Store::open_at(db_path.as_ref())?;
        debug!("MemoryApi ready at {}", db_path.as_ref().display());
        Ok(Self { store })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ========================================
    // Schema migration
    // ========================================

    pub fn migration_status(&self) -> Result<MigrationStatus> {
        SchemaMigrator::new(self.store.clone()).status()
    }

    /// Migrate when the store holds v1 data and nothing else.
    ///
    /// Returns `None` when no migration was needed.
    pub fn migrate_if_needed(&self) -> Result<Option<MigrationResult>> {
        let mut migrator = SchemaMigrator::new(self.store.clone());
        if !migrator.needs_migration()? {
            return Ok(None);
        }
        Ok(Some(migrator.migrate()))
    }

    // ========================================
    // Duplicate projects
    // ========================================

    pub fn duplicate_stats(&self) -> Result<DuplicateStats> {
        DuplicateConsolidator::new(self.store.clone()).stats()
    }

    pub fn preview_consolidation(&self) -> Result<DuplicateStats> {
        DuplicateConsolidator::new(self.store.clone()).preview()
    }

    pub fn consolidate_duplicates(&self) -> ConsolidationResult {
        DuplicateConsolidator::new(self.store.clone()).consolidate()
    }

    // ========================================
    // Startup
    // ========================================

    pub fn run_startup_gate(&self) -> Result<GateReport> {
        MigrationGate::run(&self.store)
    }
}
