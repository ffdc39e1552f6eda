//! Startup checks run once before the store serves requests.

use crate::consolidation::{DuplicateConsolidator, DuplicateStats};
use crate::error::Result;
use crate::migration::{MigrationResult, MigrationState, SchemaMigrator};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What the startup gate found and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    /// Migrator state after the gate ran.
    pub schema_state: MigrationState,
    pub migration: Option<MigrationResult>,
    pub duplicates: Option<DuplicateStats>,
    /// Operator-facing notice when duplicate projects exist.
    pub notice: Option<String>,
}

pub struct MigrationGate;

impl MigrationGate {
    /// Migrate the schema if needed, then report duplicate projects.
    ///
    /// Only a failure to read the schema state is an error. A failed
    /// migration is reported in the returned report; duplicates are never
    /// merged here.
    pub fn run(store: &Store) -> Result<GateReport> {
        let mut migrator = SchemaMigrator::new(store.clone());

        let migration = match migrator.detect()? {
            MigrationState::NeedsMigration => {
                info!("Legacy data found, migrating schema before startup");
                let result = migrator.migrate();
                if !result.success {
                    warn!("Startup migration failed: {}", result.errors.join("; "));
                }
                Some(result)
            }
            _ => None,
        };

        let duplicates = match DuplicateConsolidator::new(store.clone()).stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Could not read duplicate project stats: {}", e);
                None
            }
        };

        let notice = duplicates
            .as_ref()
            .filter(|stats| stats.total_duplicates > 0)
            .map(|stats| {
                format!(
                    "Found {} duplicate project records in {} groups; run consolidate_duplicates to merge them",
                    stats.total_duplicates, stats.duplicate_groups
                )
            });
        if let Some(notice) = &notice {
            warn!("{}", notice);
        }

        Ok(GateReport {
            schema_state: migrator.state(),
            migration,
            duplicates,
            notice,
        })
    }
}
