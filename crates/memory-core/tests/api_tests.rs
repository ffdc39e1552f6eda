//! Integration tests for the MemoryApi public interface.
//!
//! Stores are seeded in the v1 layout through a raw connection, the way a
//! pre-2.0 release would have left them, then opened through the API.

use project_memory::store::schema::{self, LEGACY_SCHEMA_SQL};
use project_memory::{MemoryApi, MigrationState, SchemaMigrator};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a v1 store with the given rows and return its path.
fn create_legacy_store(temp_dir: &TempDir, rows: &str) -> PathBuf {
    let db_path = temp_dir.path().join("memory.db");
    let conn = Connection::open(&db_path).expect("Failed to create legacy store");
    conn.execute_batch(LEGACY_SCHEMA_SQL).unwrap();
    conn.execute_batch(rows).unwrap();
    db_path
}

fn count(api: &MemoryApi, table: &str) -> i64 {
    api.store()
        .read(|conn| schema::count_rows(conn, table))
        .unwrap()
}

fn backups_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains(".v1-backup-"))
        .collect()
}

const FULL_V1_STORE: &str = r#"
    INSERT INTO projects VALUES ('p1', 'alpha', '/home/me/alpha', '["rust"]', NULL, 0, 10);
    INSERT INTO projects VALUES ('p2', 'Alpha', '/HOME/me/alpha/', '["sqlite"]', 'layered', 0, 5);
    INSERT INTO decisions VALUES ('d1', 'p1', 'Use WAL', 'concurrency', '["rollback journal"]', 1700000000);
    INSERT INTO decisions VALUES ('d2', 'p2', 'Single binary', NULL, NULL, '2024-02-01T10:00:00Z');
    INSERT INTO conversations VALUES ('c1', 'p1', 'cli', 'user', 'How do we ship?', 1700000100);
    INSERT INTO learnings VALUES ('l1', 'p2', 'Batch writes', 'import job', 4, 1700000200);
    INSERT INTO problem_solutions VALUES ('ps1', 'p1', 'Locked db', 'busy_timeout', 'sqlite, locking', 1700000300);
    INSERT INTO comparisons VALUES ('cmp1', 'p1', 'axum', 'actix', 'axum', 'tower ecosystem', 1700000400);
    INSERT INTO anti_patterns VALUES ('ap1', 'p2', 'Blocking in async', 'stalls runtime', 'spawn_blocking', 1700000500);
    INSERT INTO todos VALUES ('t1', 'p1', 'Write docs', NULL, 'done', 'high', NULL, NULL, 1700000600);
    INSERT INTO todos VALUES ('t2', 'p1', 'Fix CI', 'flaky test', 'blocked', NULL, '2024-03-01', '["ci"]', 1700000700);
    INSERT INTO todos VALUES ('t3', 'p2', 'Release', NULL, 'pending', NULL, NULL, NULL, 'not a date');
"#;

#[test]
fn test_migration_conserves_every_row() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();

    let before = api.migration_status().unwrap();
    let legacy_total: i64 = before.legacy_counts.values().sum();
    assert_eq!(legacy_total, 10);

    let result = api.migrate_if_needed().unwrap().expect("migration should run");

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.records_copied, 10);
    let current_total: i64 = api.migration_status().unwrap().current_counts.values().sum();
    assert_eq!(current_total, 10);

    assert_eq!(count(&api, "decisions"), 3);
    assert_eq!(count(&api, "notes"), 2);
    assert_eq!(count(&api, "problems"), 1);
    assert_eq!(count(&api, "constraints"), 1);
    assert_eq!(count(&api, "active_work"), 3);
}

#[test]
fn test_migration_runs_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();

    assert!(api.migrate_if_needed().unwrap().unwrap().success);
    assert!(api.migrate_if_needed().unwrap().is_none());
    drop(api);

    let reopened = MemoryApi::open_at(&db_path).unwrap();
    assert!(reopened.migrate_if_needed().unwrap().is_none());

    let status = reopened.migration_status().unwrap();
    assert_eq!(status.state, MigrationState::Completed);
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.history[0].id, "v1_to_v2");
    assert_eq!(status.current_version.as_deref(), Some("2.0.0"));
    assert_eq!(count(&reopened, "notes"), 2);
    assert_eq!(backups_in(temp_dir.path()).len(), 1);
}

#[test]
fn test_todo_statuses_map_to_active_work() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();

    api.migrate_if_needed().unwrap();

    let rows: Vec<(String, String, Option<String>)> = api
        .store()
        .query_rows(
            "SELECT task, status, context FROM active_work ORDER BY task",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();

    assert_eq!(
        rows,
        vec![
            (
                "Fix CI".to_string(),
                "paused".to_string(),
                Some("flaky test\nDue: 2024-03-01\nTags: ci".to_string())
            ),
            ("Release".to_string(), "active".to_string(), None),
            (
                "Write docs".to_string(),
                "completed".to_string(),
                Some("Priority: high".to_string())
            ),
        ]
    );
}

#[test]
fn test_failed_migration_leaves_store_and_backup() {
    let temp_dir = TempDir::new().unwrap();
    let rows = format!(
        "{}\nINSERT INTO conversations VALUES ('bad', 'p1', 'cli', 'user', '', 1);",
        FULL_V1_STORE
    );
    let db_path = create_legacy_store(&temp_dir, &rows);
    let api = MemoryApi::open_at(&db_path).unwrap();

    let result = api.migrate_if_needed().unwrap().unwrap();

    assert!(!result.success);
    assert_eq!(result.records_copied, 0);
    assert!(result.errors.iter().any(|e| e.contains("conversations")));

    let status = api.migration_status().unwrap();
    assert_eq!(status.state, MigrationState::NeedsMigration);
    assert!(status.current_counts.values().all(|n| *n == 0));
    assert_eq!(status.legacy_counts["decisions"], 2);

    // The backup is a complete v1 store.
    let backup = result.backup_path.unwrap();
    let conn = Connection::open(&backup).unwrap();
    assert_eq!(schema::count_rows(&conn, "todos").unwrap(), 3);
    assert_eq!(schema::count_rows(&conn, "conversations").unwrap(), 2);
}

#[test]
fn test_consolidation_after_migration_keeps_every_dependent_row() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();
    api.migrate_if_needed().unwrap();

    let before: i64 = api
        .migration_status()
        .unwrap()
        .current_counts
        .values()
        .sum();

    let preview = api.preview_consolidation().unwrap();
    assert_eq!(preview.total_duplicates, 1);
    assert_eq!(count(&api, "projects"), 2);

    let result = api.consolidate_duplicates();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(count(&api, "projects"), 1);

    let after: i64 = api
        .migration_status()
        .unwrap()
        .current_counts
        .values()
        .sum();
    assert_eq!(before, after);

    let orphans: Vec<String> = api
        .store()
        .query_rows(
            "SELECT project_id FROM notes WHERE project_id != 'p1'
             UNION ALL SELECT project_id FROM decisions WHERE project_id != 'p1'
             UNION ALL SELECT project_id FROM active_work WHERE project_id != 'p1'
             UNION ALL SELECT project_id FROM constraints WHERE project_id != 'p1'
             UNION ALL SELECT project_id FROM legacy_decisions WHERE project_id != 'p1'
             UNION ALL SELECT project_id FROM todos WHERE project_id != 'p1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(orphans.is_empty(), "{:?}", orphans);

    let (tech_stack, architecture): (String, Option<String>) = api
        .store()
        .read(|conn| {
            Ok(conn.query_row(
                "SELECT tech_stack, architecture FROM projects WHERE id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!(tech_stack, r#"["rust","sqlite"]"#);
    assert_eq!(architecture.as_deref(), Some("layered"));

    assert_eq!(api.duplicate_stats().unwrap().total_duplicates, 0);
    assert_eq!(api.consolidate_duplicates().duplicates_removed, 0);
}

#[test]
fn test_startup_gate_reports_without_merging() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();

    let report = api.run_startup_gate().unwrap();

    assert_eq!(report.schema_state, MigrationState::Completed);
    assert_eq!(report.migration.unwrap().records_copied, 10);
    assert!(report.notice.is_some());
    assert_eq!(count(&api, "projects"), 2);

    let second = api.run_startup_gate().unwrap();
    assert!(second.migration.is_none());
    assert_eq!(second.schema_state, MigrationState::Completed);
}

#[test]
fn test_concurrent_migrations_copy_rows_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_legacy_store(&temp_dir, FULL_V1_STORE);
    let api = MemoryApi::open_at(&db_path).unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = api.store().clone();
            std::thread::spawn(move || SchemaMigrator::new(store).migrate())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.iter().all(|r| r.success), "{:?}", results);
    let copied: u64 = results.iter().map(|r| r.records_copied).sum();
    assert_eq!(copied, 10);

    let current_total: i64 = api.migration_status().unwrap().current_counts.values().sum();
    assert_eq!(current_total, 10);
    assert_eq!(count(&api, "notes"), 2);
}
