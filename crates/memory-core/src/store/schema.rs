//! Table layouts and schema introspection.
//!
//! The current layout (v2) is created on open. The legacy layout (v1) is never
//! created by this crate; it only exists in stores written by older releases
//! and is read by the schema migrator.

use crate::config::MigrationConfig;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Tables of the current (v2) layout that hold per-project records.
pub const CURRENT_TABLES: [&str; 6] = [
    "decisions",
    "notes",
    "problems",
    "constraints",
    "active_work",
    "goals",
];

/// Tables of the legacy (v1) layout, in migration order. `decisions` is read
/// from [`MigrationConfig::LEGACY_DECISIONS_TABLE`] once renamed.
pub const LEGACY_TABLES: [&str; 7] = [
    "decisions",
    "conversations",
    "learnings",
    "problem_solutions",
    "comparisons",
    "anti_patterns",
    "todos",
];

pub(crate) const CURRENT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT,
    tech_stack TEXT NOT NULL DEFAULT '[]',
    architecture TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_path ON projects(path);

CREATE TABLE IF NOT EXISTS migration_history (
    id TEXT PRIMARY KEY,
    version TEXT NOT NULL UNIQUE,
    completed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS problems (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('open', 'resolved')),
    resolution TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    resolved_at INTEGER
);

CREATE TABLE IF NOT EXISTS constraints (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    reasoning TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS active_work (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    task TEXT NOT NULL,
    context TEXT,
    status TEXT NOT NULL CHECK (status IN ('active', 'paused', 'completed')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    goal TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_project ON notes(project_id);
CREATE INDEX IF NOT EXISTS idx_problems_project ON problems(project_id);
CREATE INDEX IF NOT EXISTS idx_constraints_project ON constraints(project_id);
CREATE INDEX IF NOT EXISTS idx_active_work_project ON active_work(project_id);
CREATE INDEX IF NOT EXISTS idx_goals_project ON goals(project_id);
"#;

/// v2 `decisions`. Kept apart from [`CURRENT_SCHEMA_SQL`] because a v1 store
/// already owns the name until the migrator renames it.
pub(crate) const CURRENT_DECISIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'decision',
    description TEXT NOT NULL,
    reasoning TEXT,
    alternatives TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_project ON decisions(project_id);
"#;

/// The v1 layout as written by pre-2.0 releases. Columns are loosely typed
/// because installs stored timestamps, ids and tags in different forms.
pub const LEGACY_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT,
    tech_stack TEXT NOT NULL DEFAULT '[]',
    architecture TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    decision TEXT,
    reasoning TEXT,
    alternatives TEXT,
    timestamp
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    tool TEXT,
    role TEXT,
    content TEXT,
    timestamp
);

CREATE TABLE IF NOT EXISTS learnings (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    insight TEXT,
    context TEXT,
    confidence REAL,
    timestamp
);

CREATE TABLE IF NOT EXISTS problem_solutions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    problem TEXT,
    solution TEXT,
    tags TEXT,
    timestamp
);

CREATE TABLE IF NOT EXISTS comparisons (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    option_a TEXT,
    option_b TEXT,
    winner TEXT,
    reasoning TEXT,
    timestamp
);

CREATE TABLE IF NOT EXISTS anti_patterns (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    pattern TEXT,
    why TEXT,
    alternative TEXT,
    timestamp
);

CREATE TABLE IF NOT EXISTS todos (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    title TEXT,
    description TEXT,
    status TEXT,
    priority TEXT,
    due_date TEXT,
    tags TEXT,
    created_at
);
"#;

/// Which layout the shared `decisions` table name currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionsLayout {
    Missing,
    Legacy,
    Current,
}

/// A row of `migration_history`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationHistoryEntry {
    pub id: String,
    pub version: String,
    pub completed_at: i64,
}

/// Create the current layout. Safe to run on any store, including v1 stores.
pub(crate) fn ensure_current_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CURRENT_SCHEMA_SQL)?;
    conn.execute_batch(CURRENT_DECISIONS_SQL)?;
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table`, empty when the table does not exist.
///
/// `table` must be one of this module's known table names; it is interpolated.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

/// Row count of `table`, zero when the table does not exist.
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    if !table_exists(conn, table)? {
        return Ok(0);
    }
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

pub fn decisions_layout(conn: &Connection) -> Result<DecisionsLayout> {
    let columns = table_columns(conn, "decisions")?;
    if columns.is_empty() {
        return Ok(DecisionsLayout::Missing);
    }
    let has = |name: &str| columns.iter().any(|c| c == name);
    if has("decision") && !has("description") {
        Ok(DecisionsLayout::Legacy)
    } else {
        Ok(DecisionsLayout::Current)
    }
}

/// Physical table holding legacy rows for a v1 family, if any.
pub fn legacy_source_table(conn: &Connection, family_table: &str) -> Result<Option<String>> {
    if family_table == "decisions" {
        if decisions_layout(conn)? == DecisionsLayout::Legacy {
            return Ok(Some("decisions".to_string()));
        }
        let renamed = MigrationConfig::LEGACY_DECISIONS_TABLE;
        return Ok(table_exists(conn, renamed)?.then(|| renamed.to_string()));
    }
    Ok(table_exists(conn, family_table)?.then(|| family_table.to_string()))
}

/// Row counts of every legacy family, keyed by family table name.
pub fn legacy_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(LEGACY_TABLES.len());
    for family in LEGACY_TABLES {
        let rows = match legacy_source_table(conn, family)? {
            Some(table) => count_rows(conn, &table)?,
            None => 0,
        };
        counts.push((family.to_string(), rows));
    }
    Ok(counts)
}

/// Row counts of every current table. A v1-shaped `decisions` counts as empty.
pub fn current_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let decisions_current = decisions_layout(conn)? == DecisionsLayout::Current;
    let mut counts = Vec::with_capacity(CURRENT_TABLES.len());
    for table in CURRENT_TABLES {
        let rows = if table == "decisions" && !decisions_current {
            0
        } else {
            count_rows(conn, table)?
        };
        counts.push((table.to_string(), rows));
    }
    Ok(counts)
}

/// Every existing table that carries a `project_id` column.
pub fn project_reference_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut candidates: Vec<&str> = CURRENT_TABLES.to_vec();
    candidates.extend(LEGACY_TABLES.iter().filter(|t| **t != "decisions"));
    candidates.push(MigrationConfig::LEGACY_DECISIONS_TABLE);

    let mut tables = Vec::new();
    for table in candidates {
        if table_columns(conn, table)?.iter().any(|c| c == "project_id") {
            tables.push(table.to_string());
        }
    }
    Ok(tables)
}

pub fn history_entries(conn: &Connection) -> Result<Vec<MigrationHistoryEntry>> {
    if !table_exists(conn, "migration_history")? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, version, completed_at FROM migration_history ORDER BY completed_at ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MigrationHistoryEntry {
            id: row.get(0)?,
            version: row.get(1)?,
            completed_at: row.get(2)?,
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn has_history(conn: &Connection, version: &str) -> Result<bool> {
    if !table_exists(conn, "migration_history")? {
        return Ok(false);
    }
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM migration_history WHERE version = ?1",
            params![version],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_schema_on_fresh_store() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_current_schema(&conn).unwrap();

        for table in CURRENT_TABLES {
            assert!(table_exists(&conn, table).unwrap(), "{} missing", table);
        }
        assert_eq!(decisions_layout(&conn).unwrap(), DecisionsLayout::Current);
        assert!(current_counts(&conn).unwrap().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_legacy_decisions_keep_their_shape_after_ensure() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_SCHEMA_SQL).unwrap();
        ensure_current_schema(&conn).unwrap();

        assert_eq!(decisions_layout(&conn).unwrap(), DecisionsLayout::Legacy);
        assert_eq!(
            legacy_source_table(&conn, "decisions").unwrap().as_deref(),
            Some("decisions")
        );
    }

    #[test]
    fn test_count_rows_of_missing_table_is_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(count_rows(&conn, "todos").unwrap(), 0);
        assert!(legacy_source_table(&conn, "todos").unwrap().is_none());
    }

    #[test]
    fn test_project_reference_tables_cover_both_layouts() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_SCHEMA_SQL).unwrap();
        ensure_current_schema(&conn).unwrap();

        let tables = project_reference_tables(&conn).unwrap();
        assert!(tables.contains(&"decisions".to_string()));
        assert!(tables.contains(&"todos".to_string()));
        assert!(tables.contains(&"active_work".to_string()));
        assert!(!tables.contains(&"projects".to_string()));
    }

    #[test]
    fn test_history_lookup() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!has_history(&conn, "2.0.0").unwrap());

        ensure_current_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO migration_history (id, version, completed_at) VALUES ('v1_to_v2', '2.0.0', 1)",
            [],
        )
        .unwrap();

        assert!(has_history(&conn, "2.0.0").unwrap());
        assert_eq!(history_entries(&conn).unwrap().len(), 1);
    }
}
