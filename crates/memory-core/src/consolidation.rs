//! Merging of project rows that point at the same directory.
//!
//! Paths recorded by different tools differ in case, separator style and
//! trailing separators. Rows whose paths share a [`PathIdentity`] are merged
//! into one canonical project; every dependent row is re-pointed to it.

use crate::error::Result;
use crate::identity::{folder_name, PathIdentity};
use crate::records::{parse_list, parse_timestamp};
use crate::store::schema;
use crate::store::Store;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info};

/// One set of projects sharing a path identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub path_key: String,
    pub count: usize,
    pub project_ids: Vec<String>,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStats {
    pub total_projects: i64,
    pub duplicate_groups: usize,
    /// Rows a consolidation would remove.
    pub total_duplicates: usize,
    pub duplicate_details: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationResult {
    pub success: bool,
    pub duplicates_found: usize,
    pub duplicates_removed: usize,
    pub projects_merged: usize,
    pub errors: Vec<String>,
    /// One audit line per removed project.
    pub details: Vec<String>,
}

#[derive(Debug, Clone)]
struct ProjectRow {
    id: String,
    name: String,
    path: String,
    tech_stack: Option<String>,
    architecture: Option<String>,
    updated_at: i64,
}

/// Finds and merges duplicate project rows.
pub struct DuplicateConsolidator {
    store: Store,
}

impl DuplicateConsolidator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Read-only duplicate report.
    pub fn stats(&self) -> Result<DuplicateStats> {
        self.store.read(|conn| {
            let total_projects = schema::count_rows(conn, "projects")?;
            let groups = duplicate_groups(load_projects(conn)?);

            let duplicate_details: Vec<DuplicateGroup> = groups
                .iter()
                .map(|(key, members)| DuplicateGroup {
                    path_key: key.to_string(),
                    count: members.len(),
                    project_ids: members.iter().map(|p| p.id.clone()).collect(),
                    names: members.iter().map(|p| p.name.clone()).collect(),
                })
                .collect();

            Ok(DuplicateStats {
                total_projects,
                duplicate_groups: duplicate_details.len(),
                total_duplicates: duplicate_details.iter().map(|g| g.count - 1).sum(),
                duplicate_details,
            })
        })
    }

    /// What a consolidation would merge, without writing.
    pub fn preview(&self) -> Result<DuplicateStats> {
        self.stats()
    }

    /// Merge every duplicate group in one transaction.
    ///
    /// Never returns `Err`; failures roll back and are reported in the result.
    pub fn consolidate(&self) -> ConsolidationResult {
        let now_ms = Utc::now().timestamp_millis();
        let outcome = self.store.transaction(|tx| {
            let groups = duplicate_groups(load_projects(tx)?);
            let found: usize = groups.iter().map(|(_, members)| members.len() - 1).sum();

            let merged = groups.len();
            let mut details = Vec::new();
            let mut removed = 0;
            for (key, members) in groups {
                debug!("Merging {} projects with path key {}", members.len(), key);
                let lines = merge_group(tx, members, now_ms)?;
                removed += lines.len();
                details.extend(lines);
            }
            Ok((found, removed, merged, details))
        });

        match outcome {
            Ok((found, removed, merged, details)) => {
                if removed > 0 {
                    info!("Consolidated {} duplicate projects", removed);
                }
                ConsolidationResult {
                    success: true,
                    duplicates_found: found,
                    duplicates_removed: removed,
                    projects_merged: merged,
                    errors: Vec::new(),
                    details,
                }
            }
            Err(e) => {
                error!("Duplicate consolidation rolled back: {}", e);
                ConsolidationResult {
                    success: false,
                    errors: vec![e.to_string()],
                    ..Default::default()
                }
            }
        }
    }
}

fn load_projects(conn: &Connection) -> Result<Vec<ProjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, path, tech_stack, architecture, updated_at
         FROM projects WHERE path IS NOT NULL ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        let updated_at: Value = row.get(5)?;
        Ok(ProjectRow {
            id: row.get(0)?,
            name: row.get(1)?,
            path: row.get(2)?,
            tech_stack: row.get(3)?,
            architecture: row.get(4)?,
            updated_at: parse_timestamp(&updated_at).unwrap_or(0),
        })
    })?;

    let mut projects = Vec::new();
    for row in rows {
        projects.push(row?);
    }
    Ok(projects)
}

/// Groups of more than one project, in order of first appearance. Members
/// keep load order.
fn duplicate_groups(projects: Vec<ProjectRow>) -> Vec<(PathIdentity, Vec<ProjectRow>)> {
    let mut index: HashMap<PathIdentity, usize> = HashMap::new();
    let mut groups: Vec<(PathIdentity, Vec<ProjectRow>)> = Vec::new();
    for project in projects {
        let key = PathIdentity::normalize(&project.path);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(project),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![project]));
            }
        }
    }
    groups.retain(|(_, members)| members.len() > 1);
    groups
}

fn merged_name(canonical: &ProjectRow, members: &[ProjectRow]) -> String {
    if let Some(folder) = folder_name(&canonical.path) {
        if let Some(m) = members.iter().find(|m| m.name == folder) {
            return m.name.clone();
        }
    }
    members
        .iter()
        .find(|m| !m.name.starts_with('@'))
        .map(|m| m.name.clone())
        .unwrap_or_else(|| canonical.name.clone())
}

fn merged_tech_stack(members: &[ProjectRow]) -> Vec<String> {
    let mut stack: Vec<String> = Vec::new();
    for member in members {
        for item in parse_list(member.tech_stack.as_deref()) {
            if !stack.contains(&item) {
                stack.push(item);
            }
        }
    }
    stack
}

fn merged_architecture(members: &[ProjectRow]) -> Option<String> {
    members
        .iter()
        .filter_map(|m| m.architecture.as_deref())
        .map(str::trim)
        .find(|a| !a.is_empty() && !a.eq_ignore_ascii_case("unspecified"))
        .map(str::to_string)
}

/// Merge one group into its canonical row. Returns one audit line per
/// removed duplicate.
fn merge_group(conn: &Connection, mut members: Vec<ProjectRow>, now_ms: i64) -> Result<Vec<String>> {
    // Stable: equal timestamps keep insertion order.
    members.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    let canonical = &members[0];

    let name = merged_name(canonical, &members);
    let tech_stack = serde_json::to_string(&merged_tech_stack(&members))?;
    let architecture = merged_architecture(&members);

    conn.execute(
        "UPDATE projects SET name = ?1, tech_stack = ?2, architecture = ?3, updated_at = ?4 WHERE id = ?5",
        params![name, tech_stack, architecture, now_ms, canonical.id],
    )?;

    let tables = schema::project_reference_tables(conn)?;
    let mut lines = Vec::with_capacity(members.len() - 1);
    for duplicate in &members[1..] {
        let mut moved = Vec::new();
        for table in &tables {
            let count = conn.execute(
                &format!("UPDATE {} SET project_id = ?1 WHERE project_id = ?2", table),
                params![canonical.id, duplicate.id],
            )?;
            if count > 0 {
                moved.push(format!("{}={}", table, count));
            }
        }
        conn.execute("DELETE FROM projects WHERE id = ?1", params![duplicate.id])?;

        let moved = if moved.is_empty() {
            "no dependent rows".to_string()
        } else {
            moved.join(", ")
        };
        let line = format!(
            "Kept \"{}\" ({}); merged \"{}\" ({}): {}",
            name, canonical.id, duplicate.name, duplicate.id, moved
        );
        info!("{}", line);
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(&temp_dir.path().join("memory.db")).unwrap();
        (store, temp_dir)
    }

    fn insert_project(
        store: &Store,
        id: &str,
        name: &str,
        path: Option<&str>,
        tech_stack: &str,
        updated_at: i64,
    ) {
        store
            .execute(
                "INSERT INTO projects (id, name, path, tech_stack, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![id, name, path, tech_stack, updated_at],
            )
            .unwrap();
    }

    fn insert_note(store: &Store, id: &str, project_id: &str) {
        store
            .execute(
                "INSERT INTO notes (id, project_id, content, created_at) VALUES (?1, ?2, 'n', 0)",
                params![id, project_id],
            )
            .unwrap();
    }

    fn project_ids(store: &Store) -> Vec<String> {
        store
            .query_rows("SELECT id FROM projects ORDER BY rowid", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_stats_groups_by_path_identity() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "a", "web", Some("/Work/Web/"), "[]", 1);
        insert_project(&store, "b", "web", Some("\\work\\web"), "[]", 2);
        insert_project(&store, "c", "api", Some("/work/api"), "[]", 3);
        insert_project(&store, "d", "loose", None, "[]", 4);
        insert_project(&store, "e", "loose", None, "[]", 5);

        let stats = DuplicateConsolidator::new(store.clone()).stats().unwrap();

        assert_eq!(stats.total_projects, 5);
        assert_eq!(stats.duplicate_groups, 1);
        assert_eq!(stats.total_duplicates, 1);
        assert_eq!(stats.duplicate_details[0].path_key, "/work/web");
        assert_eq!(stats.duplicate_details[0].project_ids, vec!["a", "b"]);
        assert_eq!(project_ids(&store).len(), 5);
    }

    #[test]
    fn test_stats_is_repeatable_and_read_only() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "a", "web", Some("/work/web"), r#"["ts"]"#, 1);
        insert_project(&store, "b", "Web", Some("/WORK/web/"), r#"["node"]"#, 2);
        insert_note(&store, "n1", "b");
        let consolidator = DuplicateConsolidator::new(store.clone());

        let first = consolidator.stats().unwrap();
        let second = consolidator.stats().unwrap();
        let preview = consolidator.preview().unwrap();

        assert_eq!(first, second);
        assert_eq!(first, preview);
        assert_eq!(project_ids(&store), vec!["a", "b"]);
        let note_owner: String = store
            .read(|conn| {
                Ok(conn.query_row("SELECT project_id FROM notes WHERE id = 'n1'", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(note_owner, "b");
    }

    #[test]
    fn test_merge_picks_folder_name_and_unions_stack() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "p1", "pkg-a", Some("/code/myproj"), r#"["ts"]"#, 200);
        insert_project(&store, "p2", "myproj", Some("/code/MyProj/"), r#"["node","ts"]"#, 100);
        insert_note(&store, "n1", "p2");
        insert_note(&store, "n2", "p2");

        let result = DuplicateConsolidator::new(store.clone()).consolidate();

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.duplicates_found, 1);
        assert_eq!(result.duplicates_removed, 1);
        assert_eq!(result.projects_merged, 1);
        assert_eq!(
            result.details,
            vec![r#"Kept "myproj" (p1); merged "myproj" (p2): notes=2"#.to_string()]
        );

        let (name, stack): (String, String) = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT name, tech_stack FROM projects WHERE id = 'p1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(name, "myproj");
        assert_eq!(stack, r#"["ts","node"]"#);
        assert_eq!(project_ids(&store), vec!["p1"]);

        let on_canonical = store
            .query_rows(
                "SELECT id FROM notes WHERE project_id = 'p1'",
                [],
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        assert_eq!(on_canonical.len(), 2);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "first", "@scope/x", Some("/a/x"), "[]", 5);
        insert_project(&store, "second", "x", Some("/A/X"), "[]", 5);
        insert_project(&store, "third", "x", Some("/a/x/"), "[]", 5);

        let result = DuplicateConsolidator::new(store.clone()).consolidate();

        assert!(result.success);
        assert_eq!(result.duplicates_removed, 2);
        assert_eq!(project_ids(&store), vec!["first"]);
        assert!(result.details[0].contains("no dependent rows"));
    }

    #[test]
    fn test_architecture_skips_unspecified() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "a", "svc", Some("/svc"), "[]", 3);
        insert_project(&store, "b", "svc", Some("/SVC"), "[]", 2);
        insert_project(&store, "c", "svc", Some("/svc/"), "[]", 1);
        store
            .execute("UPDATE projects SET architecture = 'Unspecified' WHERE id = 'a'", [])
            .unwrap();
        store
            .execute("UPDATE projects SET architecture = 'hexagonal' WHERE id = 'c'", [])
            .unwrap();

        assert!(DuplicateConsolidator::new(store.clone()).consolidate().success);

        let architecture: Option<String> = store
            .read(|conn| {
                Ok(conn.query_row("SELECT architecture FROM projects", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(architecture.as_deref(), Some("hexagonal"));
    }

    #[test]
    fn test_failure_rolls_back_every_merge() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "a", "one", Some("/one"), "[]", 2);
        insert_project(&store, "b", "one", Some("/ONE"), "[]", 1);
        insert_note(&store, "n1", "b");
        store
            .execute(
                "CREATE TRIGGER block_notes BEFORE UPDATE ON notes
                 BEGIN SELECT RAISE(ABORT, 'notes are read-only'); END;",
                [],
            )
            .unwrap();

        let result = DuplicateConsolidator::new(store.clone()).consolidate();

        assert!(!result.success);
        assert_eq!(result.duplicates_removed, 0);
        assert!(result.errors[0].contains("read-only"));
        assert_eq!(project_ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_no_duplicates_is_a_clean_success() {
        let (store, _temp_dir) = create_test_store();
        insert_project(&store, "a", "one", Some("/one"), "[]", 1);

        let result = DuplicateConsolidator::new(store).consolidate();

        assert!(result.success);
        assert_eq!(result.duplicates_found, 0);
        assert!(result.details.is_empty());
    }
}
