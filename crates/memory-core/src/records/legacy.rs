//! Typed rows of the legacy (v1) record families.

use crate::error::{MemoryError, Result};
use crate::store::schema::table_columns;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Serialize;
use std::fmt;

use super::current::CurrentFamily;
use super::transform::parse_timestamp;

/// A legacy record family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyFamily {
    Decision,
    Conversation,
    Learning,
    ProblemSolution,
    Comparison,
    AntiPattern,
    Todo,
}

impl LegacyFamily {
    /// Fixed order in which families are migrated.
    pub const MIGRATION_ORDER: [LegacyFamily; 7] = [
        LegacyFamily::Decision,
        LegacyFamily::Conversation,
        LegacyFamily::Learning,
        LegacyFamily::ProblemSolution,
        LegacyFamily::Comparison,
        LegacyFamily::AntiPattern,
        LegacyFamily::Todo,
    ];

    /// v1 table name of the family.
    pub fn table(self) -> &'static str {
        match self {
            LegacyFamily::Decision => "decisions",
            LegacyFamily::Conversation => "conversations",
            LegacyFamily::Learning => "learnings",
            LegacyFamily::ProblemSolution => "problem_solutions",
            LegacyFamily::Comparison => "comparisons",
            LegacyFamily::AntiPattern => "anti_patterns",
            LegacyFamily::Todo => "todos",
        }
    }

    pub fn destination(self) -> CurrentFamily {
        match self {
            LegacyFamily::Decision | LegacyFamily::Comparison => CurrentFamily::Decision,
            LegacyFamily::Conversation | LegacyFamily::Learning => CurrentFamily::Note,
            LegacyFamily::ProblemSolution => CurrentFamily::Problem,
            LegacyFamily::AntiPattern => CurrentFamily::Constraint,
            LegacyFamily::Todo => CurrentFamily::ActiveWork,
        }
    }

    /// Columns read from the v1 table, in struct order. The last one is the
    /// timestamp column rows are ordered by.
    fn columns(self) -> &'static [&'static str] {
        match self {
            LegacyFamily::Decision => &[
                "id",
                "project_id",
                "decision",
                "reasoning",
                "alternatives",
                "timestamp",
            ],
            LegacyFamily::Conversation => {
                &["id", "project_id", "tool", "role", "content", "timestamp"]
            }
            LegacyFamily::Learning => &[
                "id",
                "project_id",
                "insight",
                "context",
                "confidence",
                "timestamp",
            ],
            LegacyFamily::ProblemSolution => {
                &["id", "project_id", "problem", "solution", "tags", "timestamp"]
            }
            LegacyFamily::Comparison => &[
                "id",
                "project_id",
                "option_a",
                "option_b",
                "winner",
                "reasoning",
                "timestamp",
            ],
            LegacyFamily::AntiPattern => &[
                "id",
                "project_id",
                "pattern",
                "why",
                "alternative",
                "timestamp",
            ],
            LegacyFamily::Todo => &[
                "id",
                "project_id",
                "title",
                "description",
                "status",
                "priority",
                "due_date",
                "tags",
                "created_at",
            ],
        }
    }

    /// SELECT for `source_table`, latest insert first. Columns the install never had
    /// are read as NULL.
    fn select_sql(self, source_table: &str, existing: &[String]) -> String {
        let wanted = self.columns();
        let select_list: Vec<String> = wanted
            .iter()
            .map(|col| {
                if existing.iter().any(|c| c == col) {
                    (*col).to_string()
                } else {
                    format!("NULL AS {}", col)
                }
            })
            .collect();

        format!(
            "SELECT {} FROM {} ORDER BY rowid DESC",
            select_list.join(", "),
            source_table
        )
    }
}

impl fmt::Display for LegacyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyDecision {
    pub id: String,
    pub project_id: String,
    pub decision: Option<String>,
    pub reasoning: Option<String>,
    pub alternatives: Option<String>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyConversation {
    pub id: String,
    pub project_id: String,
    pub tool: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLearning {
    pub id: String,
    pub project_id: String,
    pub insight: Option<String>,
    pub context: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyProblemSolution {
    pub id: String,
    pub project_id: String,
    pub problem: Option<String>,
    pub solution: Option<String>,
    pub tags: Option<String>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyComparison {
    pub id: String,
    pub project_id: String,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub winner: Option<String>,
    pub reasoning: Option<String>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyAntiPattern {
    pub id: String,
    pub project_id: String,
    pub pattern: Option<String>,
    pub why: Option<String>,
    pub alternative: Option<String>,
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTodo {
    pub id: String,
    pub project_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub tags: Option<String>,
    pub created_at: Value,
}

/// One row of any legacy family.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyRecord {
    Decision(LegacyDecision),
    Conversation(LegacyConversation),
    Learning(LegacyLearning),
    ProblemSolution(LegacyProblemSolution),
    Comparison(LegacyComparison),
    AntiPattern(LegacyAntiPattern),
    Todo(LegacyTodo),
}

impl LegacyRecord {
    pub fn family(&self) -> LegacyFamily {
        match self {
            LegacyRecord::Decision(_) => LegacyFamily::Decision,
            LegacyRecord::Conversation(_) => LegacyFamily::Conversation,
            LegacyRecord::Learning(_) => LegacyFamily::Learning,
            LegacyRecord::ProblemSolution(_) => LegacyFamily::ProblemSolution,
            LegacyRecord::Comparison(_) => LegacyFamily::Comparison,
            LegacyRecord::AntiPattern(_) => LegacyFamily::AntiPattern,
            LegacyRecord::Todo(_) => LegacyFamily::Todo,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LegacyRecord::Decision(r) => &r.id,
            LegacyRecord::Conversation(r) => &r.id,
            LegacyRecord::Learning(r) => &r.id,
            LegacyRecord::ProblemSolution(r) => &r.id,
            LegacyRecord::Comparison(r) => &r.id,
            LegacyRecord::AntiPattern(r) => &r.id,
            LegacyRecord::Todo(r) => &r.id,
        }
    }

    /// Raw creation time as stored; integers and text may be mixed.
    pub fn timestamp(&self) -> &Value {
        match self {
            LegacyRecord::Decision(r) => &r.timestamp,
            LegacyRecord::Conversation(r) => &r.timestamp,
            LegacyRecord::Learning(r) => &r.timestamp,
            LegacyRecord::ProblemSolution(r) => &r.timestamp,
            LegacyRecord::Comparison(r) => &r.timestamp,
            LegacyRecord::AntiPattern(r) => &r.timestamp,
            LegacyRecord::Todo(r) => &r.created_at,
        }
    }

    fn from_row(family: LegacyFamily, row: &Row<'_>) -> rusqlite::Result<Self> {
        let id = value_text(row.get(0)?).unwrap_or_else(|| "<null>".to_string());
        let project_id = value_text(row.get(1)?).unwrap_or_default();
        let text = |idx: usize| -> rusqlite::Result<Option<String>> {
            Ok(value_text(row.get(idx)?))
        };

        let record = match family {
            LegacyFamily::Decision => LegacyRecord::Decision(LegacyDecision {
                id,
                project_id,
                decision: text(2)?,
                reasoning: text(3)?,
                alternatives: text(4)?,
                timestamp: row.get(5)?,
            }),
            LegacyFamily::Conversation => LegacyRecord::Conversation(LegacyConversation {
                id,
                project_id,
                tool: text(2)?,
                role: text(3)?,
                content: text(4)?,
                timestamp: row.get(5)?,
            }),
            LegacyFamily::Learning => LegacyRecord::Learning(LegacyLearning {
                id,
                project_id,
                insight: text(2)?,
                context: text(3)?,
                confidence: value_f64(&row.get(4)?),
                timestamp: row.get(5)?,
            }),
            LegacyFamily::ProblemSolution => {
                LegacyRecord::ProblemSolution(LegacyProblemSolution {
                    id,
                    project_id,
                    problem: text(2)?,
                    solution: text(3)?,
                    tags: text(4)?,
                    timestamp: row.get(5)?,
                })
            }
            LegacyFamily::Comparison => LegacyRecord::Comparison(LegacyComparison {
                id,
                project_id,
                option_a: text(2)?,
                option_b: text(3)?,
                winner: text(4)?,
                reasoning: text(5)?,
                timestamp: row.get(6)?,
            }),
            LegacyFamily::AntiPattern => LegacyRecord::AntiPattern(LegacyAntiPattern {
                id,
                project_id,
                pattern: text(2)?,
                why: text(3)?,
                alternative: text(4)?,
                timestamp: row.get(5)?,
            }),
            LegacyFamily::Todo => LegacyRecord::Todo(LegacyTodo {
                id,
                project_id,
                title: text(2)?,
                description: text(3)?,
                status: text(4)?,
                priority: text(5)?,
                due_date: text(6)?,
                tags: text(7)?,
                created_at: row.get(8)?,
            }),
        };
        Ok(record)
    }
}

/// Read every row of `family` from `source_table`, newest first.
///
/// `source_table` must be a known legacy table name; it is interpolated.
pub fn read_family(
    conn: &Connection,
    family: LegacyFamily,
    source_table: &str,
) -> Result<Vec<LegacyRecord>> {
    let existing = table_columns(conn, source_table)?;
    if existing.is_empty() {
        return Ok(Vec::new());
    }

    let sql = family.select_sql(source_table, &existing);
    let mut stmt = conn.prepare(&sql).map_err(|e| MemoryError::Database {
        message: format!("Failed to read legacy table {}: {}", source_table, e),
        source: Some(e),
    })?;
    let rows = stmt.query_map([], |row| LegacyRecord::from_row(family, row))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }

    // SQLite orders mixed INTEGER/TEXT columns by storage class, so sort on
    // the parsed time. Unparseable values go last.
    records.sort_by_key(|r| std::cmp::Reverse(parse_timestamp(r.timestamp())));
    Ok(records)
}

/// Loose text read: numbers are stringified, blobs decoded lossily.
fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(n) => Some(n.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Real(f) => Some(*f),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}
