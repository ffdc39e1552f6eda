//! Typed rows of the current (v2) record families.

use crate::error::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A current-schema record family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentFamily {
    Decision,
    Note,
    Problem,
    Constraint,
    ActiveWork,
    Goal,
}

impl CurrentFamily {
    pub fn table(self) -> &'static str {
        match self {
            CurrentFamily::Decision => "decisions",
            CurrentFamily::Note => "notes",
            CurrentFamily::Problem => "problems",
            CurrentFamily::Constraint => "constraints",
            CurrentFamily::ActiveWork => "active_work",
            CurrentFamily::Goal => "goals",
        }
    }
}

impl fmt::Display for CurrentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Reasoning attached to a decision.
///
/// Stored in the `decisions.reasoning` TEXT column: plain decisions keep their
/// text verbatim, comparisons are stored as a JSON object
/// `{"options": [a, b], "winner": w, "reasoning": r}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReasoning {
    Text(String),
    Comparison {
        options: [String; 2],
        winner: String,
        reasoning: Option<String>,
    },
}

#[derive(Serialize, Deserialize)]
struct ComparisonPayload {
    options: Vec<String>,
    winner: String,
    #[serde(default)]
    reasoning: Option<String>,
}

impl DecisionReasoning {
    pub fn to_column(&self) -> Result<String> {
        match self {
            DecisionReasoning::Text(text) => Ok(text.clone()),
            DecisionReasoning::Comparison {
                options,
                winner,
                reasoning,
            } => Ok(serde_json::to_string(&ComparisonPayload {
                options: options.to_vec(),
                winner: winner.clone(),
                reasoning: reasoning.clone(),
            })?),
        }
    }

    /// Read a stored column back. Anything that is not a comparison payload
    /// is plain text.
    pub fn parse(raw: &str) -> Self {
        if raw.trim_start().starts_with('{') {
            if let Ok(payload) = serde_json::from_str::<ComparisonPayload>(raw) {
                if let [a, b] = payload.options.as_slice() {
                    return DecisionReasoning::Comparison {
                        options: [a.clone(), b.clone()],
                        winner: payload.winner,
                        reasoning: payload.reasoning,
                    };
                }
            }
        }
        DecisionReasoning::Text(raw.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Decision,
    Comparison,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Decision => "decision",
            DecisionKind::Comparison => "comparison",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    Open,
    Resolved,
}

impl ProblemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProblemStatus::Open => "open",
            ProblemStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Active,
    Paused,
    Completed,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Active => "active",
            WorkStatus::Paused => "paused",
            WorkStatus::Completed => "completed",
        }
    }

    /// Map a free-form v1 todo status.
    pub fn from_legacy(status: Option<&str>) -> Self {
        let normalized = status
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "completed" | "done" => WorkStatus::Completed,
            "blocked" | "on_hold" => WorkStatus::Paused,
            _ => WorkStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub id: String,
    pub project_id: String,
    pub kind: DecisionKind,
    pub description: String,
    pub reasoning: Option<DecisionReasoning>,
    pub alternatives: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub project_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub id: String,
    pub project_id: String,
    pub description: String,
    pub status: ProblemStatus,
    pub resolution: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub value: String,
    pub reasoning: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWork {
    pub id: String,
    pub project_id: String,
    pub task: String,
    pub context: Option<String>,
    pub status: WorkStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: String,
    pub project_id: String,
    pub goal: String,
    pub status: String,
    pub created_at: i64,
}

/// One row of any current family.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentRecord {
    Decision(Decision),
    Note(Note),
    Problem(Problem),
    Constraint(Constraint),
    ActiveWork(ActiveWork),
    Goal(Goal),
}

impl CurrentRecord {
    pub fn family(&self) -> CurrentFamily {
        match self {
            CurrentRecord::Decision(_) => CurrentFamily::Decision,
            CurrentRecord::Note(_) => CurrentFamily::Note,
            CurrentRecord::Problem(_) => CurrentFamily::Problem,
            CurrentRecord::Constraint(_) => CurrentFamily::Constraint,
            CurrentRecord::ActiveWork(_) => CurrentFamily::ActiveWork,
            CurrentRecord::Goal(_) => CurrentFamily::Goal,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CurrentRecord::Decision(r) => &r.id,
            CurrentRecord::Note(r) => &r.id,
            CurrentRecord::Problem(r) => &r.id,
            CurrentRecord::Constraint(r) => &r.id,
            CurrentRecord::ActiveWork(r) => &r.id,
            CurrentRecord::Goal(r) => &r.id,
        }
    }

    /// Insert the record into its family's table.
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        match self {
            CurrentRecord::Decision(d) => {
                let reasoning = d
                    .reasoning
                    .as_ref()
                    .map(DecisionReasoning::to_column)
                    .transpose()?;
                conn.execute(
                    "INSERT INTO decisions (id, project_id, type, description, reasoning, alternatives, tags, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        d.id,
                        d.project_id,
                        d.kind.as_str(),
                        d.description,
                        reasoning,
                        serde_json::to_string(&d.alternatives)?,
                        serde_json::to_string(&d.tags)?,
                        d.created_at,
                    ],
                )?;
            }
            CurrentRecord::Note(n) => {
                conn.execute(
                    "INSERT INTO notes (id, project_id, content, tags, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        n.id,
                        n.project_id,
                        n.content,
                        serde_json::to_string(&n.tags)?,
                        n.created_at,
                    ],
                )?;
            }
            CurrentRecord::Problem(p) => {
                conn.execute(
                    "INSERT INTO problems (id, project_id, description, status, resolution, tags, created_at, resolved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        p.id,
                        p.project_id,
                        p.description,
                        p.status.as_str(),
                        p.resolution,
                        serde_json::to_string(&p.tags)?,
                        p.created_at,
                        p.resolved_at,
                    ],
                )?;
            }
            CurrentRecord::Constraint(c) => {
                conn.execute(
                    "INSERT INTO constraints (id, project_id, key, value, reasoning, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![c.id, c.project_id, c.key, c.value, c.reasoning, c.created_at],
                )?;
            }
            CurrentRecord::ActiveWork(w) => {
                conn.execute(
                    "INSERT INTO active_work (id, project_id, task, context, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        w.id,
                        w.project_id,
                        w.task,
                        w.context,
                        w.status.as_str(),
                        w.created_at,
                        w.updated_at,
                    ],
                )?;
            }
            CurrentRecord::Goal(g) => {
                conn.execute(
                    "INSERT INTO goals (id, project_id, goal, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![g.id, g.project_id, g.goal, g.status, g.created_at],
                )?;
            }
        }
        Ok(())
    }
}
