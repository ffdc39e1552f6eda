//! Rewrites of legacy rows into current-schema rows.
//!
//! One function per legacy family. Every rewritten row gets a fresh UUID v4
//! id; timestamps are normalized to epoch milliseconds, falling back to the
//! migration's `now` when a legacy value cannot be read.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use uuid::Uuid;

use super::current::{
    ActiveWork, Constraint, CurrentRecord, Decision, DecisionKind, DecisionReasoning, Note,
    Problem, ProblemStatus, WorkStatus,
};
use super::legacy::{
    LegacyAntiPattern, LegacyComparison, LegacyConversation, LegacyDecision, LegacyFamily,
    LegacyLearning, LegacyProblemSolution, LegacyRecord, LegacyTodo,
};
use crate::config::MigrationConfig;
use crate::error::{MemoryError, Result};

/// Integers at or above this are already milliseconds (year 1973 onwards).
const MILLIS_THRESHOLD: f64 = 1e11;

impl LegacyRecord {
    /// Rewrite into the record's destination family.
    pub fn into_current(self, now_ms: i64) -> Result<CurrentRecord> {
        match self {
            LegacyRecord::Decision(r) => decision_to_decision(r, now_ms),
            LegacyRecord::Conversation(r) => conversation_to_note(r, now_ms),
            LegacyRecord::Learning(r) => learning_to_note(r, now_ms),
            LegacyRecord::ProblemSolution(r) => problem_solution_to_problem(r, now_ms),
            LegacyRecord::Comparison(r) => comparison_to_decision(r, now_ms),
            LegacyRecord::AntiPattern(r) => anti_pattern_to_constraint(r, now_ms),
            LegacyRecord::Todo(r) => todo_to_active_work(r, now_ms),
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn required(
    family: LegacyFamily,
    row_id: &str,
    field: &str,
    value: Option<String>,
) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(MemoryError::transform(
            family.table(),
            row_id,
            format!("required field '{}' is empty", field),
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn decision_to_decision(r: LegacyDecision, now_ms: i64) -> Result<CurrentRecord> {
    let description = required(LegacyFamily::Decision, &r.id, "decision", r.decision)?;
    Ok(CurrentRecord::Decision(Decision {
        id: new_id(),
        project_id: r.project_id,
        kind: DecisionKind::Decision,
        description,
        reasoning: non_empty(r.reasoning).map(DecisionReasoning::Text),
        alternatives: parse_list(r.alternatives.as_deref()),
        tags: Vec::new(),
        created_at: parse_timestamp(&r.timestamp).unwrap_or(now_ms),
    }))
}

fn conversation_to_note(r: LegacyConversation, now_ms: i64) -> Result<CurrentRecord> {
    let content = required(LegacyFamily::Conversation, &r.id, "content", r.content)?;
    let tool = non_empty(r.tool).unwrap_or_else(|| "unknown".to_string());
    let role = non_empty(r.role).unwrap_or_else(|| "unknown".to_string());
    Ok(CurrentRecord::Note(Note {
        id: new_id(),
        project_id: r.project_id,
        content: format!("[{}] {}: {}", tool, role, content),
        tags: vec!["conversation".to_string(), tool, role],
        created_at: parse_timestamp(&r.timestamp).unwrap_or(now_ms),
    }))
}

fn learning_to_note(r: LegacyLearning, now_ms: i64) -> Result<CurrentRecord> {
    let insight = required(LegacyFamily::Learning, &r.id, "insight", r.insight)?;
    let content = match non_empty(r.context) {
        Some(context) => format!("{}\n\nContext: {}", insight, context),
        None => insight,
    };
    Ok(CurrentRecord::Note(Note {
        id: new_id(),
        project_id: r.project_id,
        content,
        tags: vec![
            "learning".to_string(),
            format!("confidence:{}", confidence_band(r.confidence)),
        ],
        created_at: parse_timestamp(&r.timestamp).unwrap_or(now_ms),
    }))
}

fn problem_solution_to_problem(r: LegacyProblemSolution, now_ms: i64) -> Result<CurrentRecord> {
    let description = required(LegacyFamily::ProblemSolution, &r.id, "problem", r.problem)?;
    let created_at = parse_timestamp(&r.timestamp).unwrap_or(now_ms);
    Ok(CurrentRecord::Problem(Problem {
        id: new_id(),
        project_id: r.project_id,
        description,
        status: ProblemStatus::Resolved,
        resolution: non_empty(r.solution),
        tags: parse_list(r.tags.as_deref()),
        created_at,
        resolved_at: Some(created_at),
    }))
}

fn comparison_to_decision(r: LegacyComparison, now_ms: i64) -> Result<CurrentRecord> {
    let family = LegacyFamily::Comparison;
    let option_a = required(family, &r.id, "option_a", r.option_a)?;
    let option_b = required(family, &r.id, "option_b", r.option_b)?;
    let winner = required(family, &r.id, "winner", r.winner)?;

    let loser = if winner == option_b {
        option_a.clone()
    } else {
        option_b.clone()
    };

    Ok(CurrentRecord::Decision(Decision {
        id: new_id(),
        project_id: r.project_id,
        kind: DecisionKind::Comparison,
        description: format!("Chose {} over {}", winner, loser),
        reasoning: Some(DecisionReasoning::Comparison {
            options: [option_a, option_b],
            winner,
            reasoning: non_empty(r.reasoning),
        }),
        alternatives: vec![loser],
        tags: Vec::new(),
        created_at: parse_timestamp(&r.timestamp).unwrap_or(now_ms),
    }))
}

fn anti_pattern_to_constraint(r: LegacyAntiPattern, now_ms: i64) -> Result<CurrentRecord> {
    let pattern = required(LegacyFamily::AntiPattern, &r.id, "pattern", r.pattern)?;
    let value = match non_empty(r.alternative) {
        Some(alt) => format!("DON'T: {} (instead: {})", pattern, alt),
        None => format!("DON'T: {}", pattern),
    };
    Ok(CurrentRecord::Constraint(Constraint {
        id: new_id(),
        project_id: r.project_id,
        key: slugify(&pattern),
        value,
        reasoning: non_empty(r.why),
        created_at: parse_timestamp(&r.timestamp).unwrap_or(now_ms),
    }))
}

fn todo_to_active_work(r: LegacyTodo, now_ms: i64) -> Result<CurrentRecord> {
    let task = required(LegacyFamily::Todo, &r.id, "title", r.title)?;

    let mut lines = Vec::new();
    if let Some(description) = non_empty(r.description) {
        lines.push(description);
    }
    if let Some(priority) = non_empty(r.priority) {
        lines.push(format!("Priority: {}", priority));
    }
    if let Some(due) = non_empty(r.due_date) {
        lines.push(format!("Due: {}", due));
    }
    let tags = parse_list(r.tags.as_deref());
    if !tags.is_empty() {
        lines.push(format!("Tags: {}", tags.join(", ")));
    }
    let context = (!lines.is_empty()).then(|| lines.join("\n"));

    let created_at = parse_timestamp(&r.created_at).unwrap_or(now_ms);
    Ok(CurrentRecord::ActiveWork(ActiveWork {
        id: new_id(),
        project_id: r.project_id,
        task,
        context,
        status: WorkStatus::from_legacy(r.status.as_deref()),
        created_at,
        updated_at: created_at,
    }))
}

/// Read a legacy timestamp as epoch milliseconds.
///
/// Accepts integer or real seconds/milliseconds, numeric text, RFC 3339,
/// SQLite `CURRENT_TIMESTAMP` text and bare dates. Naive values are UTC.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(epoch_to_millis(*n as f64)),
        Value::Real(f) if f.is_finite() => Some(epoch_to_millis(*f)),
        Value::Text(s) => parse_timestamp_text(s.trim()),
        _ => None,
    }
}

fn epoch_to_millis(n: f64) -> i64 {
    if n.abs() >= MILLIS_THRESHOLD {
        n.round() as i64
    } else {
        (n * 1000.0).round() as i64
    }
}

fn parse_timestamp_text(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(epoch_to_millis(n as f64));
    }
    if let Ok(f) = s.parse::<f64>() {
        return f.is_finite().then(|| epoch_to_millis(f));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Read a tags/alternatives column: a JSON array or comma-separated text.
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    if raw.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            return items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Constraint key for an anti-pattern: lowercase ASCII alphanumerics, other
/// runs collapsed to `-`, capped in length.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MigrationConfig::CONSTRAINT_KEY_MAX_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "anti-pattern".to_string()
    } else {
        slug.to_string()
    }
}

/// Confidence band tag for a learning. Values above 1 are read on a 0-10
/// scale up to 10 and on a 0-100 scale beyond.
pub fn confidence_band(confidence: Option<f64>) -> &'static str {
    let Some(mut value) = confidence.filter(|v| v.is_finite()) else {
        return "unknown";
    };
    if value > 10.0 {
        value /= 100.0;
    } else if value > 1.0 {
        value /= 10.0;
    }

    if value >= 0.8 {
        "high"
    } else if value >= 0.5 {
        "medium"
    } else {
        "low"
    }
}
