//! Schema migration handlers.

use crate::handlers::run_blocking;
use crate::server::AppState;
use serde_json::{json, Value};

pub async fn get_migration_status(
    state: &AppState,
    _params: &Value,
) -> project_memory::Result<Value> {
    let status = run_blocking(state, |api| api.migration_status()).await?;
    Ok(json!({
        "success": true,
        "status": status
    }))
}

/// Check and migrate if needed. Safe to call repeatedly.
pub async fn migrate_schema(state: &AppState, _params: &Value) -> project_memory::Result<Value> {
    let outcome = run_blocking(state, |api| api.migrate_if_needed()).await?;
    Ok(match outcome {
        Some(result) => json!({
            "success": result.success,
            "migrated": result.success,
            "result": result
        }),
        None => json!({
            "success": true,
            "migrated": false
        }),
    })
}

pub async fn get_startup_report(
    state: &AppState,
    _params: &Value,
) -> project_memory::Result<Value> {
    Ok(json!({
        "success": true,
        "report": state.startup_report
    }))
}
