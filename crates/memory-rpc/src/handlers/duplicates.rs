//! Duplicate project handlers.

use crate::handlers::{get_bool_param, run_blocking};
use crate::server::AppState;
use serde_json::{json, Value};

pub async fn get_duplicate_stats(
    state: &AppState,
    _params: &Value,
) -> project_memory::Result<Value> {
    let stats = run_blocking(state, |api| api.duplicate_stats()).await?;
    Ok(json!({
        "success": true,
        "stats": stats
    }))
}

/// Merge duplicate projects, or report what would be merged with `dry_run`.
pub async fn consolidate_duplicates(
    state: &AppState,
    params: &Value,
) -> project_memory::Result<Value> {
    let dry_run = get_bool_param(params, "dry_run", "dryRun")?.unwrap_or(false);

    if dry_run {
        let preview = run_blocking(state, |api| api.preview_consolidation()).await?;
        return Ok(json!({
            "success": true,
            "dryRun": true,
            "stats": preview
        }));
    }

    let result = run_blocking(state, |api| Ok(api.consolidate_duplicates())).await?;
    Ok(json!({
        "success": result.success,
        "dryRun": false,
        "result": result
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{create_test_state, rpc};
    use serde_json::json;
    use tempfile::TempDir;

    fn seed_duplicates(state: &crate::server::AppState) {
        state
            .api
            .store()
            .execute(
                "INSERT INTO projects (id, name, path, tech_stack, created_at, updated_at) VALUES
                 ('a', '@org/web', '/code/web', '[\"ts\"]', 0, 2),
                 ('b', 'web', '/CODE/Web/', '[\"node\"]', 0, 1)",
                [],
            )
            .unwrap();
        state
            .api
            .store()
            .execute(
                "INSERT INTO notes (id, project_id, content, created_at) VALUES ('n', 'b', 'x', 0)",
                [],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(temp_dir.path().join("memory.db"));
        seed_duplicates(&state);

        let response = rpc(state.clone(), "consolidate_duplicates", json!({"dryRun": true})).await;

        assert_eq!(response["result"]["dryRun"], true);
        assert_eq!(response["result"]["stats"]["totalDuplicates"], 1);

        let stats = rpc(state, "get_duplicate_stats", json!({})).await;
        assert_eq!(stats["result"]["stats"]["totalProjects"], 2);
    }

    #[tokio::test]
    async fn test_consolidate_merges() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(temp_dir.path().join("memory.db"));
        seed_duplicates(&state);

        let response = rpc(state.clone(), "consolidate_duplicates", json!({})).await;

        let result = &response["result"]["result"];
        assert_eq!(result["success"], true);
        assert_eq!(result["duplicatesRemoved"], 1);
        assert_eq!(
            result["details"][0],
            "Kept \"web\" (a); merged \"web\" (b): notes=1"
        );

        let stats = rpc(state, "get_duplicate_stats", json!({})).await;
        assert_eq!(stats["result"]["stats"]["totalProjects"], 1);
    }

    #[tokio::test]
    async fn test_invalid_dry_run_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(temp_dir.path().join("memory.db"));

        let response = rpc(state, "consolidate_duplicates", json!({"dry_run": "yes"})).await;

        assert_eq!(response["error"]["code"], -32602);
    }
}
