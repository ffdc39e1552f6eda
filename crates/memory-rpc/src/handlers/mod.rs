//! JSON-RPC request handlers, split by domain.

mod duplicates;
mod migration;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use project_memory::{MemoryApi, MemoryError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// JSON-RPC code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional bool parameter, supporting both snake_case and camelCase.
///
/// A present value that is not a boolean is rejected.
pub(crate) fn get_bool_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> project_memory::Result<Option<bool>> {
    match params.get(snake).or_else(|| params.get(camel)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(MemoryError::InvalidParams {
            message: format!("Parameter {} must be a boolean, got {}", snake, other),
        }),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Run store work on the blocking pool; every store call holds the
/// connection lock for its whole duration.
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> project_memory::Result<T>
where
    F: FnOnce(&MemoryApi) -> project_memory::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let api = state.api.clone();
    tokio::task::spawn_blocking(move || f(&api))
        .await
        .map_err(|e| MemoryError::Other(format!("Store task failed: {}", e)))?
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    // Handle built-in methods
    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(
                id,
                json!({"status": "ok", "dbPath": state.db_path}),
            )),
        );
    }

    let Some(result) = dispatch_method(&state, method, &params).await else {
        warn!("Method not found: {}", method);
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            )),
        );
    };

    match result {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to its domain handler. `None` for unknown methods.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<project_memory::Result<Value>> {
    let result = match method {
        // Schema migration
        "get_migration_status" => migration::get_migration_status(state, params).await,
        "migrate_schema" => migration::migrate_schema(state, params).await,
        "get_startup_report" => migration::get_startup_report(state, params).await,

        // Duplicate projects
        "get_duplicate_stats" => duplicates::get_duplicate_stats(state, params).await,
        "consolidate_duplicates" => duplicates::consolidate_duplicates(state, params).await,

        _ => return None,
    };
    Some(result)
}
