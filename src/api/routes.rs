//! REST endpoints for submitting workflows and reading their progress.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::Database;
use crate::workflows::WorkflowDefinition;
use crate::workflows::model::{Workflow, WorkflowStatus};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Database>,
    /// Definition instantiated for every submission.
    pub definition: Arc<WorkflowDefinition>,
}

/// Build the Axum router with all API routes.
pub fn api_routes(store: Arc<dyn Database>, definition: Arc<WorkflowDefinition>) -> Router {
    let state = ApiState { store, definition };

    Router::new()
        .route("/health", get(health))
        .route("/analysis", post(submit_analysis))
        .route("/workflows/{id}/status", get(workflow_status))
        .route("/workflows/{id}/results", get(workflow_results))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "workflow-runner"
    }))
}

// ── Submission ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisRequest {
    client_id: String,
    /// Either a GeoJSON object or its serialized string form.
    geo_json: Value,
}

async fn submit_analysis(
    State(state): State<ApiState>,
    Json(body): Json<AnalysisRequest>,
) -> impl IntoResponse {
    if body.client_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "clientId is required"})),
        );
    }

    let geo_json = match body.geo_json {
        Value::String(s) => s,
        Value::Null => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "geoJson is required"})),
            );
        }
        other => other.to_string(),
    };

    let (workflow, tasks) = state.definition.instantiate(&body.client_id, &geo_json);
    if let Err(e) = state.store.create_workflow(&workflow, &tasks).await {
        warn!(error = %e, "Failed to create workflow");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to create workflow"})),
        );
    }

    info!(
        workflow_id = %workflow.id,
        client_id = %workflow.client_id,
        tasks = tasks.len(),
        "Workflow submitted"
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "workflowId": workflow.id,
            "message": "Workflow created and tasks queued from YAML definition."
        })),
    )
}

// ── Workflow queries ────────────────────────────────────────────────────

/// Parse the path id and load the workflow, or build the error response.
async fn load_workflow(
    state: &ApiState,
    id: &str,
) -> Result<Workflow, (StatusCode, Json<Value>)> {
    let workflow_id = Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid workflow ID"})),
        )
    })?;

    match state.store.get_workflow(workflow_id).await {
        Ok(Some(workflow)) => Ok(workflow),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Workflow not found"})),
        )),
        Err(e) => {
            warn!(workflow_id = %workflow_id, error = %e, "Failed to load workflow");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Error loading workflow"})),
            ))
        }
    }
}

async fn workflow_status(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    let workflow = match load_workflow(&state, &id).await {
        Ok(workflow) => workflow,
        Err(response) => return response,
    };

    let tasks = match state.store.list_workflow_tasks(workflow.id).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(workflow_id = %workflow.id, error = %e, "Failed to list workflow tasks");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Error getting workflow status"})),
            );
        }
    };

    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    (
        StatusCode::OK,
        Json(json!({
            "workflowId": workflow.id,
            "status": workflow.status,
            "completedTasks": completed,
            "totalTasks": tasks.len(),
        })),
    )
}

async fn workflow_results(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let workflow = match load_workflow(&state, &id).await {
        Ok(workflow) => workflow,
        Err(response) => return response,
    };

    match workflow.status {
        WorkflowStatus::Completed | WorkflowStatus::Failed => (
            StatusCode::OK,
            Json(json!({
                "workflowId": workflow.id,
                "status": workflow.status,
                "finalResult": workflow.final_result,
            })),
        ),
        WorkflowStatus::Initial | WorkflowStatus::InProgress => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Workflow is not yet completed"})),
        ),
    }
}
