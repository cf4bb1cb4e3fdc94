//! Cost estimation endpoints. Estimates are computed on demand and never
//! persisted.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use flowsmith_core::cost::TemplateClip;
use flowsmith_core::graph::WorkflowNode;
use flowsmith_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkflowCostRequest {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateCostRequest {
    #[serde(default)]
    pub clips: Vec<TemplateClip>,
}

/// GET /api/v1/workflows/{id}/cost
///
/// Cost of the persisted graph.
pub async fn workflow_cost(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let graph = state.workflows.get(id, user.user_id).await?;
    let cost = state.cost.compute_workflow_cost(&graph.nodes).await?;
    Ok(Json(DataResponse { data: cost }))
}

/// POST /api/v1/cost/workflow
///
/// Cost of an unsaved candidate graph.
pub async fn candidate_cost(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<WorkflowCostRequest>,
) -> AppResult<impl IntoResponse> {
    let cost = state.cost.compute_workflow_cost(&request.nodes).await?;
    Ok(Json(DataResponse { data: cost }))
}

/// POST /api/v1/cost/template
pub async fn template_cost(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<TemplateCostRequest>,
) -> AppResult<impl IntoResponse> {
    let cost = state
        .cost
        .compute_template_cost_from_clips(&request.clips)
        .await?;
    Ok(Json(DataResponse { data: cost }))
}
