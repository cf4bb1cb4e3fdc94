//! Handlers for workflows: CRUD plus the auto-save and save endpoints.
//!
//! All routes are owner-scoped; the services reject callers who do not own
//! the workflow.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowsmith_core::types::DbId;
use flowsmith_core::workflows::{
    CreateWorkflow, ListWorkflows, SaveRequest, SaveWorkflowRequest, UpdateWorkflow,
};
use flowsmith_events::ActivityEvent;
use serde_json::json;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAuth;
use crate::query::WorkflowListParams;
use crate::response::DataResponse;
use crate::state::AppState;

const ENTITY: &str = "workflow";

/// GET /api/v1/workflows
pub async fn list(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<WorkflowListParams>,
) -> AppResult<impl IntoResponse> {
    let workflows = state
        .workflows
        .list(
            user.user_id,
            ListWorkflows {
                status: params.status,
                limit: params.limit,
                offset: params.offset,
            },
        )
        .await?;
    Ok(Json(DataResponse { data: workflows }))
}

/// POST /api/v1/workflows
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateWorkflow>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let workflow = state.workflows.create(user.user_id, input).await?;

    state.event_bus.publish(
        ActivityEvent::new(ENTITY, workflow.id, "created")
            .with_actor(user.user_id)
            .with_payload(json!({ "name": workflow.name })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: workflow })))
}

/// GET /api/v1/workflows/{id}
///
/// The workflow header with its nodes and edges.
pub async fn get_by_id(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let graph = state.workflows.get(id, user.user_id).await?;
    Ok(Json(DataResponse { data: graph }))
}

/// PUT /api/v1/workflows/{id}
pub async fn update(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflow>,
) -> AppResult<impl IntoResponse> {
    let workflow = state.workflows.update(id, user.user_id, input).await?;

    tracing::info!(workflow_id = id, user_id = user.user_id, "Workflow updated");
    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "updated")
            .with_actor(user.user_id)
            .with_payload(json!({ "status": workflow.status })),
    );

    Ok(Json(DataResponse { data: workflow }))
}

/// DELETE /api/v1/workflows/{id}
///
/// Archives the workflow; it disappears from lists and reads.
pub async fn delete(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.workflows.delete(id, user.user_id).await?;

    state
        .event_bus
        .publish(ActivityEvent::new(ENTITY, id, "archived").with_actor(user.user_id));

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/workflows/{id}/auto-save
///
/// Replaces the graph. Rejected with 409 and the stored hash when the
/// client's `changeHash` is stale.
pub async fn auto_save(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(request): Json<SaveRequest>,
) -> AppResult<impl IntoResponse> {
    let node_count = request.nodes.len();
    let edge_count = request.edges.len();
    let outcome = state.workflows.auto_save(id, user.user_id, request).await?;

    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "auto_saved")
            .with_actor(user.user_id)
            .with_payload(json!({ "node_count": node_count, "edge_count": edge_count })),
    );

    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/workflows/{id}/save
///
/// Explicit save. Same protocol as auto-save and may also rename.
pub async fn save(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(request): Json<SaveWorkflowRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.workflows.save(id, user.user_id, request).await?;

    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "saved")
            .with_actor(user.user_id)
            .with_payload(json!({ "change_hash": outcome.change_hash })),
    );

    Ok(Json(DataResponse { data: outcome }))
}
