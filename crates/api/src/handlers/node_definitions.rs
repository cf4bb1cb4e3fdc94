//! Handlers for the node-definition catalog.
//!
//! Reads are open to any authenticated user. Mutations require the admin
//! role. IO sub-resources can only be edited while the parent is a draft.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowsmith_core::definition::{IoPatch, NewIoDefinition, NewNodeDefinition};
use flowsmith_core::types::DbId;
use flowsmith_core::versioning::{UpdateDefinitionRequest, UpdateOutcome};
use flowsmith_events::ActivityEvent;
use serde_json::json;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::query::DefinitionListParams;
use crate::response::DataResponse;
use crate::state::AppState;

const ENTITY: &str = "node_definition";

/// GET /api/v1/socket-types
pub async fn list_socket_types(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let socket_types = state.definitions.socket_types().await?;
    Ok(Json(DataResponse { data: socket_types }))
}

/// GET /api/v1/node-definitions
pub async fn list(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<DefinitionListParams>,
) -> AppResult<impl IntoResponse> {
    let definitions = state
        .definitions
        .list(params.kind, params.status, params.limit, params.offset)
        .await?;
    Ok(Json(DataResponse { data: definitions }))
}

/// POST /api/v1/node-definitions
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<NewNodeDefinition>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let created = state.definitions.create(input).await?;

    state.event_bus.publish(
        ActivityEvent::new(ENTITY, created.definition.id, "created")
            .with_actor(admin.user_id)
            .with_payload(json!({ "slug": created.definition.slug })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/node-definitions/{id}
pub async fn get_by_id(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let definition = state.definitions.get(id).await?;
    Ok(Json(DataResponse { data: definition }))
}

/// PUT /api/v1/node-definitions/{id}
///
/// Returns the updated row, or the versioned outcome when the edit changed
/// an active definition's contract.
pub async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(request): Json<UpdateDefinitionRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.definitions.update(id, request).await?;

    let event = match &outcome {
        UpdateOutcome::Updated(definition) => ActivityEvent::new(ENTITY, id, "updated")
            .with_payload(json!({ "status": definition.status })),
        UpdateOutcome::Versioned(versioned) => {
            ActivityEvent::new(ENTITY, versioned.new_definition_id, "versioned").with_payload(
                json!({
                    "previous_definition_id": id,
                    "version": versioned.version,
                }),
            )
        }
    };
    state.event_bus.publish(event.with_actor(admin.user_id));

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/v1/node-definitions/{id}/validation-rules
pub async fn validation_rules(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let rules = state.validation.get_rules(id).await?;
    Ok(Json(DataResponse {
        data: rules.as_ref().clone(),
    }))
}

/// POST /api/v1/node-definitions/{id}/io
pub async fn create_io(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<NewIoDefinition>,
) -> AppResult<impl IntoResponse> {
    let io = state.definitions.create_io(id, input).await?;

    tracing::info!(definition_id = id, io_id = io.id, name = %io.name, "IO definition created");
    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "io_created")
            .with_actor(admin.user_id)
            .with_payload(json!({ "io_id": io.id, "name": io.name })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: io })))
}

/// PUT /api/v1/node-definitions/{id}/io/{io_id}
pub async fn update_io(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path((id, io_id)): Path<(DbId, DbId)>,
    Json(patch): Json<IoPatch>,
) -> AppResult<impl IntoResponse> {
    let io = state.definitions.update_io(id, io_id, patch).await?;

    tracing::info!(definition_id = id, io_id, "IO definition updated");
    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "io_updated")
            .with_actor(admin.user_id)
            .with_payload(json!({ "io_id": io_id })),
    );

    Ok(Json(DataResponse { data: io }))
}

/// DELETE /api/v1/node-definitions/{id}/io/{io_id}
pub async fn delete_io(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path((id, io_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    state.definitions.delete_io(id, io_id).await?;

    tracing::info!(definition_id = id, io_id, "IO definition deleted");
    state.event_bus.publish(
        ActivityEvent::new(ENTITY, id, "io_deleted")
            .with_actor(admin.user_id)
            .with_payload(json!({ "io_id": io_id })),
    );

    Ok(StatusCode::NO_CONTENT)
}
