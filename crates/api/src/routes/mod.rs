pub mod cost;
pub mod health;
pub mod node_definitions;
pub mod workflows;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /workflows                                   list, create
/// /workflows/{id}                              get, update, archive
/// /workflows/{id}/auto-save                    auto-save (PUT)
/// /workflows/{id}/save                         save (POST)
/// /workflows/{id}/cost                         cost of the persisted graph
///
/// /cost/workflow                               cost of candidate nodes (POST)
/// /cost/template                               cost of a clip template (POST)
///
/// /socket-types                                list
/// /node-definitions                            list, create (admin)
/// /node-definitions/{id}                       get, update (admin)
/// /node-definitions/{id}/validation-rules      rule set
/// /node-definitions/{id}/io                    create IO (admin)
/// /node-definitions/{id}/io/{io_id}            update, delete IO (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/workflows", workflows::router())
        .nest("/cost", cost::router())
        .route(
            "/socket-types",
            get(handlers::node_definitions::list_socket_types),
        )
        .nest("/node-definitions", node_definitions::router())
}
