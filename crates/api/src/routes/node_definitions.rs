use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::node_definitions;
use crate::state::AppState;

/// Routes mounted at `/node-definitions`.
///
/// ```text
/// GET    /                        -> list
/// POST   /                        -> create
/// GET    /{id}                    -> get_by_id
/// PUT    /{id}                    -> update
/// GET    /{id}/validation-rules   -> validation_rules
/// POST   /{id}/io                 -> create_io
/// PUT    /{id}/io/{io_id}         -> update_io
/// DELETE /{id}/io/{io_id}         -> delete_io
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(node_definitions::list).post(node_definitions::create),
        )
        .route(
            "/{id}",
            get(node_definitions::get_by_id).put(node_definitions::update),
        )
        .route(
            "/{id}/validation-rules",
            get(node_definitions::validation_rules),
        )
        .route("/{id}/io", post(node_definitions::create_io))
        .route(
            "/{id}/io/{io_id}",
            put(node_definitions::update_io).delete(node_definitions::delete_io),
        )
}
