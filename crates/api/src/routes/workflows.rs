use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{cost, workflows};
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                 -> list
/// POST   /                 -> create
/// GET    /{id}             -> get_by_id
/// PUT    /{id}             -> update
/// DELETE /{id}             -> delete
/// PUT    /{id}/auto-save   -> auto_save
/// POST   /{id}/save        -> save
/// GET    /{id}/cost        -> workflow_cost
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workflows::list).post(workflows::create))
        .route(
            "/{id}",
            get(workflows::get_by_id)
                .put(workflows::update)
                .delete(workflows::delete),
        )
        .route("/{id}/auto-save", put(workflows::auto_save))
        .route("/{id}/save", post(workflows::save))
        .route("/{id}/cost", get(cost::workflow_cost))
}
