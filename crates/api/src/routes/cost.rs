use axum::routing::post;
use axum::Router;

use crate::handlers::cost;
use crate::state::AppState;

/// Routes mounted at `/cost`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflow", post(cost::candidate_cost))
        .route("/template", post(cost::template_cost))
}
