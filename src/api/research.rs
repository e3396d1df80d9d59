use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::research::{
    bulk_review, create_publication, get_publication, pending_publications,
    update_publication_status,
};

pub fn research_routes() -> Router<AppState> {
    Router::new()
        .route("/publications", post(create_publication))
        .route("/publications/pending", get(pending_publications))
        .route("/publications/bulk-review", post(bulk_review))
        .route("/publications/{publication_id}", get(get_publication))
        .route(
            "/publications/{publication_id}/status",
            patch(update_publication_status),
        )
}
