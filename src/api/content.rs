use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::comments::{create_comment, list_comments, update_comment_status};
use crate::db::queries::content::{
    create_announcement, create_post, get_announcement, get_post, update_announcement_status,
    update_post_status,
};

/// Announcements, posts and their comments
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/announcements", post(create_announcement))
        .route("/announcements/{announcement_id}", get(get_announcement))
        .route(
            "/announcements/{announcement_id}/status",
            patch(update_announcement_status),
        )
        .route("/posts", post(create_post))
        .route("/posts/{post_id}", get(get_post))
        .route("/posts/{post_id}/status", patch(update_post_status))
        .route("/comments", post(create_comment).get(list_comments))
        .route("/comments/{comment_id}/status", patch(update_comment_status))
}
