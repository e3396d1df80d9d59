use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::content::{
    Comment, CommentQuery, CommentStatus, CommentStatusUpdate, CommentableKind, CreateComment,
    NewComment, COMMENT_MAX_CHARS,
};
use crate::db::queries::{found, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::comment_target::{CommentTarget, TargetSummary};
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

/// Approved comments are public; pending ones are shown to their author, the
/// target's author and staff; rejected ones to staff only.
fn comment_visible(comment: &Comment, target: TargetSummary, actor: &Actor) -> bool {
    match comment.status {
        CommentStatus::Approved => true,
        CommentStatus::Pending => {
            actor.is_staff() || actor.owns(comment) || target.author_id == actor.user_id
        }
        CommentStatus::Rejected => actor.is_staff(),
    }
}

/// Targets the caller cannot read are reported as missing.
async fn visible_target(
    state: &AppState,
    target: CommentTarget,
    actor: &Actor,
) -> Result<TargetSummary, AppError> {
    let summary = found(target.load(state.store.as_ref(), actor).await?, "Comment target")?;
    if !summary.visible_to(actor) {
        return Err(AppError::NotFound("Comment target"));
    }
    Ok(summary)
}

/// Comment on a published post or announcement
///
/// Comments wait for moderation before they are shown to everyone.
#[utoipa::path(
    post,
    path = "/comments",
    request_body = CreateComment,
    responses(
        (status = 201, description = "Comment submitted", body = Comment),
        (status = 400, description = "Invalid comment, target not published, or reply on another target"),
        (status = 404, description = "Target or parent comment not found")
    ),
    tag = "Comments",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateComment>,
) -> Result<ApiResponse<Comment>, AppError> {
    let mut errors = FieldErrors::new();
    let content = required(&mut errors, "content", &payload.content);
    errors.check(
        content.chars().count() <= COMMENT_MAX_CHARS,
        "content",
        "Comments are limited to 1000 characters",
    );
    errors.into_result()?;

    let target = payload.target;
    let summary = visible_target(&state, target, &actor).await?;
    if !summary.accepts_comments() {
        return Err(AppError::field("target", "Only published content can be commented on"));
    }
    if let Some(parent_id) = payload.parent_id {
        let parent = found(state.store.get_comment(parent_id).await?, "Parent comment")?;
        if parent.target() != target {
            return Err(AppError::field(
                "parent_id",
                "Replies must be posted on the same content as the comment they answer",
            ));
        }
    }

    let comment = state
        .store
        .insert_comment(NewComment {
            target_kind: target.kind(),
            target_id: target.id(),
            parent_id: payload.parent_id,
            content,
            author_id: actor.user_id,
        })
        .await?;
    info!(comment_id = comment.id, kind = %target.kind(), target_id = target.id(), "comment submitted");
    Ok(ApiResponse::created("Comment submitted for moderation", comment))
}

/// List the comments of a post or announcement
#[utoipa::path(
    get,
    path = "/comments",
    params(CommentQuery),
    responses(
        (status = 200, description = "Comments visible to the caller", body = [Comment]),
        (status = 404, description = "Target not found or not visible to the caller")
    ),
    tag = "Comments",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<CommentQuery>,
) -> Result<ApiResponse<Vec<Comment>>, AppError> {
    let target = CommentTarget::new(query.kind, query.id);
    let summary = visible_target(&state, target, &actor).await?;
    let comments: Vec<Comment> = state
        .store
        .list_comments_for_target(target.kind(), target.id())
        .await?
        .into_iter()
        .filter(|comment| comment_visible(comment, summary, &actor))
        .collect();
    Ok(ApiResponse::ok(format!("{} comments", comments.len()), comments))
}

/// Moderate a comment
#[utoipa::path(
    patch,
    path = "/comments/{comment_id}/status",
    params(
        ("comment_id" = i32, Path, description = "Comment ID")
    ),
    request_body = CommentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Comment),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 404, description = "Comment not found"),
        (status = 409, description = "Comment changed concurrently")
    ),
    tag = "Comments",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_comment_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(comment_id): Path<i32>,
    Json(payload): Json<CommentStatusUpdate>,
) -> Result<ApiResponse<Comment>, AppError> {
    let mut comment = found(state.store.get_comment(comment_id).await?, "Comment")?;
    let from = apply_transition(&mut comment, &actor, payload.status, Utc::now())?;
    let comment = state.store.update_comment(&comment, from).await?;
    info!(comment_id, from = %from, to = %comment.status, by = actor.user_id, "comment moderated");
    Ok(ApiResponse::ok("Comment status updated", comment))
}

#[derive(OpenApi)]
#[openapi(
    paths(create_comment, list_comments, update_comment_status),
    components(schemas(
        Comment,
        CreateComment,
        CommentTarget,
        CommentStatus,
        CommentStatusUpdate,
        CommentableKind
    )),
    tags(
        (name = "Comments", description = "Comments on posts and announcements")
    ),
    modifiers(&SecurityAddon)
)]
pub struct CommentsDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::common::ContentStatus;
    use crate::db::models::user::UserRole;

    fn comment(author_id: i32, status: CommentStatus) -> Comment {
        let now = Utc::now();
        Comment {
            id: 1,
            target_kind: CommentableKind::Post,
            target_id: 1,
            parent_id: None,
            content: "Great turnout".to_string(),
            author_id,
            status,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn actor(user_id: i32, role: UserRole) -> Actor {
        Actor { user_id, email: format!("u{user_id}@lab.example"), role, is_approved: true }
    }

    #[test]
    fn pending_comments_are_limited_to_involved_users() {
        let target = TargetSummary { author_id: 9, status: ContentStatus::Published, live: true };
        let pending = comment(3, CommentStatus::Pending);

        assert!(comment_visible(&pending, target, &actor(3, UserRole::Researcher)));
        assert!(comment_visible(&pending, target, &actor(9, UserRole::Researcher)));
        assert!(comment_visible(&pending, target, &actor(2, UserRole::Moderator)));
        assert!(!comment_visible(&pending, target, &actor(4, UserRole::Researcher)));
    }

    #[test]
    fn rejected_comments_are_staff_only() {
        let target = TargetSummary { author_id: 9, status: ContentStatus::Published, live: true };
        let rejected = comment(3, CommentStatus::Rejected);

        assert!(!comment_visible(&rejected, target, &actor(3, UserRole::Researcher)));
        assert!(comment_visible(&rejected, target, &actor(1, UserRole::Admin)));
        assert!(comment_visible(&comment(3, CommentStatus::Approved), target, &actor(4, UserRole::Researcher)));
    }
}
