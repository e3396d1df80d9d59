use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::common::{ContentStatus, ContentStatusUpdate, Priority};
use crate::db::models::content::{
    derive_summary, Announcement, AnnouncementType, NewAnnouncement, NewPost, Post, PostCategory,
    TargetAudience,
};
use crate::db::queries::{can_view, found, require_staff, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

/// Draft an announcement
#[utoipa::path(
    post,
    path = "/announcements",
    request_body = NewAnnouncement,
    responses(
        (status = 201, description = "Announcement created", body = Announcement),
        (status = 400, description = "Invalid announcement data"),
        (status = 403, description = "Moderators and administrators only")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewAnnouncement>,
) -> Result<ApiResponse<Announcement>, AppError> {
    require_staff(&actor, "create announcements")?;
    let mut errors = FieldErrors::new();
    let title = required(&mut errors, "title", &payload.title);
    let content = required(&mut errors, "content", &payload.content);
    if let Some(expires_at) = payload.expires_at {
        let publish_at = payload.publish_at.unwrap_or_else(Utc::now);
        errors.check(expires_at > publish_at, "expires_at", "Expiry must be after publication");
    }
    errors.into_result()?;

    let summary = derive_summary(&content, payload.summary.as_deref());
    let announcement = state
        .store
        .insert_announcement(NewAnnouncement { title, content, ..payload }, summary, actor.user_id)
        .await?;
    info!(announcement_id = announcement.id, author_id = actor.user_id, "announcement created");
    Ok(ApiResponse::created("Announcement created", announcement))
}

/// Get an announcement
#[utoipa::path(
    get,
    path = "/announcements/{announcement_id}",
    params(
        ("announcement_id" = i32, Path, description = "Announcement ID")
    ),
    responses(
        (status = 200, description = "Announcement found", body = Announcement),
        (status = 404, description = "Announcement not found or not addressed to the caller")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_announcement(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(announcement_id): Path<i32>,
) -> Result<ApiResponse<Announcement>, AppError> {
    let announcement = found(state.store.get_announcement(announcement_id).await?, "Announcement")?;
    if !can_view(&actor, &announcement, announcement.is_live_for(&actor)) {
        return Err(AppError::NotFound("Announcement"));
    }
    Ok(ApiResponse::ok("Announcement found", announcement))
}

/// Submit, review or publish an announcement
#[utoipa::path(
    patch,
    path = "/announcements/{announcement_id}/status",
    params(
        ("announcement_id" = i32, Path, description = "Announcement ID")
    ),
    request_body = ContentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Announcement),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Announcement not found"),
        (status = 409, description = "Announcement changed concurrently")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_announcement_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(announcement_id): Path<i32>,
    Json(payload): Json<ContentStatusUpdate>,
) -> Result<ApiResponse<Announcement>, AppError> {
    let mut announcement =
        found(state.store.get_announcement(announcement_id).await?, "Announcement")?;
    let from = apply_transition(&mut announcement, &actor, payload.status, Utc::now())?;
    let announcement = state.store.update_announcement(&announcement, from).await?;
    info!(announcement_id, from = %from, to = %announcement.status, "announcement status changed");
    Ok(ApiResponse::ok("Announcement status updated", announcement))
}

/// Draft a post
#[utoipa::path(
    post,
    path = "/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Invalid post data")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewPost>,
) -> Result<ApiResponse<Post>, AppError> {
    let mut errors = FieldErrors::new();
    let title = required(&mut errors, "title", &payload.title);
    let content = required(&mut errors, "content", &payload.content);
    errors.into_result()?;

    let post = state
        .store
        .insert_post(NewPost { title, content, category: payload.category }, actor.user_id)
        .await?;
    info!(post_id = post.id, author_id = actor.user_id, "post created");
    Ok(ApiResponse::created("Post created", post))
}

/// Get a post
#[utoipa::path(
    get,
    path = "/posts/{post_id}",
    params(
        ("post_id" = i32, Path, description = "Post ID")
    ),
    responses(
        (status = 200, description = "Post found", body = Post),
        (status = 404, description = "Post not found")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(post_id): Path<i32>,
) -> Result<ApiResponse<Post>, AppError> {
    let post = found(state.store.get_post(post_id).await?, "Post")?;
    if !can_view(&actor, &post, post.status == ContentStatus::Published) {
        return Err(AppError::NotFound("Post"));
    }
    Ok(ApiResponse::ok("Post found", post))
}

/// Submit, review or publish a post
#[utoipa::path(
    patch,
    path = "/posts/{post_id}/status",
    params(
        ("post_id" = i32, Path, description = "Post ID")
    ),
    request_body = ContentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Post),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Post changed concurrently")
    ),
    tag = "Content",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_post_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(post_id): Path<i32>,
    Json(payload): Json<ContentStatusUpdate>,
) -> Result<ApiResponse<Post>, AppError> {
    let mut post = found(state.store.get_post(post_id).await?, "Post")?;
    let from = apply_transition(&mut post, &actor, payload.status, Utc::now())?;
    let post = state.store.update_post(&post, from).await?;
    info!(post_id, from = %from, to = %post.status, "post status changed");
    Ok(ApiResponse::ok("Post status updated", post))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_announcement,
        get_announcement,
        update_announcement_status,
        create_post,
        get_post,
        update_post_status
    ),
    components(schemas(
        Announcement,
        NewAnnouncement,
        AnnouncementType,
        TargetAudience,
        Priority,
        Post,
        NewPost,
        PostCategory,
        ContentStatus,
        ContentStatusUpdate
    )),
    tags(
        (name = "Content", description = "Announcements and posts")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ContentDoc;
