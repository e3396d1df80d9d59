use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::common::{ContentStatus, ContentStatusUpdate};
use crate::db::models::research::{
    BulkReviewAction, BulkReviewFailure, BulkReviewRequest, BulkReviewResult, NewPublication,
    Publication, PublicationType,
};
use crate::db::queries::{can_view, found, require_admin, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

/// Submit a publication record
///
/// The record starts as a draft owned by the caller.
#[utoipa::path(
    post,
    path = "/publications",
    request_body = NewPublication,
    responses(
        (status = 201, description = "Publication created", body = Publication),
        (status = 400, description = "Invalid publication data"),
        (status = 409, description = "DOI already registered")
    ),
    tag = "Research",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_publication(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewPublication>,
) -> Result<ApiResponse<Publication>, AppError> {
    let mut errors = FieldErrors::new();
    let title = required(&mut errors, "title", &payload.title);
    let doi = payload.doi.map(|doi| doi.trim().to_string()).filter(|doi| !doi.is_empty());
    errors.into_result()?;

    let publication = state
        .store
        .insert_publication(NewPublication { title, doi, ..payload }, actor.user_id)
        .await?;
    info!(publication_id = publication.id, submitted_by = actor.user_id, "publication created");
    Ok(ApiResponse::created("Publication created", publication))
}

/// Get a publication
#[utoipa::path(
    get,
    path = "/publications/{publication_id}",
    params(
        ("publication_id" = i32, Path, description = "Publication ID")
    ),
    responses(
        (status = 200, description = "Publication found", body = Publication),
        (status = 404, description = "Publication not found")
    ),
    tag = "Research",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_publication(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(publication_id): Path<i32>,
) -> Result<ApiResponse<Publication>, AppError> {
    let publication = found(state.store.get_publication(publication_id).await?, "Publication")?;
    let public = publication.is_public && publication.status == ContentStatus::Published;
    if !can_view(&actor, &publication, public) {
        return Err(AppError::NotFound("Publication"));
    }
    Ok(ApiResponse::ok("Publication found", publication))
}

/// Publications awaiting review
#[utoipa::path(
    get,
    path = "/publications/pending",
    responses(
        (status = 200, description = "Pending publications", body = [Publication]),
        (status = 403, description = "Administrators only")
    ),
    tag = "Research",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn pending_publications(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<Vec<Publication>>, AppError> {
    require_admin(&actor, "review publications")?;
    let publications = state.store.list_publications_by_status(ContentStatus::Pending).await?;
    Ok(ApiResponse::ok(
        format!("{} publications awaiting review", publications.len()),
        publications,
    ))
}

/// Submit, review or publish a publication
#[utoipa::path(
    patch,
    path = "/publications/{publication_id}/status",
    params(
        ("publication_id" = i32, Path, description = "Publication ID")
    ),
    request_body = ContentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Publication),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Publication not found"),
        (status = 409, description = "Publication changed concurrently")
    ),
    tag = "Research",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_publication_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(publication_id): Path<i32>,
    Json(payload): Json<ContentStatusUpdate>,
) -> Result<ApiResponse<Publication>, AppError> {
    let mut publication = found(state.store.get_publication(publication_id).await?, "Publication")?;
    let from = apply_transition(&mut publication, &actor, payload.status, Utc::now())?;
    if let Some(notes) = payload.review_notes {
        publication.review_notes = notes;
    }
    let publication = state.store.update_publication(&publication, from).await?;
    info!(publication_id, from = %from, to = %publication.status, by = actor.user_id, "publication status changed");
    Ok(ApiResponse::ok("Publication status updated", publication))
}

/// Approve or reject several pending publications
///
/// Each publication is reviewed on its own; a failure does not undo the
/// others.
#[utoipa::path(
    post,
    path = "/publications/bulk-review",
    request_body = BulkReviewRequest,
    responses(
        (status = 200, description = "Review applied", body = BulkReviewResult),
        (status = 400, description = "No publication ids given"),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "None of the publications is pending")
    ),
    tag = "Research",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn bulk_review(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<BulkReviewRequest>,
) -> Result<ApiResponse<BulkReviewResult>, AppError> {
    require_admin(&actor, "review publications")?;
    if payload.publication_ids.is_empty() {
        return Err(AppError::field("publication_ids", "Select at least one publication"));
    }

    let ids: BTreeSet<i32> = payload.publication_ids.iter().copied().collect();
    let mut pending = Vec::new();
    let mut result = BulkReviewResult::default();
    for id in ids {
        match state.store.get_publication(id).await? {
            Some(publication) if publication.status == ContentStatus::Pending => {
                pending.push(publication)
            }
            Some(publication) => result.failed.push(BulkReviewFailure {
                id,
                reason: format!("Publication is {}, not pending", publication.status),
            }),
            None => result.failed.push(BulkReviewFailure {
                id,
                reason: "Publication not found".to_string(),
            }),
        }
    }
    if pending.is_empty() {
        return Err(AppError::NotFound("Pending publication"));
    }

    let now = Utc::now();
    let target = payload.action.target();
    for mut publication in pending {
        let id = publication.id;
        let outcome = match apply_transition(&mut publication, &actor, target, now) {
            Ok(from) => {
                if !payload.review_notes.is_empty() {
                    publication.review_notes = payload.review_notes.clone();
                }
                state
                    .store
                    .update_publication(&publication, from)
                    .await
                    .map_err(|e| AppError::from(e).to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(_) => result.updated.push(id),
            Err(reason) => {
                warn!(publication_id = id, %reason, "bulk review skipped publication");
                result.failed.push(BulkReviewFailure { id, reason });
            }
        }
    }
    result.failed.sort_by_key(|failure| failure.id);

    info!(
        action = ?payload.action,
        updated = result.updated.len(),
        failed = result.failed.len(),
        by = actor.user_id,
        "bulk publication review"
    );
    let message = format!("{} publications updated", result.updated.len());
    Ok(ApiResponse::ok(message, result))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_publication,
        get_publication,
        pending_publications,
        update_publication_status,
        bulk_review
    ),
    components(schemas(
        Publication,
        NewPublication,
        PublicationType,
        ContentStatus,
        ContentStatusUpdate,
        BulkReviewAction,
        BulkReviewRequest,
        BulkReviewResult,
        BulkReviewFailure
    )),
    tags(
        (name = "Research", description = "Publication records and their review")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ResearchDoc;
