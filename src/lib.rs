#[macro_use]
mod macros;

pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod utils;

use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::db::queries::accounts::AccountsDoc;
use crate::db::queries::comments::CommentsDoc;
use crate::db::queries::content::ContentDoc;
use crate::db::queries::organization::OrganizationDoc;
use crate::db::queries::research::ResearchDoc;
use crate::db::queries::services::ServicesDoc;
use crate::db::queries::summer::SummerDoc;
use crate::db::queries::training::TrainingDoc;
use crate::middleware::auth::jwt_middleware;

/// OpenAPI document of every route group.
pub fn api_doc() -> utoipa::openapi::OpenApi {
    AccountsDoc::openapi()
        .merge_from(OrganizationDoc::openapi())
        .merge_from(ServicesDoc::openapi())
        .merge_from(TrainingDoc::openapi())
        .merge_from(SummerDoc::openapi())
        .merge_from(ResearchDoc::openapi())
        .merge_from(ContentDoc::openapi())
        .merge_from(CommentsDoc::openapi())
}

/// Requests running past `timeout` are answered with `408 Request Timeout`.
pub fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// The complete application: health checks, public and authenticated routes,
/// API docs, and the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let doc = api_doc();

    let public_routes = Router::new().merge(api::accounts::public_account_routes());

    let private_routes = Router::new()
        .merge(api::accounts::account_routes())
        .merge(api::organization::organization_routes())
        .merge(api::services::service_routes())
        .merge(api::training::training_routes())
        .merge(api::summer::summer_routes())
        .merge(api::research::research_routes())
        .merge(api::content::content_routes())
        .route_layer(from_fn_with_state(state.clone(), jwt_middleware));

    Router::new()
        .merge(api::health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", doc).path("/rapidoc"))
        .layer(timeout_layer(state.config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
