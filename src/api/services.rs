use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::services::{
    add_technician, assign_technician, create_service, create_service_request, get_service,
    get_service_request, list_technicians, service_availability, update_service_request_status,
};

pub fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/services", post(create_service))
        .route("/services/{service_id}", get(get_service))
        .route("/services/{service_id}/availability", get(service_availability))
        .route("/services/{service_id}/requests", post(create_service_request))
        .route(
            "/services/{service_id}/technicians",
            post(add_technician).get(list_technicians),
        )
        .route("/service-requests/{request_id}", get(get_service_request))
        .route(
            "/service-requests/{request_id}/status",
            patch(update_service_request_status),
        )
        .route("/service-requests/{request_id}/technician", post(assign_technician))
}
