use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::organization::{
    create_assignment, create_department, create_lab, get_department, get_lab, get_settings,
    lab_assignments, lab_availability, list_labs, my_assignments, update_assignment_status,
};

/// Departments, labs and lab assignments
pub fn organization_routes() -> Router<AppState> {
    Router::new()
        .route("/organization/settings", get(get_settings))
        .route("/departments", post(create_department))
        .route("/departments/{department_id}", get(get_department))
        .route("/labs", post(create_lab).get(list_labs))
        .route("/labs/{lab_id}", get(get_lab))
        .route("/labs/{lab_id}/availability", get(lab_availability))
        .route(
            "/labs/{lab_id}/assignments",
            post(create_assignment).get(lab_assignments),
        )
        .route("/assignments/me", get(my_assignments))
        .route("/assignments/{assignment_id}/status", patch(update_assignment_status))
}
