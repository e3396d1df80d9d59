use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::training::{
    create_course, enroll, get_course, get_enrollment, update_course_status,
    update_enrollment_status,
};

pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", post(create_course))
        .route("/courses/{course_id}", get(get_course))
        .route("/courses/{course_id}/status", patch(update_course_status))
        .route("/courses/{course_id}/enrollments", post(enroll))
        .route("/enrollments/{enrollment_id}", get(get_enrollment))
        .route("/enrollments/{enrollment_id}/status", patch(update_enrollment_status))
}
