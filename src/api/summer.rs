use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::summer::{
    apply_to_summer_program, create_summer_program, get_summer_application, get_summer_program,
    update_summer_application_status, update_summer_program_status,
};

pub fn summer_routes() -> Router<AppState> {
    Router::new()
        .route("/summer-programs", post(create_summer_program))
        .route("/summer-programs/{program_id}", get(get_summer_program))
        .route("/summer-programs/{program_id}/status", patch(update_summer_program_status))
        .route("/summer-programs/{program_id}/applications", post(apply_to_summer_program))
        .route("/summer-applications/{application_id}", get(get_summer_application))
        .route(
            "/summer-applications/{application_id}/status",
            patch(update_summer_application_status),
        )
}
