use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::accounts::{me, pending_accounts, register, set_approval};

/// Routes reachable without a token
pub fn public_account_routes() -> Router<AppState> {
    Router::new().route("/accounts/register", post(register))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/me", get(me))
        .route("/accounts/pending", get(pending_accounts))
        .route("/accounts/{user_id}/approval", post(set_approval))
}
