use axum::{
    extract::{Path, State},
    Extension, Json,
};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::config::BootstrapAdmin;
use crate::db::models::user::{NewUser, RegisterRequest, User, UserApprovalRequest, UserRole};
use crate::db::queries::{found, require_admin, required, SecurityAddon};
use crate::db::store::Store;
use crate::domain::actor::Actor;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

const MIN_PASSWORD_LEN: usize = 8;

fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::internal("Failed to hash password", e))
}

/// Register a new account
///
/// New accounts are unapproved researchers unless the organization
/// auto-approves registrations.
#[utoipa::path(
    post,
    path = "/accounts/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Email or username already taken")
    ),
    tag = "Accounts"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let mut errors = FieldErrors::new();
    let email = required(&mut errors, "email", &payload.email);
    errors.check(email.is_empty() || email.contains('@'), "email", "Enter a valid email address");
    let username = required(&mut errors, "username", &payload.username);
    errors.check(
        payload.password.chars().count() >= MIN_PASSWORD_LEN,
        "password",
        "Password must be at least 8 characters",
    );
    errors.into_result()?;

    let auto_approve = state.config.organization.auto_approve_registrations;
    let user = state
        .store
        .insert_user(NewUser {
            email,
            username,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            password_hash: hash_password(&payload.password)?,
            role: UserRole::Researcher,
            is_approved: auto_approve,
            institution: payload.institution.unwrap_or_default(),
            department: payload.department.unwrap_or_default(),
        })
        .await?;

    info!(user_id = user.id, auto_approve, "account registered");
    let message = if user.is_approved {
        "Registration successful"
    } else {
        "Registration successful, your account is awaiting approval"
    };
    Ok(ApiResponse::created(message, user))
}

/// Get the authenticated account
#[utoipa::path(
    get,
    path = "/accounts/me",
    responses(
        (status = 200, description = "Current account", body = User),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "Accounts",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<User>, AppError> {
    let user = found(state.store.get_user(actor.user_id).await?, "User")?;
    Ok(ApiResponse::ok("Account retrieved", user))
}

/// List accounts awaiting approval
#[utoipa::path(
    get,
    path = "/accounts/pending",
    responses(
        (status = 200, description = "Unapproved accounts", body = [User]),
        (status = 403, description = "Administrators only")
    ),
    tag = "Accounts",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn pending_accounts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<Vec<User>>, AppError> {
    require_admin(&actor, "review accounts")?;
    let users = state.store.list_pending_users().await?;
    Ok(ApiResponse::ok(format!("{} accounts awaiting approval", users.len()), users))
}

/// Approve or revoke an account
#[utoipa::path(
    post,
    path = "/accounts/{user_id}/approval",
    params(
        ("user_id" = i32, Path, description = "Account to approve or revoke")
    ),
    request_body = UserApprovalRequest,
    responses(
        (status = 200, description = "Approval updated", body = User),
        (status = 403, description = "Administrators only, and never on their own account"),
        (status = 404, description = "User not found")
    ),
    tag = "Accounts",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn set_approval(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i32>,
    Json(payload): Json<UserApprovalRequest>,
) -> Result<ApiResponse<User>, AppError> {
    require_admin(&actor, "approve accounts")?;
    if user_id == actor.user_id {
        return Err(AppError::forbidden("You cannot change the approval of your own account"));
    }

    let (approved_by, approval_date) = if payload.approved {
        (Some(actor.user_id), Some(Utc::now()))
    } else {
        (None, None)
    };
    let user = state
        .store
        .set_user_approval(user_id, payload.approved, approved_by, approval_date)
        .await?;
    state.actor_cache.invalidate(&user_id);

    info!(user_id, approved = payload.approved, by = actor.user_id, "account approval changed");
    let message = if payload.approved { "Account approved" } else { "Account approval revoked" };
    Ok(ApiResponse::ok(message, user))
}

/// Creates the configured administrator unless an account with that email exists.
pub async fn ensure_bootstrap_admin(
    store: &dyn Store,
    admin: &BootstrapAdmin,
) -> Result<(), AppError> {
    if store.find_user_by_email(&admin.email).await?.is_some() {
        return Ok(());
    }
    let username = admin.email.split('@').next().unwrap_or("admin").to_string();
    let user = store
        .insert_user(NewUser {
            email: admin.email.clone(),
            username,
            first_name: String::new(),
            last_name: String::new(),
            password_hash: hash_password(&admin.password)?,
            role: UserRole::Admin,
            is_approved: true,
            institution: String::new(),
            department: String::new(),
        })
        .await?;
    info!(user_id = user.id, email = %user.email, "bootstrap administrator created");
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(register, me, pending_accounts, set_approval),
    components(schemas(User, UserRole, RegisterRequest, UserApprovalRequest)),
    tags(
        (name = "Accounts", description = "Registration and account approval")
    ),
    modifiers(&SecurityAddon)
)]
pub struct AccountsDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let store = MemoryStore::new();
        let admin = BootstrapAdmin {
            email: "root@lab.example".to_string(),
            password: "correct horse".to_string(),
        };

        ensure_bootstrap_admin(&store, &admin).await.unwrap();
        ensure_bootstrap_admin(&store, &admin).await.unwrap();

        let user = store.find_user_by_email("ROOT@lab.example").await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Admin);
        assert!(user.is_approved);
        assert_eq!(user.username, "root");
        assert!(bcrypt::verify("correct horse", &user.password_hash).unwrap());
    }
}
