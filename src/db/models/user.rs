use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

status_enum! {
    pub enum UserRole as "user_role" {
        Admin => "admin",
        Moderator => "moderator",
        Researcher => "researcher",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    #[schema(ignore)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_approved: bool,
    pub approved_by: Option<i32>,
    pub approval_date: Option<DateTime<Utc>>,
    pub institution: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }
}

/// Self-service registration. New accounts start as unapproved researchers.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub institution: Option<String>,
    pub department: Option<String>,
}

/// Row handed to the store once the password has been hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_approved: bool,
    pub institution: String,
    pub department: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserApprovalRequest {
    pub approved: bool,
}
