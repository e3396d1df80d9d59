use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::common::RecordStatus;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Department {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub head_id: Option<i32>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDepartment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub head_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Lab {
    pub id: i32,
    pub name: String,
    pub department_id: i32,
    pub description: String,
    pub head_id: Option<i32>,
    pub capacity: i32,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLab {
    pub name: String,
    pub department_id: i32,
    #[serde(default)]
    pub description: String,
    pub head_id: Option<i32>,
    /// Falls back to the organization default when omitted.
    pub capacity: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewLab {
    pub name: String,
    pub department_id: i32,
    pub description: String,
    pub head_id: Option<i32>,
    pub capacity: i32,
}

status_enum! {
    pub enum AssignmentStatus as "assignment_status" {
        Active => "active",
        Inactive => "inactive",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ResearcherAssignment {
    pub id: i32,
    pub researcher_id: i32,
    pub lab_id: i32,
    pub department_id: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub position: String,
    pub status: AssignmentStatus,
    pub assigned_by: Option<i32>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /labs/{lab_id}/assignments`.
///
/// `researcher_id` defaults to the caller; assigning someone else is a staff action.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AssignmentRequest {
    pub researcher_id: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub researcher_id: i32,
    pub lab_id: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub position: String,
    pub assigned_by: Option<i32>,
    pub notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignmentStatusUpdate {
    pub status: AssignmentStatus,
    /// Defaults to today when ending an assignment.
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LabAvailability {
    pub lab_id: i32,
    pub status: RecordStatus,
    pub capacity: i32,
    pub current_researchers: i64,
    pub available_spots: i64,
    pub is_at_capacity: bool,
}
