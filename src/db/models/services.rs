use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::common::{Priority, RecordStatus};

status_enum! {
    pub enum ServiceCategory as "service_category" {
        Testing => "testing",
        Consultation => "consultation",
        EquipmentAccess => "equipment_access",
        SampleAnalysis => "sample_analysis",
        Calibration => "calibration",
        Training => "training",
        ResearchSupport => "research_support",
        Other => "other",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TestService {
    pub id: i32,
    pub service_code: String,
    pub name: String,
    pub description: String,
    pub category: ServiceCategory,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    #[schema(value_type = String)]
    pub base_price: BigDecimal,
    pub is_free: bool,
    pub max_concurrent_requests: i32,
    pub status: RecordStatus,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTestService {
    pub service_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ServiceCategory,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub base_price: Option<BigDecimal>,
    #[serde(default)]
    pub is_free: bool,
    pub max_concurrent_requests: Option<i32>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct NewTestService {
    pub service_code: String,
    pub name: String,
    pub description: String,
    pub category: ServiceCategory,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    pub base_price: BigDecimal,
    pub is_free: bool,
    pub max_concurrent_requests: i32,
    pub is_public: bool,
}

status_enum! {
    pub enum ServiceRequestStatus as "service_request_status" {
        Submitted => "submitted",
        UnderReview => "under_review",
        Approved => "approved",
        InProgress => "in_progress",
        Completed => "completed",
        Delivered => "delivered",
        Cancelled => "cancelled",
        OnHold => "on_hold",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ServiceRequest {
    pub id: i32,
    pub request_code: String,
    pub service_id: i32,
    pub requested_by: i32,
    pub assigned_technician: Option<i32>,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub priority: Priority,
    pub urgency: Priority,
    pub preferred_completion_date: Option<NaiveDate>,
    pub status: ServiceRequestStatus,
    #[schema(value_type = Option<String>)]
    pub estimated_cost: Option<BigDecimal>,
    #[schema(value_type = Option<String>)]
    pub final_cost: Option<BigDecimal>,
    pub reviewed_by: Option<i32>,
    pub review_date: Option<DateTime<Utc>>,
    pub review_notes: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /services/{service_id}/requests`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ServiceRequestPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub urgency: Priority,
    pub preferred_completion_date: Option<NaiveDate>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub service_id: i32,
    pub requested_by: i32,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub priority: Priority,
    pub urgency: Priority,
    pub preferred_completion_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ServiceRequestStatusUpdate {
    pub status: ServiceRequestStatus,
    pub review_notes: Option<String>,
    #[schema(value_type = Option<String>)]
    pub estimated_cost: Option<BigDecimal>,
    #[schema(value_type = Option<String>)]
    pub final_cost: Option<BigDecimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TechnicianAssignmentRequest {
    pub technician_id: i32,
}

status_enum! {
    pub enum TechnicianRole as "technician_role" {
        Primary => "primary",
        Secondary => "secondary",
        Supervisor => "supervisor",
        Specialist => "specialist",
    }
}

impl Default for TechnicianRole {
    fn default() -> Self {
        TechnicianRole::Primary
    }
}

/// A staff member on the roster of a test service, with a cap on the
/// approved and in-progress requests they carry for it.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TechnicianAssignment {
    pub id: i32,
    pub service_id: i32,
    pub technician_id: i32,
    pub role: TechnicianRole,
    pub is_active: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub max_concurrent_requests: i32,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /services/{service_id}/technicians`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTechnicianAssignment {
    pub technician_id: i32,
    #[serde(default)]
    pub role: TechnicianRole,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_concurrent_requests: Option<i32>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewTechnicianAssignment {
    pub service_id: i32,
    pub technician_id: i32,
    pub role: TechnicianRole,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub max_concurrent_requests: i32,
    pub notes: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TechnicianWorkload {
    #[serde(flatten)]
    pub assignment: TechnicianAssignment,
    pub current_requests: i64,
    pub workload_percentage: f64,
    pub is_available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceAvailability {
    pub service_id: i32,
    pub status: RecordStatus,
    pub max_concurrent_requests: i32,
    pub current_requests: i64,
    pub availability_percentage: f64,
    pub is_available: bool,
}

/// `SR<year>-<seq>`, the sequence zero-padded to four digits.
pub fn request_code(year: i32, id: i32) -> String {
    format!("SR{year}-{id:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes_are_zero_padded() {
        assert_eq!(request_code(2024, 1), "SR2024-0001");
        assert_eq!(request_code(2025, 12345), "SR2025-12345");
    }
}
