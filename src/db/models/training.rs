use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::common::ContentStatus;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Course {
    pub id: i32,
    pub course_code: String,
    pub title: String,
    pub description: String,
    pub department_id: Option<i32>,
    pub instructor_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_deadline: NaiveDate,
    pub max_participants: i32,
    pub min_participants: i32,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    pub is_free: bool,
    pub status: ContentStatus,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCourse {
    pub course_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_deadline: NaiveDate,
    pub max_participants: Option<i32>,
    pub min_participants: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub price: Option<BigDecimal>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub course_code: String,
    pub title: String,
    pub description: String,
    pub department_id: Option<i32>,
    pub instructor_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_deadline: NaiveDate,
    pub max_participants: i32,
    pub min_participants: i32,
    pub price: BigDecimal,
    pub is_free: bool,
    pub is_public: bool,
}

status_enum! {
    pub enum EnrollmentStatus as "enrollment_status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
        Dropped => "dropped",
    }
}

status_enum! {
    pub enum PaymentStatus as "payment_status" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CourseEnrollment {
    pub id: i32,
    pub course_id: i32,
    pub student_id: i32,
    pub status: EnrollmentStatus,
    pub payment_status: PaymentStatus,
    #[schema(value_type = String)]
    pub payment_amount: BigDecimal,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completion_date: Option<NaiveDate>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EnrollmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub course_id: i32,
    pub student_id: i32,
    pub payment_amount: BigDecimal,
    pub notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrollmentStatusUpdate {
    pub status: EnrollmentStatus,
    pub notes: Option<String>,
}

/// A multi-week summer placement supervised by a staff member, with a fixed
/// number of trainee places.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct SummerProgram {
    pub id: i32,
    pub program_code: String,
    pub title: String,
    pub description: String,
    pub duration_weeks: i32,
    pub hours_per_week: i32,
    pub supervisor_id: i32,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub application_deadline: NaiveDate,
    pub max_trainees: i32,
    pub min_trainees: i32,
    pub is_paid: bool,
    #[schema(value_type = String)]
    pub stipend_amount: BigDecimal,
    pub status: ContentStatus,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SummerProgram {
    pub fn total_hours(&self) -> i32 {
        self.duration_weeks * self.hours_per_week
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSummerProgram {
    pub program_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: i32,
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: i32,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub application_deadline: NaiveDate,
    pub max_trainees: Option<i32>,
    pub min_trainees: Option<i32>,
    #[serde(default)]
    pub is_paid: bool,
    #[schema(value_type = Option<String>)]
    pub stipend_amount: Option<BigDecimal>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_duration_weeks() -> i32 {
    8
}

fn default_hours_per_week() -> i32 {
    40
}

#[derive(Debug, Clone)]
pub struct NewSummerProgram {
    pub program_code: String,
    pub title: String,
    pub description: String,
    pub duration_weeks: i32,
    pub hours_per_week: i32,
    pub supervisor_id: i32,
    pub department_id: Option<i32>,
    pub lab_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub application_deadline: NaiveDate,
    pub max_trainees: i32,
    pub min_trainees: i32,
    pub is_paid: bool,
    pub stipend_amount: BigDecimal,
    pub is_public: bool,
}

status_enum! {
    pub enum ApplicationStatus as "application_status" {
        Submitted => "submitted",
        UnderReview => "under_review",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
        Withdrawn => "withdrawn",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct SummerApplication {
    pub id: i32,
    pub program_id: i32,
    pub applicant_id: i32,
    pub status: ApplicationStatus,
    pub university: String,
    pub major: String,
    pub year_of_study: i32,
    #[schema(value_type = Option<String>)]
    pub gpa: Option<BigDecimal>,
    pub motivation_letter: String,
    pub relevant_experience: String,
    pub skills_and_interests: String,
    pub reviewed_by: Option<i32>,
    pub review_date: Option<DateTime<Utc>>,
    pub review_notes: String,
    pub completion_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /summer-programs/{program_id}/applications`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SummerApplicationPayload {
    pub university: String,
    pub major: String,
    pub year_of_study: i32,
    #[schema(value_type = Option<String>)]
    pub gpa: Option<BigDecimal>,
    pub motivation_letter: String,
    #[serde(default)]
    pub relevant_experience: String,
    #[serde(default)]
    pub skills_and_interests: String,
}

#[derive(Debug, Clone)]
pub struct NewSummerApplication {
    pub program_id: i32,
    pub applicant_id: i32,
    pub university: String,
    pub major: String,
    pub year_of_study: i32,
    pub gpa: Option<BigDecimal>,
    pub motivation_letter: String,
    pub relevant_experience: String,
    pub skills_and_interests: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SummerApplicationStatusUpdate {
    pub status: ApplicationStatus,
    pub review_notes: Option<String>,
}

/// Program detail with its place count.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummerProgramView {
    #[serde(flatten)]
    pub program: SummerProgram,
    pub total_hours: i32,
    pub current_trainees: i64,
    pub is_application_open: bool,
    pub is_full: bool,
}
