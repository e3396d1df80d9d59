use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::db::models::common::ContentStatus;
use crate::db::models::content::{
    Announcement, Comment, CommentStatus, CommentableKind, NewAnnouncement, NewComment, NewPost,
    Post,
};
use crate::db::models::organization::{
    AssignmentStatus, Department, Lab, NewAssignment, NewDepartment, NewLab, ResearcherAssignment,
};
use crate::db::models::research::{NewPublication, Publication};
use crate::db::models::services::{
    NewServiceRequest, NewTechnicianAssignment, NewTestService, ServiceRequest,
    ServiceRequestStatus, TechnicianAssignment, TestService,
};
use crate::db::models::training::{
    ApplicationStatus, Course, CourseEnrollment, EnrollmentStatus, NewCourse, NewEnrollment,
    NewSummerApplication, NewSummerProgram, SummerApplication, SummerProgram,
};
use crate::db::models::user::{NewUser, User};
use crate::domain::actor::Actor;
use crate::domain::admission::AdmissionError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A compare-and-set update found the row in a different status.
    #[error("{0} was modified concurrently")]
    Stale(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence boundary of the service.
///
/// `admit_*` methods run the admission decision and the insert as one atomic
/// step per resource. `update_*` methods write every mutable column of the row
/// but only when its stored status still equals `expected`.
///
/// `update_service_request` also re-admits whatever capacity the write newly
/// claims (see [`crate::domain::admission::claims`]) inside the same step.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Accounts
    async fn insert_user(&self, new: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_pending_users(&self) -> StoreResult<Vec<User>>;
    async fn set_user_approval(
        &self,
        id: i32,
        approved: bool,
        approved_by: Option<i32>,
        approval_date: Option<DateTime<Utc>>,
    ) -> StoreResult<User>;

    // Organization
    async fn insert_department(&self, new: NewDepartment) -> StoreResult<Department>;
    async fn get_department(&self, id: i32) -> StoreResult<Option<Department>>;
    async fn insert_lab(&self, new: NewLab) -> StoreResult<Lab>;
    async fn get_lab(&self, id: i32) -> StoreResult<Option<Lab>>;
    async fn list_labs(&self) -> StoreResult<Vec<Lab>>;
    async fn lab_usage(&self, lab_id: i32) -> StoreResult<i64>;

    async fn admit_assignment(
        &self,
        new: NewAssignment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ResearcherAssignment, AdmissionError>;
    async fn get_assignment(&self, id: i32) -> StoreResult<Option<ResearcherAssignment>>;
    async fn list_assignments_for_lab(&self, lab_id: i32) -> StoreResult<Vec<ResearcherAssignment>>;
    async fn list_assignments_for_researcher(
        &self,
        researcher_id: i32,
    ) -> StoreResult<Vec<ResearcherAssignment>>;
    async fn update_assignment(
        &self,
        assignment: &ResearcherAssignment,
        expected: AssignmentStatus,
    ) -> StoreResult<ResearcherAssignment>;

    // Services
    async fn insert_service(&self, new: NewTestService) -> StoreResult<TestService>;
    async fn get_service(&self, id: i32) -> StoreResult<Option<TestService>>;
    async fn service_usage(&self, service_id: i32) -> StoreResult<i64>;

    async fn admit_service_request(
        &self,
        new: NewServiceRequest,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError>;
    async fn get_service_request(&self, id: i32) -> StoreResult<Option<ServiceRequest>>;
    async fn update_service_request(
        &self,
        request: &ServiceRequest,
        expected: ServiceRequestStatus,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError>;

    async fn insert_technician(
        &self,
        new: NewTechnicianAssignment,
    ) -> StoreResult<TechnicianAssignment>;
    async fn get_technician_assignment(
        &self,
        service_id: i32,
        technician_id: i32,
    ) -> StoreResult<Option<TechnicianAssignment>>;
    async fn list_technicians_for_service(
        &self,
        service_id: i32,
    ) -> StoreResult<Vec<TechnicianAssignment>>;
    /// Approved and in-progress requests of `service_id` held by the technician.
    async fn technician_load(&self, service_id: i32, technician_id: i32) -> StoreResult<i64>;

    // Training
    async fn insert_course(&self, new: NewCourse) -> StoreResult<Course>;
    async fn get_course(&self, id: i32) -> StoreResult<Option<Course>>;
    async fn update_course(&self, course: &Course, expected: ContentStatus) -> StoreResult<Course>;

    async fn admit_enrollment(
        &self,
        new: NewEnrollment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<CourseEnrollment, AdmissionError>;
    async fn get_enrollment(&self, id: i32) -> StoreResult<Option<CourseEnrollment>>;
    async fn update_enrollment(
        &self,
        enrollment: &CourseEnrollment,
        expected: EnrollmentStatus,
    ) -> StoreResult<CourseEnrollment>;

    async fn insert_summer_program(&self, new: NewSummerProgram) -> StoreResult<SummerProgram>;
    async fn get_summer_program(&self, id: i32) -> StoreResult<Option<SummerProgram>>;
    async fn update_summer_program(
        &self,
        program: &SummerProgram,
        expected: ContentStatus,
    ) -> StoreResult<SummerProgram>;
    async fn summer_program_usage(&self, program_id: i32) -> StoreResult<i64>;

    async fn admit_summer_application(
        &self,
        new: NewSummerApplication,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<SummerApplication, AdmissionError>;
    async fn get_summer_application(&self, id: i32) -> StoreResult<Option<SummerApplication>>;
    async fn update_summer_application(
        &self,
        application: &SummerApplication,
        expected: ApplicationStatus,
    ) -> StoreResult<SummerApplication>;

    // Content
    async fn insert_publication(
        &self,
        new: NewPublication,
        submitted_by: i32,
    ) -> StoreResult<Publication>;
    async fn get_publication(&self, id: i32) -> StoreResult<Option<Publication>>;
    async fn list_publications_by_status(
        &self,
        status: ContentStatus,
    ) -> StoreResult<Vec<Publication>>;
    async fn update_publication(
        &self,
        publication: &Publication,
        expected: ContentStatus,
    ) -> StoreResult<Publication>;

    async fn insert_announcement(
        &self,
        new: NewAnnouncement,
        summary: String,
        author_id: i32,
    ) -> StoreResult<Announcement>;
    async fn get_announcement(&self, id: i32) -> StoreResult<Option<Announcement>>;
    async fn update_announcement(
        &self,
        announcement: &Announcement,
        expected: ContentStatus,
    ) -> StoreResult<Announcement>;

    async fn insert_post(&self, new: NewPost, author_id: i32) -> StoreResult<Post>;
    async fn get_post(&self, id: i32) -> StoreResult<Option<Post>>;
    async fn update_post(&self, post: &Post, expected: ContentStatus) -> StoreResult<Post>;

    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment>;
    async fn get_comment(&self, id: i32) -> StoreResult<Option<Comment>>;
    async fn list_comments_for_target(
        &self,
        kind: CommentableKind,
        target_id: i32,
    ) -> StoreResult<Vec<Comment>>;
    async fn update_comment(
        &self,
        comment: &Comment,
        expected: CommentStatus,
    ) -> StoreResult<Comment>;
}
