//! Postgres-backed store.
//!
//! Admissions lock the resource row with `SELECT ... FOR UPDATE` for the
//! length of the count-and-insert transaction, so concurrent admissions
//! against one resource are serialized. Status updates are conditional on the
//! status the caller read.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

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
    request_code, NewServiceRequest, NewTechnicianAssignment, NewTestService, ServiceRequest,
    ServiceRequestStatus, TechnicianAssignment, TestService,
};
use crate::db::models::training::{
    ApplicationStatus, Course, CourseEnrollment, EnrollmentStatus, NewCourse, NewEnrollment,
    NewSummerApplication, NewSummerProgram, SummerApplication, SummerProgram,
};
use crate::db::models::user::{NewUser, User};
use crate::db::store::{Store, StoreError, StoreResult};
use crate::domain::actor::Actor;
use crate::domain::admission::{self, AdmissionError, AdmissionFacts, OccupiesCapacity};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Maps unique violations to [`StoreError::Duplicate`], everything else to a database error.
fn unique(what: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash, role,
                               is_approved, approval_date, institution, department)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $7 THEN NOW() END, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .bind(new.role)
        .bind(new.is_approved)
        .bind(&new.institution)
        .bind(&new.department)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("User with this email or username"))
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_pending_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE NOT is_approved ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_user_approval(
        &self,
        id: i32,
        approved: bool,
        approved_by: Option<i32>,
        approval_date: Option<DateTime<Utc>>,
    ) -> StoreResult<User> {
        sqlx::query_as(
            r#"
            UPDATE users
            SET is_approved = $2, approved_by = $3, approval_date = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approved)
        .bind(approved_by)
        .bind(approval_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("User"))
    }

    async fn insert_department(&self, new: NewDepartment) -> StoreResult<Department> {
        sqlx::query_as(
            "INSERT INTO departments (name, description, head_id) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.head_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Department with this name"))
    }

    async fn get_department(&self, id: i32) -> StoreResult<Option<Department>> {
        Ok(sqlx::query_as("SELECT * FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_lab(&self, new: NewLab) -> StoreResult<Lab> {
        sqlx::query_as(
            r#"
            INSERT INTO labs (name, department_id, description, head_id, capacity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(new.department_id)
        .bind(&new.description)
        .bind(new.head_id)
        .bind(new.capacity)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Lab with this name in the department"))
    }

    async fn get_lab(&self, id: i32) -> StoreResult<Option<Lab>> {
        Ok(sqlx::query_as("SELECT * FROM labs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_labs(&self) -> StoreResult<Vec<Lab>> {
        Ok(sqlx::query_as("SELECT * FROM labs ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn lab_usage(&self, lab_id: i32) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM researcher_assignments WHERE lab_id = $1 AND status::text = ANY($2)",
        )
        .bind(lab_id)
        .bind(AssignmentStatus::active_like_names())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn admit_assignment(
        &self,
        new: NewAssignment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ResearcherAssignment, AdmissionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let lab: Lab = sqlx::query_as("SELECT * FROM labs WHERE id = $1 FOR UPDATE")
            .bind(new.lab_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Lab"))?;

        let active = AssignmentStatus::active_like_names();
        let current_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM researcher_assignments WHERE lab_id = $1 AND status::text = ANY($2)",
        )
        .bind(lab.id)
        .bind(&active)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM researcher_assignments
                WHERE lab_id = $1 AND researcher_id = $2 AND status::text = ANY($3)
            )
            "#,
        )
        .bind(lab.id)
        .bind(new.researcher_id)
        .bind(&active)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        admission::evaluate(&lab, applicant, today, AdmissionFacts { duplicate, current_usage })?;

        let assignment = sqlx::query_as(
            r#"
            INSERT INTO researcher_assignments
                (researcher_id, lab_id, department_id, start_date, end_date, position, assigned_by, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.researcher_id)
        .bind(lab.id)
        .bind(lab.department_id)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.position)
        .bind(new.assigned_by)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(assignment)
    }

    async fn get_assignment(&self, id: i32) -> StoreResult<Option<ResearcherAssignment>> {
        Ok(sqlx::query_as("SELECT * FROM researcher_assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_assignments_for_lab(&self, lab_id: i32) -> StoreResult<Vec<ResearcherAssignment>> {
        Ok(sqlx::query_as("SELECT * FROM researcher_assignments WHERE lab_id = $1 ORDER BY id")
            .bind(lab_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_assignments_for_researcher(
        &self,
        researcher_id: i32,
    ) -> StoreResult<Vec<ResearcherAssignment>> {
        Ok(
            sqlx::query_as("SELECT * FROM researcher_assignments WHERE researcher_id = $1 ORDER BY id")
                .bind(researcher_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn update_assignment(
        &self,
        assignment: &ResearcherAssignment,
        expected: AssignmentStatus,
    ) -> StoreResult<ResearcherAssignment> {
        sqlx::query_as(
            r#"
            UPDATE researcher_assignments
            SET status = $3, end_date = $4, position = $5, notes = $6, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(assignment.id)
        .bind(expected)
        .bind(assignment.status)
        .bind(assignment.end_date)
        .bind(&assignment.position)
        .bind(&assignment.notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Assignment"))
    }

    async fn insert_service(&self, new: NewTestService) -> StoreResult<TestService> {
        sqlx::query_as(
            r#"
            INSERT INTO test_services (service_code, name, description, category, department_id,
                                       lab_id, base_price, is_free, max_concurrent_requests, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&new.service_code)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.category)
        .bind(new.department_id)
        .bind(new.lab_id)
        .bind(&new.base_price)
        .bind(new.is_free)
        .bind(new.max_concurrent_requests)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Service with this code"))
    }

    async fn get_service(&self, id: i32) -> StoreResult<Option<TestService>> {
        Ok(sqlx::query_as("SELECT * FROM test_services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn service_usage(&self, service_id: i32) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_requests WHERE service_id = $1 AND status::text = ANY($2)",
        )
        .bind(service_id)
        .bind(ServiceRequestStatus::active_like_names())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn admit_service_request(
        &self,
        new: NewServiceRequest,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let service: TestService = sqlx::query_as("SELECT * FROM test_services WHERE id = $1 FOR UPDATE")
            .bind(new.service_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Test service"))?;

        let active = ServiceRequestStatus::active_like_names();
        let current_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_requests WHERE service_id = $1 AND status::text = ANY($2)",
        )
        .bind(service.id)
        .bind(&active)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM service_requests
                WHERE service_id = $1 AND requested_by = $2 AND status::text = ANY($3)
            )
            "#,
        )
        .bind(service.id)
        .bind(new.requested_by)
        .bind(&active)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        admission::evaluate(&service, applicant, today, AdmissionFacts { duplicate, current_usage })?;

        // The code embeds the id, so reserve it before inserting.
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('service_requests', 'id'))")
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let id = i32::try_from(id).map_err(|_| {
            StoreError::Database(sqlx::Error::Protocol(format!("service request id {id} out of range")))
        })?;

        let request = sqlx::query_as(
            r#"
            INSERT INTO service_requests (id, request_code, service_id, requested_by, title, description,
                                          quantity, priority, urgency, preferred_completion_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request_code(Utc::now().year(), id))
        .bind(service.id)
        .bind(new.requested_by)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.quantity)
        .bind(new.priority)
        .bind(new.urgency)
        .bind(new.preferred_completion_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(request)
    }

    async fn get_service_request(&self, id: i32) -> StoreResult<Option<ServiceRequest>> {
        Ok(sqlx::query_as("SELECT * FROM service_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_service_request(
        &self,
        request: &ServiceRequest,
        expected: ServiceRequestStatus,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Same lock order as admissions: service first, then the request.
        let service: TestService = sqlx::query_as("SELECT * FROM test_services WHERE id = $1 FOR UPDATE")
            .bind(request.service_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Test service"))?;
        let stored: ServiceRequest = sqlx::query_as("SELECT * FROM service_requests WHERE id = $1 FOR UPDATE")
            .bind(request.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Service request"))?;
        if stored.status != expected {
            return Err(StoreError::Stale("Service request").into());
        }

        let claims = admission::claims(&stored, request);
        if claims.service_place {
            let active = ServiceRequestStatus::active_like_names();
            let current_usage: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM service_requests WHERE service_id = $1 AND status::text = ANY($2)",
            )
            .bind(service.id)
            .bind(&active)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
            let duplicate: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM service_requests
                    WHERE service_id = $1 AND requested_by = $2 AND id <> $3 AND status::text = ANY($4)
                )
                "#,
            )
            .bind(service.id)
            .bind(stored.requested_by)
            .bind(stored.id)
            .bind(&active)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
            admission::evaluate_reclaim(&service, AdmissionFacts { duplicate, current_usage })?;
        }
        if let Some(technician_id) = claims.technician {
            let entry: TechnicianAssignment = sqlx::query_as(
                "SELECT * FROM technician_assignments WHERE service_id = $1 AND technician_id = $2 FOR UPDATE",
            )
            .bind(service.id)
            .bind(technician_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Technician assignment"))?;
            let technician: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
                .bind(technician_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::from)?
                .ok_or(StoreError::NotFound("User"))?;
            let current_usage: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM service_requests
                WHERE service_id = $1 AND assigned_technician = $2 AND status::text = ANY($3)
                "#,
            )
            .bind(service.id)
            .bind(technician_id)
            .bind(admission::workload_names())
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
            let facts = AdmissionFacts { duplicate: false, current_usage };
            admission::evaluate(&entry, &Actor::from(&technician), today, facts)?;
        }

        let updated = sqlx::query_as(
            r#"
            UPDATE service_requests
            SET status = $2, assigned_technician = $3, estimated_cost = $4, final_cost = $5,
                reviewed_by = $6, review_date = $7, review_notes = $8,
                started_at = $9, completed_at = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.assigned_technician)
        .bind(&request.estimated_cost)
        .bind(&request.final_cost)
        .bind(request.reviewed_by)
        .bind(request.review_date)
        .bind(&request.review_notes)
        .bind(request.started_at)
        .bind(request.completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(updated)
    }

    async fn insert_technician(
        &self,
        new: NewTechnicianAssignment,
    ) -> StoreResult<TechnicianAssignment> {
        sqlx::query_as(
            r#"
            INSERT INTO technician_assignments (service_id, technician_id, role, start_date, end_date,
                                                max_concurrent_requests, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.service_id)
        .bind(new.technician_id)
        .bind(new.role)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.max_concurrent_requests)
        .bind(&new.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Technician on this service"))
    }

    async fn get_technician_assignment(
        &self,
        service_id: i32,
        technician_id: i32,
    ) -> StoreResult<Option<TechnicianAssignment>> {
        Ok(sqlx::query_as(
            "SELECT * FROM technician_assignments WHERE service_id = $1 AND technician_id = $2",
        )
        .bind(service_id)
        .bind(technician_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_technicians_for_service(
        &self,
        service_id: i32,
    ) -> StoreResult<Vec<TechnicianAssignment>> {
        Ok(sqlx::query_as("SELECT * FROM technician_assignments WHERE service_id = $1 ORDER BY id")
            .bind(service_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn technician_load(&self, service_id: i32, technician_id: i32) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM service_requests
            WHERE service_id = $1 AND assigned_technician = $2 AND status::text = ANY($3)
            "#,
        )
        .bind(service_id)
        .bind(technician_id)
        .bind(admission::workload_names())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_course(&self, new: NewCourse) -> StoreResult<Course> {
        sqlx::query_as(
            r#"
            INSERT INTO courses (course_code, title, description, department_id, instructor_id,
                                 start_date, end_date, registration_deadline, max_participants,
                                 min_participants, price, is_free, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(&new.course_code)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.department_id)
        .bind(new.instructor_id)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.registration_deadline)
        .bind(new.max_participants)
        .bind(new.min_participants)
        .bind(&new.price)
        .bind(new.is_free)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Course with this code"))
    }

    async fn get_course(&self, id: i32) -> StoreResult<Option<Course>> {
        Ok(sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_course(&self, course: &Course, expected: ContentStatus) -> StoreResult<Course> {
        sqlx::query_as(
            r#"
            UPDATE courses
            SET status = $3, approved_by = $4, approved_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(course.id)
        .bind(expected)
        .bind(course.status)
        .bind(course.approved_by)
        .bind(course.approved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Course"))
    }

    async fn admit_enrollment(
        &self,
        new: NewEnrollment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<CourseEnrollment, AdmissionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let course: Course = sqlx::query_as("SELECT * FROM courses WHERE id = $1 FOR UPDATE")
            .bind(new.course_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Course"))?;

        let current_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM course_enrollments WHERE course_id = $1 AND status::text = ANY($2)",
        )
        .bind(course.id)
        .bind(EnrollmentStatus::active_like_names())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        // Any earlier enrollment counts, whatever its status.
        let duplicate: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM course_enrollments WHERE course_id = $1 AND student_id = $2)",
        )
        .bind(course.id)
        .bind(new.student_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        admission::evaluate(&course, applicant, today, AdmissionFacts { duplicate, current_usage })?;

        let enrollment = sqlx::query_as(
            r#"
            INSERT INTO course_enrollments (course_id, student_id, payment_status, payment_amount, notes)
            VALUES ($1, $2, CASE WHEN $3 = 0 THEN 'paid'::payment_status ELSE 'pending'::payment_status END, $3, $4)
            RETURNING *
            "#,
        )
        .bind(course.id)
        .bind(new.student_id)
        .bind(&new.payment_amount)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(enrollment)
    }

    async fn get_enrollment(&self, id: i32) -> StoreResult<Option<CourseEnrollment>> {
        Ok(sqlx::query_as("SELECT * FROM course_enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_enrollment(
        &self,
        enrollment: &CourseEnrollment,
        expected: EnrollmentStatus,
    ) -> StoreResult<CourseEnrollment> {
        sqlx::query_as(
            r#"
            UPDATE course_enrollments
            SET status = $3, payment_status = $4, approved_by = $5, approved_at = $6,
                completion_date = $7, notes = $8, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(expected)
        .bind(enrollment.status)
        .bind(enrollment.payment_status)
        .bind(enrollment.approved_by)
        .bind(enrollment.approved_at)
        .bind(enrollment.completion_date)
        .bind(&enrollment.notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Enrollment"))
    }

    async fn insert_summer_program(&self, new: NewSummerProgram) -> StoreResult<SummerProgram> {
        sqlx::query_as(
            r#"
            INSERT INTO summer_programs (program_code, title, description, duration_weeks, hours_per_week,
                                         supervisor_id, department_id, lab_id, start_date, end_date,
                                         application_deadline, max_trainees, min_trainees, is_paid,
                                         stipend_amount, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(&new.program_code)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.duration_weeks)
        .bind(new.hours_per_week)
        .bind(new.supervisor_id)
        .bind(new.department_id)
        .bind(new.lab_id)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.application_deadline)
        .bind(new.max_trainees)
        .bind(new.min_trainees)
        .bind(new.is_paid)
        .bind(&new.stipend_amount)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Summer program with this code"))
    }

    async fn get_summer_program(&self, id: i32) -> StoreResult<Option<SummerProgram>> {
        Ok(sqlx::query_as("SELECT * FROM summer_programs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_summer_program(
        &self,
        program: &SummerProgram,
        expected: ContentStatus,
    ) -> StoreResult<SummerProgram> {
        sqlx::query_as(
            r#"
            UPDATE summer_programs
            SET status = $3, approved_by = $4, approved_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(program.id)
        .bind(expected)
        .bind(program.status)
        .bind(program.approved_by)
        .bind(program.approved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Summer program"))
    }

    async fn summer_program_usage(&self, program_id: i32) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM summer_applications WHERE program_id = $1 AND status::text = ANY($2)",
        )
        .bind(program_id)
        .bind(ApplicationStatus::active_like_names())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn admit_summer_application(
        &self,
        new: NewSummerApplication,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<SummerApplication, AdmissionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let program: SummerProgram = sqlx::query_as("SELECT * FROM summer_programs WHERE id = $1 FOR UPDATE")
            .bind(new.program_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound("Summer program"))?;

        let current_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM summer_applications WHERE program_id = $1 AND status::text = ANY($2)",
        )
        .bind(program.id)
        .bind(ApplicationStatus::active_like_names())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        let duplicate: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM summer_applications WHERE program_id = $1 AND applicant_id = $2)",
        )
        .bind(program.id)
        .bind(new.applicant_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        admission::evaluate(&program, applicant, today, AdmissionFacts { duplicate, current_usage })?;

        let application = sqlx::query_as(
            r#"
            INSERT INTO summer_applications (program_id, applicant_id, university, major, year_of_study,
                                             gpa, motivation_letter, relevant_experience, skills_and_interests)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(program.id)
        .bind(new.applicant_id)
        .bind(&new.university)
        .bind(&new.major)
        .bind(new.year_of_study)
        .bind(&new.gpa)
        .bind(&new.motivation_letter)
        .bind(&new.relevant_experience)
        .bind(&new.skills_and_interests)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(application)
    }

    async fn get_summer_application(&self, id: i32) -> StoreResult<Option<SummerApplication>> {
        Ok(sqlx::query_as("SELECT * FROM summer_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_summer_application(
        &self,
        application: &SummerApplication,
        expected: ApplicationStatus,
    ) -> StoreResult<SummerApplication> {
        sqlx::query_as(
            r#"
            UPDATE summer_applications
            SET status = $3, reviewed_by = $4, review_date = $5, review_notes = $6,
                completion_date = $7, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(application.id)
        .bind(expected)
        .bind(application.status)
        .bind(application.reviewed_by)
        .bind(application.review_date)
        .bind(&application.review_notes)
        .bind(application.completion_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Summer application"))
    }

    async fn insert_publication(
        &self,
        new: NewPublication,
        submitted_by: i32,
    ) -> StoreResult<Publication> {
        sqlx::query_as(
            r#"
            INSERT INTO publications (title, "abstract", publication_type, journal_name, doi,
                                      publication_date, keywords, submitted_by, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.abstract_text)
        .bind(new.publication_type)
        .bind(&new.journal_name)
        .bind(&new.doi)
        .bind(new.publication_date)
        .bind(&new.keywords)
        .bind(submitted_by)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("Publication with this DOI"))
    }

    async fn get_publication(&self, id: i32) -> StoreResult<Option<Publication>> {
        Ok(sqlx::query_as("SELECT * FROM publications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_publications_by_status(
        &self,
        status: ContentStatus,
    ) -> StoreResult<Vec<Publication>> {
        Ok(sqlx::query_as("SELECT * FROM publications WHERE status = $1 ORDER BY created_at, id")
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_publication(
        &self,
        publication: &Publication,
        expected: ContentStatus,
    ) -> StoreResult<Publication> {
        sqlx::query_as(
            r#"
            UPDATE publications
            SET status = $3, approved_by = $4, approved_at = $5, review_notes = $6, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(publication.id)
        .bind(expected)
        .bind(publication.status)
        .bind(publication.approved_by)
        .bind(publication.approved_at)
        .bind(&publication.review_notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Publication"))
    }

    async fn insert_announcement(
        &self,
        new: NewAnnouncement,
        summary: String,
        author_id: i32,
    ) -> StoreResult<Announcement> {
        Ok(sqlx::query_as(
            r#"
            INSERT INTO announcements (title, content, summary, announcement_type, priority,
                                       target_audience, author_id, publish_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, NOW()), $9)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(summary)
        .bind(new.announcement_type)
        .bind(new.priority)
        .bind(new.target_audience)
        .bind(author_id)
        .bind(new.publish_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_announcement(&self, id: i32) -> StoreResult<Option<Announcement>> {
        Ok(sqlx::query_as("SELECT * FROM announcements WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_announcement(
        &self,
        announcement: &Announcement,
        expected: ContentStatus,
    ) -> StoreResult<Announcement> {
        sqlx::query_as(
            r#"
            UPDATE announcements
            SET status = $3, approved_by = $4, approved_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(announcement.id)
        .bind(expected)
        .bind(announcement.status)
        .bind(announcement.approved_by)
        .bind(announcement.approved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Announcement"))
    }

    async fn insert_post(&self, new: NewPost, author_id: i32) -> StoreResult<Post> {
        Ok(sqlx::query_as(
            "INSERT INTO posts (title, content, category, author_id) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.category)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_post(&self, id: i32) -> StoreResult<Option<Post>> {
        Ok(sqlx::query_as("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_post(&self, post: &Post, expected: ContentStatus) -> StoreResult<Post> {
        sqlx::query_as(
            r#"
            UPDATE posts
            SET status = $3, approved_by = $4, approved_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(post.id)
        .bind(expected)
        .bind(post.status)
        .bind(post.approved_by)
        .bind(post.approved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Post"))
    }

    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment> {
        Ok(sqlx::query_as(
            r#"
            INSERT INTO comments (target_kind, target_id, parent_id, content, author_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.target_kind)
        .bind(new.target_id)
        .bind(new.parent_id)
        .bind(&new.content)
        .bind(new.author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_comment(&self, id: i32) -> StoreResult<Option<Comment>> {
        Ok(sqlx::query_as("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_comments_for_target(
        &self,
        kind: CommentableKind,
        target_id: i32,
    ) -> StoreResult<Vec<Comment>> {
        Ok(sqlx::query_as(
            "SELECT * FROM comments WHERE target_kind = $1 AND target_id = $2 ORDER BY created_at, id",
        )
        .bind(kind)
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_comment(
        &self,
        comment: &Comment,
        expected: CommentStatus,
    ) -> StoreResult<Comment> {
        sqlx::query_as(
            r#"
            UPDATE comments
            SET status = $3, approved_by = $4, approved_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(comment.id)
        .bind(expected)
        .bind(comment.status)
        .bind(comment.approved_by)
        .bind(comment.approved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Stale("Comment"))
    }
}
