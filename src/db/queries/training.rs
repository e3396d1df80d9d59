use axum::{
    extract::{Path, State},
    Extension, Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::common::{ContentStatus, ContentStatusUpdate};
use crate::db::models::training::{
    Course, CourseEnrollment, CreateCourse, EnrollmentRequest, EnrollmentStatus,
    EnrollmentStatusUpdate, NewCourse, NewEnrollment, PaymentStatus,
};
use crate::db::queries::{can_view, found, require_staff, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::admission::AdmissionError;
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

const DEFAULT_MIN_PARTICIPANTS: i32 = 5;

/// Create a training course
///
/// Courses start as drafts owned by the caller, who acts as instructor.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourse,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 400, description = "Invalid course data"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 409, description = "Course code already in use")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateCourse>,
) -> Result<ApiResponse<Course>, AppError> {
    require_staff(&actor, "create courses")?;
    let max_participants = payload
        .max_participants
        .unwrap_or(state.config.organization.default_course_capacity);
    let min_participants = payload
        .min_participants
        .unwrap_or_else(|| DEFAULT_MIN_PARTICIPANTS.min(max_participants));
    let price = if payload.is_free {
        BigDecimal::from(0)
    } else {
        payload.price.unwrap_or_else(|| BigDecimal::from(0))
    };

    let mut errors = FieldErrors::new();
    let course_code = required(&mut errors, "course_code", &payload.course_code);
    let title = required(&mut errors, "title", &payload.title);
    errors.check(
        payload.end_date > payload.start_date,
        "end_date",
        "End date must be after start date",
    );
    errors.check(
        payload.registration_deadline < payload.start_date,
        "registration_deadline",
        "Registration must close before the course starts",
    );
    errors.check(max_participants >= 1, "max_participants", "Capacity must be at least 1");
    errors.check(
        (1..=max_participants.max(1)).contains(&min_participants),
        "min_participants",
        "Minimum participants must be between 1 and the capacity",
    );
    errors.check(price >= BigDecimal::from(0), "price", "Price cannot be negative");
    errors.into_result()?;

    if let Some(department_id) = payload.department_id {
        found(state.store.get_department(department_id).await?, "Department")?;
    }

    let course = state
        .store
        .insert_course(NewCourse {
            course_code,
            title,
            description: payload.description,
            department_id: payload.department_id,
            instructor_id: actor.user_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            registration_deadline: payload.registration_deadline,
            max_participants,
            min_participants,
            price,
            is_free: payload.is_free,
            is_public: payload.is_public,
        })
        .await?;
    info!(course_id = course.id, code = %course.course_code, "course created");
    Ok(ApiResponse::created("Course created", course))
}

/// Get a course
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    params(
        ("course_id" = i32, Path, description = "Course ID")
    ),
    responses(
        (status = 200, description = "Course found", body = Course),
        (status = 404, description = "Course not found")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i32>,
) -> Result<ApiResponse<Course>, AppError> {
    let course = found(state.store.get_course(course_id).await?, "Course")?;
    if !can_view(&actor, &course, course.status == ContentStatus::Published) {
        return Err(AppError::NotFound("Course"));
    }
    Ok(ApiResponse::ok("Course found", course))
}

/// Review or publish a course
#[utoipa::path(
    patch,
    path = "/courses/{course_id}/status",
    params(
        ("course_id" = i32, Path, description = "Course ID")
    ),
    request_body = ContentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Course),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Course not found"),
        (status = 409, description = "Course changed concurrently")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_course_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i32>,
    Json(payload): Json<ContentStatusUpdate>,
) -> Result<ApiResponse<Course>, AppError> {
    let mut course = found(state.store.get_course(course_id).await?, "Course")?;
    let from = apply_transition(&mut course, &actor, payload.status, Utc::now())?;
    let course = state.store.update_course(&course, from).await?;
    info!(course_id, from = %from, to = %course.status, by = actor.user_id, "course status changed");
    Ok(ApiResponse::ok("Course status updated", course))
}

/// Enroll in a course
///
/// Free courses are recorded as paid with a zero amount.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/enrollments",
    params(
        ("course_id" = i32, Path, description = "Course ID")
    ),
    request_body = EnrollmentRequest,
    responses(
        (status = 201, description = "Enrollment created", body = CourseEnrollment),
        (status = 400, description = "Rejected with RESOURCE_INACTIVE, DUPLICATE or AT_CAPACITY"),
        (status = 403, description = "Rejected with NOT_APPROVED"),
        (status = 404, description = "Course not found")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn enroll(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i32>,
    Json(payload): Json<EnrollmentRequest>,
) -> Result<ApiResponse<CourseEnrollment>, AppError> {
    let course = found(state.store.get_course(course_id).await?, "Course")?;
    let payment_amount = if course.is_free { BigDecimal::from(0) } else { course.price };

    let new = NewEnrollment {
        course_id,
        student_id: actor.user_id,
        payment_amount,
        notes: payload.notes.unwrap_or_default(),
    };
    let enrollment = state
        .store
        .admit_enrollment(new, &actor, Utc::now().date_naive())
        .await
        .inspect_err(|e| {
            if let AdmissionError::Rejected(reason) = e {
                warn!(course_id, user_id = actor.user_id, reason = reason.code(), "enrollment rejected");
            }
        })?;

    info!(enrollment_id = enrollment.id, course_id, student_id = actor.user_id, "student enrolled");
    Ok(ApiResponse::created("Enrollment submitted", enrollment))
}

/// Get an enrollment
#[utoipa::path(
    get,
    path = "/enrollments/{enrollment_id}",
    params(
        ("enrollment_id" = i32, Path, description = "Enrollment ID")
    ),
    responses(
        (status = 200, description = "Enrollment found", body = CourseEnrollment),
        (status = 403, description = "Not the student, instructor or staff"),
        (status = 404, description = "Enrollment not found")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_enrollment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(enrollment_id): Path<i32>,
) -> Result<ApiResponse<CourseEnrollment>, AppError> {
    let enrollment = found(state.store.get_enrollment(enrollment_id).await?, "Enrollment")?;
    if !actor.owns_or_staff(&enrollment) {
        let instructs = state
            .store
            .get_course(enrollment.course_id)
            .await?
            .is_some_and(|course| actor.owns(&course));
        if !instructs {
            return Err(AppError::forbidden("You cannot view this enrollment"));
        }
    }
    Ok(ApiResponse::ok("Enrollment found", enrollment))
}

/// Approve, reject, complete or drop an enrollment
#[utoipa::path(
    patch,
    path = "/enrollments/{enrollment_id}/status",
    params(
        ("enrollment_id" = i32, Path, description = "Enrollment ID")
    ),
    request_body = EnrollmentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = CourseEnrollment),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Enrollment not found"),
        (status = 409, description = "Enrollment changed concurrently")
    ),
    tag = "Training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_enrollment_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(enrollment_id): Path<i32>,
    Json(payload): Json<EnrollmentStatusUpdate>,
) -> Result<ApiResponse<CourseEnrollment>, AppError> {
    let mut enrollment = found(state.store.get_enrollment(enrollment_id).await?, "Enrollment")?;
    let from = apply_transition(&mut enrollment, &actor, payload.status, Utc::now())?;
    if let Some(notes) = payload.notes {
        enrollment.notes = notes;
    }
    let enrollment = state.store.update_enrollment(&enrollment, from).await?;
    info!(enrollment_id, from = %from, to = %enrollment.status, by = actor.user_id, "enrollment status changed");
    Ok(ApiResponse::ok("Enrollment status updated", enrollment))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_course,
        get_course,
        update_course_status,
        enroll,
        get_enrollment,
        update_enrollment_status
    ),
    components(schemas(
        Course,
        CreateCourse,
        ContentStatus,
        ContentStatusUpdate,
        CourseEnrollment,
        EnrollmentRequest,
        EnrollmentStatus,
        EnrollmentStatusUpdate,
        PaymentStatus
    )),
    tags(
        (name = "Training", description = "Courses and enrollments")
    ),
    modifiers(&SecurityAddon)
)]
pub struct TrainingDoc;
