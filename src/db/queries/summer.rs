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
    ApplicationStatus, CreateSummerProgram, NewSummerApplication, NewSummerProgram,
    SummerApplication, SummerApplicationPayload, SummerApplicationStatusUpdate, SummerProgram,
    SummerProgramView,
};
use crate::db::queries::{can_view, found, require_staff, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::admission::{AdmissionError, CapacityResource, Usage};
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

const DEFAULT_MIN_TRAINEES: i32 = 3;
const HOURS_IN_WEEK: i32 = 168;

/// Create a summer training program
///
/// Programs start as drafts supervised by the caller.
#[utoipa::path(
    post,
    path = "/summer-programs",
    request_body = CreateSummerProgram,
    responses(
        (status = 201, description = "Program created", body = SummerProgram),
        (status = 400, description = "Invalid program data"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 404, description = "Department or lab not found"),
        (status = 409, description = "Program code already in use")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_summer_program(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateSummerProgram>,
) -> Result<ApiResponse<SummerProgram>, AppError> {
    require_staff(&actor, "create summer programs")?;
    let max_trainees = payload
        .max_trainees
        .unwrap_or(state.config.organization.default_summer_trainees);
    let min_trainees = payload
        .min_trainees
        .unwrap_or_else(|| DEFAULT_MIN_TRAINEES.min(max_trainees));
    let stipend_amount = if payload.is_paid {
        payload.stipend_amount.unwrap_or_else(|| BigDecimal::from(0))
    } else {
        BigDecimal::from(0)
    };

    let mut errors = FieldErrors::new();
    let program_code = required(&mut errors, "program_code", &payload.program_code);
    let title = required(&mut errors, "title", &payload.title);
    errors.check(
        payload.end_date > payload.start_date,
        "end_date",
        "End date must be after start date",
    );
    errors.check(
        payload.application_deadline < payload.start_date,
        "application_deadline",
        "Applications must close before the program starts",
    );
    errors.check(payload.duration_weeks >= 1, "duration_weeks", "Duration must be at least one week");
    errors.check(
        (1..=HOURS_IN_WEEK).contains(&payload.hours_per_week),
        "hours_per_week",
        "Hours per week must be between 1 and 168",
    );
    errors.check(max_trainees >= 1, "max_trainees", "Capacity must be at least 1");
    errors.check(
        (1..=max_trainees.max(1)).contains(&min_trainees),
        "min_trainees",
        "Minimum trainees must be between 1 and the capacity",
    );
    errors.check(
        stipend_amount >= BigDecimal::from(0),
        "stipend_amount",
        "Stipend cannot be negative",
    );
    errors.into_result()?;

    if let Some(department_id) = payload.department_id {
        found(state.store.get_department(department_id).await?, "Department")?;
    }
    if let Some(lab_id) = payload.lab_id {
        found(state.store.get_lab(lab_id).await?, "Lab")?;
    }

    let program = state
        .store
        .insert_summer_program(NewSummerProgram {
            program_code,
            title,
            description: payload.description,
            duration_weeks: payload.duration_weeks,
            hours_per_week: payload.hours_per_week,
            supervisor_id: actor.user_id,
            department_id: payload.department_id,
            lab_id: payload.lab_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            application_deadline: payload.application_deadline,
            max_trainees,
            min_trainees,
            is_paid: payload.is_paid,
            stipend_amount,
            is_public: payload.is_public,
        })
        .await?;
    info!(program_id = program.id, code = %program.program_code, "summer program created");
    Ok(ApiResponse::created("Summer program created", program))
}

/// Get a summer program with its place count
#[utoipa::path(
    get,
    path = "/summer-programs/{program_id}",
    params(
        ("program_id" = i32, Path, description = "Summer program ID")
    ),
    responses(
        (status = 200, description = "Program found", body = SummerProgramView),
        (status = 404, description = "Program not found")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_summer_program(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(program_id): Path<i32>,
) -> Result<ApiResponse<SummerProgramView>, AppError> {
    let program = found(state.store.get_summer_program(program_id).await?, "Summer program")?;
    if !can_view(&actor, &program, program.status == ContentStatus::Published) {
        return Err(AppError::NotFound("Summer program"));
    }
    let usage = Usage {
        capacity: program.max_trainees,
        current: state.store.summer_program_usage(program_id).await?,
    };
    Ok(ApiResponse::ok(
        "Summer program found",
        SummerProgramView {
            total_hours: program.total_hours(),
            current_trainees: usage.current,
            is_application_open: program.accepts_admissions(Utc::now().date_naive()),
            is_full: usage.is_at_capacity(),
            program,
        },
    ))
}

/// Review or publish a summer program
#[utoipa::path(
    patch,
    path = "/summer-programs/{program_id}/status",
    params(
        ("program_id" = i32, Path, description = "Summer program ID")
    ),
    request_body = ContentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = SummerProgram),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Program not found"),
        (status = 409, description = "Program changed concurrently")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_summer_program_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(program_id): Path<i32>,
    Json(payload): Json<ContentStatusUpdate>,
) -> Result<ApiResponse<SummerProgram>, AppError> {
    let mut program = found(state.store.get_summer_program(program_id).await?, "Summer program")?;
    let from = apply_transition(&mut program, &actor, payload.status, Utc::now())?;
    let program = state.store.update_summer_program(&program, from).await?;
    info!(program_id, from = %from, to = %program.status, by = actor.user_id, "summer program status changed");
    Ok(ApiResponse::ok("Summer program status updated", program))
}

/// Apply to a summer program
///
/// One application per program and applicant, whatever its outcome.
#[utoipa::path(
    post,
    path = "/summer-programs/{program_id}/applications",
    params(
        ("program_id" = i32, Path, description = "Summer program ID")
    ),
    request_body = SummerApplicationPayload,
    responses(
        (status = 201, description = "Application submitted", body = SummerApplication),
        (status = 400, description = "Invalid application, or rejected with RESOURCE_INACTIVE, DUPLICATE or AT_CAPACITY"),
        (status = 403, description = "Rejected with NOT_APPROVED"),
        (status = 404, description = "Program not found")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn apply_to_summer_program(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(program_id): Path<i32>,
    Json(payload): Json<SummerApplicationPayload>,
) -> Result<ApiResponse<SummerApplication>, AppError> {
    let mut errors = FieldErrors::new();
    let university = required(&mut errors, "university", &payload.university);
    let major = required(&mut errors, "major", &payload.major);
    let motivation_letter = required(&mut errors, "motivation_letter", &payload.motivation_letter);
    errors.check(payload.year_of_study >= 1, "year_of_study", "Year of study must be at least 1");
    if let Some(gpa) = &payload.gpa {
        errors.check(
            *gpa >= BigDecimal::from(0) && *gpa <= BigDecimal::from(4),
            "gpa",
            "GPA must be between 0 and 4",
        );
    }
    errors.into_result()?;

    let new = NewSummerApplication {
        program_id,
        applicant_id: actor.user_id,
        university,
        major,
        year_of_study: payload.year_of_study,
        gpa: payload.gpa,
        motivation_letter,
        relevant_experience: payload.relevant_experience,
        skills_and_interests: payload.skills_and_interests,
    };
    let application = state
        .store
        .admit_summer_application(new, &actor, Utc::now().date_naive())
        .await
        .inspect_err(|e| {
            if let AdmissionError::Rejected(reason) = e {
                warn!(program_id, user_id = actor.user_id, reason = reason.code(), "summer application rejected");
            }
        })?;

    info!(application_id = application.id, program_id, applicant_id = actor.user_id, "summer application submitted");
    Ok(ApiResponse::created("Application submitted", application))
}

/// Get a summer application
#[utoipa::path(
    get,
    path = "/summer-applications/{application_id}",
    params(
        ("application_id" = i32, Path, description = "Summer application ID")
    ),
    responses(
        (status = 200, description = "Application found", body = SummerApplication),
        (status = 403, description = "Not the applicant, supervisor or staff"),
        (status = 404, description = "Application not found")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_summer_application(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<i32>,
) -> Result<ApiResponse<SummerApplication>, AppError> {
    let application = found(
        state.store.get_summer_application(application_id).await?,
        "Summer application",
    )?;
    if !actor.owns_or_staff(&application) {
        let supervises = state
            .store
            .get_summer_program(application.program_id)
            .await?
            .is_some_and(|program| actor.owns(&program));
        if !supervises {
            return Err(AppError::forbidden("You cannot view this application"));
        }
    }
    Ok(ApiResponse::ok("Application found", application))
}

/// Review, complete or withdraw a summer application
#[utoipa::path(
    patch,
    path = "/summer-applications/{application_id}/status",
    params(
        ("application_id" = i32, Path, description = "Summer application ID")
    ),
    request_body = SummerApplicationStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = SummerApplication),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application changed concurrently")
    ),
    tag = "Summer training",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_summer_application_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<i32>,
    Json(payload): Json<SummerApplicationStatusUpdate>,
) -> Result<ApiResponse<SummerApplication>, AppError> {
    let mut application = found(
        state.store.get_summer_application(application_id).await?,
        "Summer application",
    )?;
    let from = apply_transition(&mut application, &actor, payload.status, Utc::now())?;
    if let Some(notes) = payload.review_notes {
        application.review_notes = notes;
    }
    let application = state.store.update_summer_application(&application, from).await?;
    info!(application_id, from = %from, to = %application.status, by = actor.user_id, "summer application status changed");
    Ok(ApiResponse::ok("Application status updated", application))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_summer_program,
        get_summer_program,
        update_summer_program_status,
        apply_to_summer_program,
        get_summer_application,
        update_summer_application_status
    ),
    components(schemas(
        SummerProgram,
        SummerProgramView,
        CreateSummerProgram,
        SummerApplication,
        SummerApplicationPayload,
        SummerApplicationStatusUpdate,
        ApplicationStatus,
        ContentStatusUpdate
    )),
    tags(
        (name = "Summer training", description = "Summer programs and trainee applications")
    ),
    modifiers(&SecurityAddon)
)]
pub struct SummerDoc;
