use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::config::OrganizationSettings;
use crate::db::models::common::RecordStatus;
use crate::db::models::organization::{
    AssignmentRequest, AssignmentStatus, AssignmentStatusUpdate, CreateLab, Department, Lab,
    LabAvailability, NewAssignment, NewDepartment, NewLab, ResearcherAssignment,
};
use crate::db::queries::{found, require_admin, require_staff, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::admission::{AdmissionError, Usage};
use crate::domain::workflow::apply_transition;
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

/// Organization-wide settings
#[utoipa::path(
    get,
    path = "/organization/settings",
    responses(
        (status = 200, description = "Current settings", body = OrganizationSettings)
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_settings(State(state): State<AppState>) -> ApiResponse<OrganizationSettings> {
    ApiResponse::ok("Organization settings", state.config.organization.clone())
}

/// Create a department
#[utoipa::path(
    post,
    path = "/departments",
    request_body = NewDepartment,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 403, description = "Administrators only"),
        (status = 409, description = "A department with this name exists")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_department(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewDepartment>,
) -> Result<ApiResponse<Department>, AppError> {
    require_admin(&actor, "create departments")?;
    let mut errors = FieldErrors::new();
    let name = required(&mut errors, "name", &payload.name);
    errors.into_result()?;

    let department = state
        .store
        .insert_department(NewDepartment { name, ..payload })
        .await?;
    info!(department_id = department.id, "department created");
    Ok(ApiResponse::created("Department created", department))
}

/// Get a department
#[utoipa::path(
    get,
    path = "/departments/{department_id}",
    params(
        ("department_id" = i32, Path, description = "Department ID")
    ),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_department(
    State(state): State<AppState>,
    Path(department_id): Path<i32>,
) -> Result<ApiResponse<Department>, AppError> {
    let department = found(state.store.get_department(department_id).await?, "Department")?;
    Ok(ApiResponse::ok("Department found", department))
}

/// Create a lab
#[utoipa::path(
    post,
    path = "/labs",
    request_body = CreateLab,
    responses(
        (status = 201, description = "Lab created", body = Lab),
        (status = 400, description = "Invalid lab data"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_lab(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateLab>,
) -> Result<ApiResponse<Lab>, AppError> {
    require_staff(&actor, "create labs")?;
    let capacity = payload
        .capacity
        .unwrap_or(state.config.organization.default_lab_capacity);
    let mut errors = FieldErrors::new();
    let name = required(&mut errors, "name", &payload.name);
    errors.check(capacity >= 1, "capacity", "Capacity must be at least 1");
    errors.into_result()?;

    found(state.store.get_department(payload.department_id).await?, "Department")?;
    let lab = state
        .store
        .insert_lab(NewLab {
            name,
            department_id: payload.department_id,
            description: payload.description,
            head_id: payload.head_id,
            capacity,
        })
        .await?;
    info!(lab_id = lab.id, capacity, "lab created");
    Ok(ApiResponse::created("Lab created", lab))
}

/// List labs
#[utoipa::path(
    get,
    path = "/labs",
    responses(
        (status = 200, description = "All labs", body = [Lab])
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_labs(State(state): State<AppState>) -> Result<ApiResponse<Vec<Lab>>, AppError> {
    let labs = state.store.list_labs().await?;
    Ok(ApiResponse::ok("Labs retrieved", labs))
}

/// Get a lab
#[utoipa::path(
    get,
    path = "/labs/{lab_id}",
    params(
        ("lab_id" = i32, Path, description = "Lab ID")
    ),
    responses(
        (status = 200, description = "Lab found", body = Lab),
        (status = 404, description = "Lab not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_lab(
    State(state): State<AppState>,
    Path(lab_id): Path<i32>,
) -> Result<ApiResponse<Lab>, AppError> {
    let lab = found(state.store.get_lab(lab_id).await?, "Lab")?;
    Ok(ApiResponse::ok("Lab found", lab))
}

/// Current occupancy of a lab
#[utoipa::path(
    get,
    path = "/labs/{lab_id}/availability",
    params(
        ("lab_id" = i32, Path, description = "Lab ID")
    ),
    responses(
        (status = 200, description = "Lab availability", body = LabAvailability),
        (status = 404, description = "Lab not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn lab_availability(
    State(state): State<AppState>,
    Path(lab_id): Path<i32>,
) -> Result<ApiResponse<LabAvailability>, AppError> {
    let lab = found(state.store.get_lab(lab_id).await?, "Lab")?;
    let usage = Usage {
        capacity: lab.capacity,
        current: state.store.lab_usage(lab_id).await?,
    };
    Ok(ApiResponse::ok(
        "Lab availability",
        LabAvailability {
            lab_id,
            status: lab.status,
            capacity: lab.capacity,
            current_researchers: usage.current,
            available_spots: usage.available_spots(),
            is_at_capacity: usage.is_at_capacity(),
        },
    ))
}

/// Join a lab, or assign a researcher to it
///
/// Without `researcher_id` the caller joins. Naming another researcher is a
/// moderator/admin action.
#[utoipa::path(
    post,
    path = "/labs/{lab_id}/assignments",
    params(
        ("lab_id" = i32, Path, description = "Lab ID")
    ),
    request_body = AssignmentRequest,
    responses(
        (status = 201, description = "Assignment created", body = ResearcherAssignment),
        (status = 400, description = "Invalid dates, or rejected with RESOURCE_INACTIVE, DUPLICATE or AT_CAPACITY"),
        (status = 403, description = "Rejected with NOT_APPROVED, or assigning others without staff role"),
        (status = 404, description = "Lab or researcher not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(lab_id): Path<i32>,
    Json(payload): Json<AssignmentRequest>,
) -> Result<ApiResponse<ResearcherAssignment>, AppError> {
    let today = Utc::now().date_naive();
    let start_date = payload.start_date.unwrap_or(today);
    let mut errors = FieldErrors::new();
    if let Some(end_date) = payload.end_date {
        errors.check(end_date > start_date, "end_date", "End date must be after start date");
    }
    errors.into_result()?;

    let researcher_id = payload.researcher_id.unwrap_or(actor.user_id);
    let applicant = if researcher_id == actor.user_id {
        actor.clone()
    } else {
        require_staff(&actor, "assign other researchers")?;
        Actor::from(&found(state.store.get_user(researcher_id).await?, "User")?)
    };

    let new = NewAssignment {
        researcher_id,
        lab_id,
        start_date,
        end_date: payload.end_date,
        position: payload.position.unwrap_or_default(),
        assigned_by: Some(actor.user_id),
        notes: payload.notes.unwrap_or_default(),
    };
    let assignment = state
        .store
        .admit_assignment(new, &applicant, today)
        .await
        .inspect_err(|e| {
            if let AdmissionError::Rejected(reason) = e {
                warn!(lab_id, researcher_id, reason = reason.code(), "lab assignment rejected");
            }
        })?;

    info!(assignment_id = assignment.id, lab_id, researcher_id, "researcher assigned to lab");
    Ok(ApiResponse::created("Researcher assigned to lab", assignment))
}

/// List the assignments of a lab
#[utoipa::path(
    get,
    path = "/labs/{lab_id}/assignments",
    params(
        ("lab_id" = i32, Path, description = "Lab ID")
    ),
    responses(
        (status = 200, description = "Assignments of the lab", body = [ResearcherAssignment]),
        (status = 403, description = "Staff or the lab head only"),
        (status = 404, description = "Lab not found")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn lab_assignments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(lab_id): Path<i32>,
) -> Result<ApiResponse<Vec<ResearcherAssignment>>, AppError> {
    let lab = found(state.store.get_lab(lab_id).await?, "Lab")?;
    if !actor.is_staff() && lab.head_id != Some(actor.user_id) {
        return Err(AppError::forbidden("Only staff and the lab head can list its assignments"));
    }
    let assignments = state.store.list_assignments_for_lab(lab_id).await?;
    Ok(ApiResponse::ok("Lab assignments retrieved", assignments))
}

/// List the caller's lab assignments
#[utoipa::path(
    get,
    path = "/assignments/me",
    responses(
        (status = 200, description = "Assignments of the caller", body = [ResearcherAssignment])
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn my_assignments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<Vec<ResearcherAssignment>>, AppError> {
    let assignments = state.store.list_assignments_for_researcher(actor.user_id).await?;
    Ok(ApiResponse::ok("Your assignments", assignments))
}

/// End a lab assignment
///
/// The end date defaults to today and must fall after the start date.
#[utoipa::path(
    patch,
    path = "/assignments/{assignment_id}/status",
    params(
        ("assignment_id" = i32, Path, description = "Assignment ID")
    ),
    request_body = AssignmentStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = ResearcherAssignment),
        (status = 400, description = "Illegal transition"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment changed concurrently")
    ),
    tag = "Organization",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_assignment_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(assignment_id): Path<i32>,
    Json(payload): Json<AssignmentStatusUpdate>,
) -> Result<ApiResponse<ResearcherAssignment>, AppError> {
    let mut assignment =
        found(state.store.get_assignment(assignment_id).await?, "Assignment")?;
    let from = apply_transition(&mut assignment, &actor, payload.status, Utc::now())?;
    if payload.status == AssignmentStatus::Inactive {
        if let Some(end_date) = payload.end_date {
            assignment.end_date = Some(end_date);
        }
        // Assignments that have not started need an explicit end date.
        if assignment.end_date.is_some_and(|end| end <= assignment.start_date) {
            return Err(AppError::field("end_date", "End date must be after start date"));
        }
    }

    let assignment = state.store.update_assignment(&assignment, from).await?;
    info!(assignment_id, from = %from, to = %assignment.status, "assignment status changed");
    Ok(ApiResponse::ok("Assignment status updated", assignment))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_settings,
        create_department,
        get_department,
        create_lab,
        list_labs,
        get_lab,
        lab_availability,
        create_assignment,
        lab_assignments,
        my_assignments,
        update_assignment_status
    ),
    components(schemas(
        OrganizationSettings,
        RecordStatus,
        Department,
        NewDepartment,
        Lab,
        CreateLab,
        LabAvailability,
        AssignmentStatus,
        ResearcherAssignment,
        AssignmentRequest,
        AssignmentStatusUpdate
    )),
    tags(
        (name = "Organization", description = "Departments, labs and researcher assignments")
    ),
    modifiers(&SecurityAddon)
)]
pub struct OrganizationDoc;
