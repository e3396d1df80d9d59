use axum::{
    extract::{Path, State},
    Extension, Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::common::{Priority, RecordStatus};
use crate::db::models::services::{
    CreateTechnicianAssignment, CreateTestService, NewServiceRequest, NewTechnicianAssignment,
    NewTestService, ServiceAvailability, ServiceCategory, ServiceRequest, ServiceRequestPayload,
    ServiceRequestStatus, ServiceRequestStatusUpdate, TechnicianAssignment,
    TechnicianAssignmentRequest, TechnicianRole, TechnicianWorkload, TestService,
};
use crate::db::queries::{found, require_admin, require_staff, required, SecurityAddon};
use crate::domain::actor::Actor;
use crate::domain::admission::{AdmissionError, CapacityResource, Usage};
use crate::domain::workflow::{apply_transition, WorkflowStatus};
use crate::error::{AppError, FieldErrors};
use crate::utils::api_response::ApiResponse;

fn log_rejection(request_id: i32, err: &AdmissionError) {
    if let AdmissionError::Rejected(reason) = err {
        warn!(request_id, reason = reason.code(), "service request update rejected");
    }
}

fn check_amount(errors: &mut FieldErrors, field: &str, amount: Option<&BigDecimal>) {
    if let Some(amount) = amount {
        errors.check(*amount >= BigDecimal::from(0), field, "Amount cannot be negative");
    }
}

/// Create a test service
#[utoipa::path(
    post,
    path = "/services",
    request_body = CreateTestService,
    responses(
        (status = 201, description = "Service created", body = TestService),
        (status = 400, description = "Invalid service data"),
        (status = 403, description = "Administrators only"),
        (status = 409, description = "Service code already in use")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateTestService>,
) -> Result<ApiResponse<TestService>, AppError> {
    require_admin(&actor, "create services")?;
    let max_concurrent_requests = payload
        .max_concurrent_requests
        .unwrap_or(state.config.organization.default_service_capacity);
    let base_price = if payload.is_free {
        BigDecimal::from(0)
    } else {
        payload.base_price.unwrap_or_else(|| BigDecimal::from(0))
    };

    let mut errors = FieldErrors::new();
    let service_code = required(&mut errors, "service_code", &payload.service_code);
    let name = required(&mut errors, "name", &payload.name);
    errors.check(
        max_concurrent_requests >= 1,
        "max_concurrent_requests",
        "Capacity must be at least 1",
    );
    check_amount(&mut errors, "base_price", Some(&base_price));
    errors.into_result()?;

    if let Some(department_id) = payload.department_id {
        found(state.store.get_department(department_id).await?, "Department")?;
    }
    if let Some(lab_id) = payload.lab_id {
        found(state.store.get_lab(lab_id).await?, "Lab")?;
    }

    let service = state
        .store
        .insert_service(NewTestService {
            service_code,
            name,
            description: payload.description,
            category: payload.category,
            department_id: payload.department_id,
            lab_id: payload.lab_id,
            base_price,
            is_free: payload.is_free,
            max_concurrent_requests,
            is_public: payload.is_public,
        })
        .await?;
    info!(service_id = service.id, code = %service.service_code, "test service created");
    Ok(ApiResponse::created("Service created", service))
}

/// Get a test service
#[utoipa::path(
    get,
    path = "/services/{service_id}",
    params(
        ("service_id" = i32, Path, description = "Service ID")
    ),
    responses(
        (status = 200, description = "Service found", body = TestService),
        (status = 404, description = "Service not found")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_service(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<ApiResponse<TestService>, AppError> {
    let service = found(state.store.get_service(service_id).await?, "Test service")?;
    Ok(ApiResponse::ok("Service found", service))
}

/// Current load of a test service
#[utoipa::path(
    get,
    path = "/services/{service_id}/availability",
    params(
        ("service_id" = i32, Path, description = "Service ID")
    ),
    responses(
        (status = 200, description = "Service availability", body = ServiceAvailability),
        (status = 404, description = "Service not found")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn service_availability(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<ApiResponse<ServiceAvailability>, AppError> {
    let service = found(state.store.get_service(service_id).await?, "Test service")?;
    let usage = Usage {
        capacity: service.max_concurrent_requests,
        current: state.store.service_usage(service_id).await?,
    };
    Ok(ApiResponse::ok(
        "Service availability",
        ServiceAvailability {
            service_id,
            status: service.status,
            max_concurrent_requests: service.max_concurrent_requests,
            current_requests: usage.current,
            availability_percentage: usage.availability_percentage(),
            is_available: service.status == RecordStatus::Active && !usage.is_at_capacity(),
        },
    ))
}

/// Request a test service
#[utoipa::path(
    post,
    path = "/services/{service_id}/requests",
    params(
        ("service_id" = i32, Path, description = "Service ID")
    ),
    request_body = ServiceRequestPayload,
    responses(
        (status = 201, description = "Request submitted", body = ServiceRequest),
        (status = 400, description = "Invalid request, or rejected with RESOURCE_INACTIVE, DUPLICATE or AT_CAPACITY"),
        (status = 403, description = "Rejected with NOT_APPROVED"),
        (status = 404, description = "Service not found")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_service_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<i32>,
    Json(payload): Json<ServiceRequestPayload>,
) -> Result<ApiResponse<ServiceRequest>, AppError> {
    let today = Utc::now().date_naive();
    let mut errors = FieldErrors::new();
    let title = required(&mut errors, "title", &payload.title);
    errors.check(payload.quantity >= 1, "quantity", "Quantity must be at least 1");
    if let Some(preferred) = payload.preferred_completion_date {
        errors.check(
            preferred >= today,
            "preferred_completion_date",
            "Preferred completion date cannot be in the past",
        );
    }
    errors.into_result()?;

    let new = NewServiceRequest {
        service_id,
        requested_by: actor.user_id,
        title,
        description: payload.description,
        quantity: payload.quantity,
        priority: payload.priority,
        urgency: payload.urgency,
        preferred_completion_date: payload.preferred_completion_date,
    };
    let request = state
        .store
        .admit_service_request(new, &actor, today)
        .await
        .inspect_err(|e| {
            if let AdmissionError::Rejected(reason) = e {
                warn!(service_id, user_id = actor.user_id, reason = reason.code(), "service request rejected");
            }
        })?;

    info!(request_id = request.id, code = %request.request_code, service_id, "service request submitted");
    Ok(ApiResponse::created("Service request submitted", request))
}

/// Get a service request
#[utoipa::path(
    get,
    path = "/service-requests/{request_id}",
    params(
        ("request_id" = i32, Path, description = "Service request ID")
    ),
    responses(
        (status = 200, description = "Service request found", body = ServiceRequest),
        (status = 403, description = "Not the requester, technician or staff"),
        (status = 404, description = "Service request not found")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_service_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<i32>,
) -> Result<ApiResponse<ServiceRequest>, AppError> {
    let request = found(state.store.get_service_request(request_id).await?, "Service request")?;
    if !actor.owns_or_staff(&request) && request.assigned_technician != Some(actor.user_id) {
        return Err(AppError::forbidden("You cannot view this service request"));
    }
    Ok(ApiResponse::ok("Service request found", request))
}

/// Move a service request through its lifecycle
///
/// `estimated_cost` is accepted when approving, `final_cost` when completing.
#[utoipa::path(
    patch,
    path = "/service-requests/{request_id}/status",
    params(
        ("request_id" = i32, Path, description = "Service request ID")
    ),
    request_body = ServiceRequestStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = ServiceRequest),
        (status = 400, description = "Illegal transition, invalid costs, or no place left for a resumed request or its technician"),
        (status = 403, description = "Caller may not make this transition"),
        (status = 404, description = "Service request not found"),
        (status = 409, description = "Service request changed concurrently")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_service_request_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ServiceRequestStatusUpdate>,
) -> Result<ApiResponse<ServiceRequest>, AppError> {
    let mut errors = FieldErrors::new();
    check_amount(&mut errors, "estimated_cost", payload.estimated_cost.as_ref());
    check_amount(&mut errors, "final_cost", payload.final_cost.as_ref());
    errors.check(
        payload.estimated_cost.is_none() || payload.status == ServiceRequestStatus::Approved,
        "estimated_cost",
        "Estimated cost can only be set when approving",
    );
    errors.check(
        payload.final_cost.is_none() || payload.status == ServiceRequestStatus::Completed,
        "final_cost",
        "Final cost can only be set when completing",
    );
    errors.into_result()?;

    let mut request = found(state.store.get_service_request(request_id).await?, "Service request")?;
    let from = apply_transition(&mut request, &actor, payload.status, Utc::now())?;
    if let Some(notes) = payload.review_notes {
        request.review_notes = notes;
    }
    if payload.estimated_cost.is_some() {
        request.estimated_cost = payload.estimated_cost;
    }
    if payload.final_cost.is_some() {
        request.final_cost = payload.final_cost;
    }

    let request = state
        .store
        .update_service_request(&request, from, Utc::now().date_naive())
        .await
        .inspect_err(|e| log_rejection(request_id, e))?;
    info!(request_id, from = %from, to = %request.status, by = actor.user_id, "service request status changed");
    Ok(ApiResponse::ok("Service request status updated", request))
}

/// Assign a technician to a service request
///
/// The technician must be on the service's roster. An approved request moves
/// to `in_progress` once a technician is assigned, which counts against the
/// technician's concurrent request limit.
#[utoipa::path(
    post,
    path = "/service-requests/{request_id}/technician",
    params(
        ("request_id" = i32, Path, description = "Service request ID")
    ),
    request_body = TechnicianAssignmentRequest,
    responses(
        (status = 200, description = "Technician assigned", body = ServiceRequest),
        (status = 400, description = "Request is closed, the user is not on the roster, or rejected with RESOURCE_INACTIVE or AT_CAPACITY"),
        (status = 403, description = "Moderators and administrators only"),
        (status = 404, description = "Service request or technician not found"),
        (status = 409, description = "Service request changed concurrently")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn assign_technician(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<i32>,
    Json(payload): Json<TechnicianAssignmentRequest>,
) -> Result<ApiResponse<ServiceRequest>, AppError> {
    require_staff(&actor, "assign technicians")?;
    let mut request = found(state.store.get_service_request(request_id).await?, "Service request")?;
    if request.status.next_states().is_empty() || request.status == ServiceRequestStatus::Completed {
        return Err(AppError::field(
            "status",
            format!("Cannot assign a technician to a {} request", request.status),
        ));
    }
    if request.assigned_technician == Some(payload.technician_id) {
        return Err(AppError::field("technician_id", "This technician is already assigned"));
    }

    let technician = found(state.store.get_user(payload.technician_id).await?, "User")?;
    if !technician.is_approved || !technician.is_staff() {
        return Err(AppError::field(
            "technician_id",
            "Technicians must be approved moderators or administrators",
        ));
    }
    if state
        .store
        .get_technician_assignment(request.service_id, technician.id)
        .await?
        .is_none()
    {
        return Err(AppError::field(
            "technician_id",
            "The technician is not on this service's roster",
        ));
    }

    let now = Utc::now();
    let from = request.status;
    request.assigned_technician = Some(technician.id);
    if from == ServiceRequestStatus::Approved {
        apply_transition(&mut request, &actor, ServiceRequestStatus::InProgress, now)?;
    }

    let request = state
        .store
        .update_service_request(&request, from, now.date_naive())
        .await
        .inspect_err(|e| log_rejection(request_id, e))?;
    info!(request_id, technician_id = technician.id, status = %request.status, "technician assigned");
    Ok(ApiResponse::ok("Technician assigned", request))
}

/// Add a technician to a service's roster
#[utoipa::path(
    post,
    path = "/services/{service_id}/technicians",
    params(
        ("service_id" = i32, Path, description = "Service ID")
    ),
    request_body = CreateTechnicianAssignment,
    responses(
        (status = 201, description = "Technician added", body = TechnicianAssignment),
        (status = 400, description = "Invalid roster entry or the user cannot act as technician"),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "Service or user not found"),
        (status = 409, description = "Technician already on this service")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn add_technician(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<i32>,
    Json(payload): Json<CreateTechnicianAssignment>,
) -> Result<ApiResponse<TechnicianAssignment>, AppError> {
    require_admin(&actor, "manage service technicians")?;
    found(state.store.get_service(service_id).await?, "Test service")?;
    let technician = found(state.store.get_user(payload.technician_id).await?, "User")?;

    let start_date = payload.start_date.unwrap_or_else(|| Utc::now().date_naive());
    let max_concurrent_requests = payload
        .max_concurrent_requests
        .unwrap_or(state.config.organization.default_technician_load);
    let mut errors = FieldErrors::new();
    errors.check(
        technician.is_approved && technician.is_staff(),
        "technician_id",
        "Technicians must be approved moderators or administrators",
    );
    errors.check(
        max_concurrent_requests >= 1,
        "max_concurrent_requests",
        "Limit must be at least 1",
    );
    if let Some(end_date) = payload.end_date {
        errors.check(end_date >= start_date, "end_date", "End date cannot precede start date");
    }
    errors.into_result()?;

    let entry = state
        .store
        .insert_technician(NewTechnicianAssignment {
            service_id,
            technician_id: technician.id,
            role: payload.role,
            start_date,
            end_date: payload.end_date,
            max_concurrent_requests,
            notes: payload.notes,
        })
        .await?;
    info!(service_id, technician_id = technician.id, role = %entry.role, "technician added to roster");
    Ok(ApiResponse::created("Technician added", entry))
}

/// Technicians of a service with their current workload
#[utoipa::path(
    get,
    path = "/services/{service_id}/technicians",
    params(
        ("service_id" = i32, Path, description = "Service ID")
    ),
    responses(
        (status = 200, description = "Service roster", body = [TechnicianWorkload]),
        (status = 404, description = "Service not found")
    ),
    tag = "Services",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_technicians(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<ApiResponse<Vec<TechnicianWorkload>>, AppError> {
    found(state.store.get_service(service_id).await?, "Test service")?;
    let today = Utc::now().date_naive();
    let mut roster = Vec::new();
    for assignment in state.store.list_technicians_for_service(service_id).await? {
        let usage = Usage {
            capacity: assignment.max_concurrent_requests,
            current: state.store.technician_load(service_id, assignment.technician_id).await?,
        };
        roster.push(TechnicianWorkload {
            is_available: assignment.accepts_admissions(today) && !usage.is_at_capacity(),
            current_requests: usage.current,
            workload_percentage: 100.0 - usage.availability_percentage(),
            assignment,
        });
    }
    Ok(ApiResponse::ok("Service technicians", roster))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_service,
        get_service,
        service_availability,
        create_service_request,
        get_service_request,
        update_service_request_status,
        assign_technician,
        add_technician,
        list_technicians
    ),
    components(schemas(
        TestService,
        CreateTestService,
        ServiceCategory,
        ServiceAvailability,
        ServiceRequest,
        ServiceRequestPayload,
        ServiceRequestStatus,
        ServiceRequestStatusUpdate,
        TechnicianAssignmentRequest,
        TechnicianAssignment,
        CreateTechnicianAssignment,
        TechnicianRole,
        TechnicianWorkload,
        Priority
    )),
    tags(
        (name = "Services", description = "Test services and service requests")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ServicesDoc;
