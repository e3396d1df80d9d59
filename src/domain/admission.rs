//! Capacity-bounded admission of dependents (assignments, service requests,
//! enrollments, applications) against the resource they occupy (labs,
//! services, technicians, courses, summer programs).
//!
//! The stores gather [`AdmissionFacts`] while holding the resource lock and
//! call [`evaluate`]; the decision itself is pure.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::models::common::{ContentStatus, RecordStatus};
use crate::db::models::organization::{AssignmentStatus, Lab};
use crate::db::models::services::{
    ServiceRequest, ServiceRequestStatus, TechnicianAssignment, TestService,
};
use crate::db::models::training::{ApplicationStatus, Course, EnrollmentStatus, SummerProgram};
use crate::db::models::user::UserRole;
use crate::db::store::StoreError;
use crate::domain::actor::Actor;

/// Why an admission was refused. Nothing is created when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    #[error("This resource is not accepting new admissions")]
    ResourceInactive,
    #[error("You are not eligible for this resource")]
    NotApproved,
    #[error("An active record already links you to this resource")]
    Duplicate,
    #[error("This resource is at capacity")]
    AtCapacity,
}

impl Rejection {
    pub fn code(self) -> &'static str {
        match self {
            Rejection::ResourceInactive => "RESOURCE_INACTIVE",
            Rejection::NotApproved => "NOT_APPROVED",
            Rejection::Duplicate => "DUPLICATE",
            Rejection::AtCapacity => "AT_CAPACITY",
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A resource with a fixed number of places.
pub trait CapacityResource {
    const KIND: &'static str;

    fn capacity(&self) -> i32;

    fn accepts_admissions(&self, today: NaiveDate) -> bool;

    /// Role and approval predicate for the applicant.
    fn admits(&self, applicant: &Actor) -> bool;
}

impl CapacityResource for Lab {
    const KIND: &'static str = "Lab";

    fn capacity(&self) -> i32 {
        self.capacity
    }

    fn accepts_admissions(&self, _today: NaiveDate) -> bool {
        self.status == RecordStatus::Active
    }

    fn admits(&self, applicant: &Actor) -> bool {
        applicant.is_approved && applicant.role == UserRole::Researcher
    }
}

impl CapacityResource for TestService {
    const KIND: &'static str = "Test service";

    fn capacity(&self) -> i32 {
        self.max_concurrent_requests
    }

    fn accepts_admissions(&self, _today: NaiveDate) -> bool {
        self.status == RecordStatus::Active
    }

    fn admits(&self, applicant: &Actor) -> bool {
        applicant.is_approved && (self.is_public || applicant.role != UserRole::Researcher)
    }
}

impl CapacityResource for TechnicianAssignment {
    const KIND: &'static str = "Technician assignment";

    fn capacity(&self) -> i32 {
        self.max_concurrent_requests
    }

    fn accepts_admissions(&self, today: NaiveDate) -> bool {
        self.is_active && self.end_date.map_or(true, |end| end >= today)
    }

    fn admits(&self, technician: &Actor) -> bool {
        technician.user_id == self.technician_id && technician.is_approved && technician.is_staff()
    }
}

impl CapacityResource for Course {
    const KIND: &'static str = "Course";

    fn capacity(&self) -> i32 {
        self.max_participants
    }

    fn accepts_admissions(&self, today: NaiveDate) -> bool {
        self.status == ContentStatus::Published && today <= self.registration_deadline
    }

    fn admits(&self, applicant: &Actor) -> bool {
        applicant.is_approved && (self.is_public || applicant.is_staff())
    }
}

impl CapacityResource for SummerProgram {
    const KIND: &'static str = "Summer program";

    fn capacity(&self) -> i32 {
        self.max_trainees
    }

    fn accepts_admissions(&self, today: NaiveDate) -> bool {
        self.status == ContentStatus::Published && today <= self.application_deadline
    }

    fn admits(&self, applicant: &Actor) -> bool {
        applicant.is_approved && (self.is_public || applicant.is_staff())
    }
}

/// Dependent statuses that hold one place on their resource.
pub trait OccupiesCapacity: Copy + PartialEq + fmt::Display + 'static {
    const ACTIVE_LIKE: &'static [Self];

    fn occupies_capacity(self) -> bool {
        Self::ACTIVE_LIKE.contains(&self)
    }

    /// Whether an existing dependent in this status makes a new request a duplicate.
    fn blocks_duplicate(self) -> bool {
        self.occupies_capacity()
    }

    fn active_like_names() -> Vec<String> {
        Self::ACTIVE_LIKE.iter().map(ToString::to_string).collect()
    }
}

impl OccupiesCapacity for AssignmentStatus {
    const ACTIVE_LIKE: &'static [Self] = &[AssignmentStatus::Active];
}

impl OccupiesCapacity for ServiceRequestStatus {
    const ACTIVE_LIKE: &'static [Self] = &[
        ServiceRequestStatus::Submitted,
        ServiceRequestStatus::UnderReview,
        ServiceRequestStatus::Approved,
        ServiceRequestStatus::InProgress,
    ];
}

impl OccupiesCapacity for EnrollmentStatus {
    const ACTIVE_LIKE: &'static [Self] = &[
        EnrollmentStatus::Pending,
        EnrollmentStatus::Approved,
        EnrollmentStatus::Completed,
    ];

    /// A student enrolls in a course at most once.
    fn blocks_duplicate(self) -> bool {
        true
    }
}

impl OccupiesCapacity for ApplicationStatus {
    const ACTIVE_LIKE: &'static [Self] = &[
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Completed,
    ];

    /// One application per program, whatever became of it.
    fn blocks_duplicate(self) -> bool {
        true
    }
}

/// Request statuses counted against the assigned technician's load.
pub const TECHNICIAN_WORKLOAD: &[ServiceRequestStatus] =
    &[ServiceRequestStatus::Approved, ServiceRequestStatus::InProgress];

pub fn counts_toward_workload(status: ServiceRequestStatus) -> bool {
    TECHNICIAN_WORKLOAD.contains(&status)
}

pub fn workload_names() -> Vec<String> {
    TECHNICIAN_WORKLOAD.iter().map(ToString::to_string).collect()
}

/// Capacity a service request write takes that the stored row did not hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Claims {
    /// The request re-enters the service's active set, e.g. resuming from `on_hold`.
    pub service_place: bool,
    /// Technician whose workload grows by this write.
    pub technician: Option<i32>,
}

pub fn claims(stored: &ServiceRequest, updated: &ServiceRequest) -> Claims {
    let service_place =
        updated.status.occupies_capacity() && !stored.status.occupies_capacity();
    let technician = updated.assigned_technician.filter(|technician| {
        counts_toward_workload(updated.status)
            && !(counts_toward_workload(stored.status)
                && stored.assigned_technician == Some(*technician))
    });
    Claims { service_place, technician }
}

/// What the store observed about the resource at decision time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionFacts {
    pub duplicate: bool,
    pub current_usage: i64,
}

pub fn evaluate<R: CapacityResource>(
    resource: &R,
    applicant: &Actor,
    today: NaiveDate,
    facts: AdmissionFacts,
) -> Result<(), Rejection> {
    if !resource.accepts_admissions(today) {
        return Err(Rejection::ResourceInactive);
    }
    if !resource.admits(applicant) {
        return Err(Rejection::NotApproved);
    }
    if facts.duplicate {
        return Err(Rejection::Duplicate);
    }
    if facts.current_usage >= i64::from(resource.capacity()) {
        return Err(Rejection::AtCapacity);
    }
    Ok(())
}

/// Re-admits an existing dependent. Eligibility was settled when it was
/// first admitted, so only duplicates and the place count are checked.
pub fn evaluate_reclaim<R: CapacityResource>(resource: &R, facts: AdmissionFacts) -> Result<(), Rejection> {
    if facts.duplicate {
        return Err(Rejection::Duplicate);
    }
    if facts.current_usage >= i64::from(resource.capacity()) {
        return Err(Rejection::AtCapacity);
    }
    Ok(())
}

/// Capacity snapshot used by the availability endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub capacity: i32,
    pub current: i64,
}

impl Usage {
    pub fn available_spots(self) -> i64 {
        (i64::from(self.capacity) - self.current).max(0)
    }

    pub fn is_at_capacity(self) -> bool {
        self.current >= i64::from(self.capacity)
    }

    pub fn availability_percentage(self) -> f64 {
        if self.capacity <= 0 {
            return 0.0;
        }
        self.available_spots() as f64 / f64::from(self.capacity) * 100.0
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::db::models::user::UserRole;
    use crate::domain::actor::Actor;

    pub fn user(user_id: i32, role: UserRole, is_approved: bool) -> Actor {
        Actor {
            user_id,
            email: format!("user{user_id}@example.org"),
            role,
            is_approved,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::fixtures::user;
    use super::*;

    fn lab(capacity: i32, status: RecordStatus) -> Lab {
        let now = Utc::now();
        Lab {
            id: 1,
            name: "Genomics".to_string(),
            department_id: 1,
            description: String::new(),
            head_id: None,
            capacity,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn checks_run_in_order() {
        let unapproved = user(3, UserRole::Researcher, false);
        let full = AdmissionFacts { duplicate: true, current_usage: 5 };

        let inactive = lab(1, RecordStatus::Inactive);
        assert_eq!(evaluate(&inactive, &unapproved, today(), full), Err(Rejection::ResourceInactive));

        let active = lab(1, RecordStatus::Active);
        assert_eq!(evaluate(&active, &unapproved, today(), full), Err(Rejection::NotApproved));

        let approved = user(4, UserRole::Researcher, true);
        assert_eq!(evaluate(&active, &approved, today(), full), Err(Rejection::Duplicate));

        let no_duplicate = AdmissionFacts { duplicate: false, ..full };
        assert_eq!(evaluate(&active, &approved, today(), no_duplicate), Err(Rejection::AtCapacity));
    }

    #[test]
    fn last_place_is_admitted() {
        let lab = lab(3, RecordStatus::Active);
        let applicant = user(4, UserRole::Researcher, true);
        let facts = |current_usage| AdmissionFacts { duplicate: false, current_usage };

        assert_eq!(evaluate(&lab, &applicant, today(), facts(2)), Ok(()));
        assert_eq!(evaluate(&lab, &applicant, today(), facts(3)), Err(Rejection::AtCapacity));
    }

    #[test]
    fn only_approved_researchers_join_labs() {
        let lab = lab(3, RecordStatus::Active);
        let moderator = user(2, UserRole::Moderator, true);
        assert_eq!(
            evaluate(&lab, &moderator, today(), AdmissionFacts::default()),
            Err(Rejection::NotApproved)
        );
    }

    #[test]
    fn private_services_refuse_researchers() {
        let now = Utc::now();
        let service = TestService {
            id: 1,
            service_code: "XRD-01".to_string(),
            name: "X-ray diffraction".to_string(),
            description: String::new(),
            category: crate::db::models::services::ServiceCategory::Testing,
            department_id: None,
            lab_id: None,
            base_price: Default::default(),
            is_free: true,
            max_concurrent_requests: 5,
            status: RecordStatus::Active,
            is_public: false,
            created_at: now,
            updated_at: now,
        };
        let researcher = user(3, UserRole::Researcher, true);
        let moderator = user(2, UserRole::Moderator, true);

        assert_eq!(
            evaluate(&service, &researcher, today(), AdmissionFacts::default()),
            Err(Rejection::NotApproved)
        );
        assert_eq!(evaluate(&service, &moderator, today(), AdmissionFacts::default()), Ok(()));
    }

    #[test]
    fn rejection_codes_serialize_in_screaming_case() {
        let json = serde_json::to_string(&Rejection::AtCapacity).unwrap();
        assert_eq!(json, "\"AT_CAPACITY\"");
        assert_eq!(Rejection::ResourceInactive.code(), "RESOURCE_INACTIVE");
    }

    #[test]
    fn usage_math() {
        let usage = Usage { capacity: 4, current: 1 };
        assert_eq!(usage.available_spots(), 3);
        assert!(!usage.is_at_capacity());
        assert_eq!(usage.availability_percentage(), 75.0);

        let over = Usage { capacity: 2, current: 3 };
        assert_eq!(over.available_spots(), 0);
        assert!(over.is_at_capacity());
    }

    #[test]
    fn enrollment_duplicates_cover_every_status() {
        assert!(EnrollmentStatus::Dropped.blocks_duplicate());
        assert!(!EnrollmentStatus::Dropped.occupies_capacity());
        assert!(!AssignmentStatus::Inactive.blocks_duplicate());
        assert!(!ServiceRequestStatus::OnHold.occupies_capacity());
        assert!(!ServiceRequestStatus::OnHold.blocks_duplicate());
    }

    fn roster_entry(max_concurrent_requests: i32) -> TechnicianAssignment {
        let now = Utc::now();
        TechnicianAssignment {
            id: 1,
            service_id: 1,
            technician_id: 2,
            role: Default::default(),
            is_active: true,
            start_date: now.date_naive(),
            end_date: None,
            max_concurrent_requests,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn technicians_take_requests_up_to_their_cap() {
        let entry = roster_entry(2);
        let technician = user(2, UserRole::Moderator, true);
        let load = |current_usage| AdmissionFacts { duplicate: false, current_usage };

        assert_eq!(evaluate(&entry, &technician, today(), load(1)), Ok(()));
        assert_eq!(evaluate(&entry, &technician, today(), load(2)), Err(Rejection::AtCapacity));

        let someone_else = user(5, UserRole::Moderator, true);
        assert_eq!(evaluate(&entry, &someone_else, today(), load(0)), Err(Rejection::NotApproved));

        let ended = TechnicianAssignment {
            end_date: Some(today() - chrono::Days::new(1)),
            ..roster_entry(2)
        };
        assert_eq!(evaluate(&ended, &technician, today(), load(0)), Err(Rejection::ResourceInactive));
    }

    fn request(status: ServiceRequestStatus, assigned_technician: Option<i32>) -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: 1,
            request_code: "SR-2026-00001".to_string(),
            service_id: 1,
            requested_by: 3,
            assigned_technician,
            title: "Samples".to_string(),
            description: String::new(),
            quantity: 1,
            priority: Default::default(),
            urgency: Default::default(),
            preferred_completion_date: None,
            status,
            estimated_cost: None,
            final_cost: None,
            reviewed_by: None,
            review_date: None,
            review_notes: String::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn resuming_and_assigning_claim_new_capacity() {
        use ServiceRequestStatus::*;

        let resumed = claims(&request(OnHold, None), &request(UnderReview, None));
        assert_eq!(resumed, Claims { service_place: true, technician: None });

        let paused = claims(&request(UnderReview, None), &request(OnHold, None));
        assert_eq!(paused, Claims::default());

        let started = claims(&request(Approved, None), &request(InProgress, Some(2)));
        assert_eq!(started, Claims { service_place: false, technician: Some(2) });

        let same_hands = claims(&request(Approved, Some(2)), &request(InProgress, Some(2)));
        assert_eq!(same_hands.technician, None);

        let reassigned = claims(&request(InProgress, Some(2)), &request(InProgress, Some(4)));
        assert_eq!(reassigned.technician, Some(4));

        let reviewing = claims(&request(Submitted, None), &request(UnderReview, Some(2)));
        assert_eq!(reviewing.technician, None);
    }
}
