//! In-process store used when no `DATABASE_URL` is configured and by the tests.
//!
//! All tables live behind one async mutex, so an admission's check and insert
//! can never interleave with another admission.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::db::models::common::{ContentStatus, RecordStatus};
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
    NewSummerApplication, NewSummerProgram, PaymentStatus, SummerApplication, SummerProgram,
};
use crate::db::models::user::{NewUser, User};
use crate::db::store::{Store, StoreError, StoreResult};
use crate::domain::actor::Actor;
use crate::domain::admission::{self, AdmissionError, AdmissionFacts, OccupiesCapacity};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    departments: BTreeMap<i32, Department>,
    labs: BTreeMap<i32, Lab>,
    assignments: BTreeMap<i32, ResearcherAssignment>,
    services: BTreeMap<i32, TestService>,
    service_requests: BTreeMap<i32, ServiceRequest>,
    technicians: BTreeMap<i32, TechnicianAssignment>,
    courses: BTreeMap<i32, Course>,
    enrollments: BTreeMap<i32, CourseEnrollment>,
    summer_programs: BTreeMap<i32, SummerProgram>,
    summer_applications: BTreeMap<i32, SummerApplication>,
    publications: BTreeMap<i32, Publication>,
    announcements: BTreeMap<i32, Announcement>,
    posts: BTreeMap<i32, Post>,
    comments: BTreeMap<i32, Comment>,
}

impl Tables {
    fn lab_usage(&self, lab_id: i32) -> i64 {
        count(self.assignments.values(), |a| a.lab_id == lab_id && a.status.occupies_capacity())
    }

    fn service_usage(&self, service_id: i32) -> i64 {
        count(self.service_requests.values(), |r| {
            r.service_id == service_id && r.status.occupies_capacity()
        })
    }

    fn technician_load(&self, service_id: i32, technician_id: i32) -> i64 {
        count(self.service_requests.values(), |r| {
            r.service_id == service_id
                && r.assigned_technician == Some(technician_id)
                && admission::counts_toward_workload(r.status)
        })
    }

    /// Re-admits the capacity `updated` claims over the stored row.
    fn check_claims(
        &self,
        stored: &ServiceRequest,
        updated: &ServiceRequest,
        today: NaiveDate,
    ) -> Result<(), AdmissionError> {
        let claims = admission::claims(stored, updated);
        if claims.service_place {
            let service = self
                .services
                .get(&updated.service_id)
                .ok_or(StoreError::NotFound("Test service"))?;
            let facts = AdmissionFacts {
                duplicate: self.service_requests.values().any(|r| {
                    r.id != updated.id
                        && r.service_id == updated.service_id
                        && r.requested_by == updated.requested_by
                        && r.status.blocks_duplicate()
                }),
                current_usage: self.service_usage(updated.service_id),
            };
            admission::evaluate_reclaim(service, facts)?;
        }
        if let Some(technician_id) = claims.technician {
            let entry = self
                .technicians
                .values()
                .find(|t| t.service_id == updated.service_id && t.technician_id == technician_id)
                .ok_or(StoreError::NotFound("Technician assignment"))?;
            let technician = self.users.get(&technician_id).ok_or(StoreError::NotFound("User"))?;
            let facts = AdmissionFacts {
                duplicate: false,
                current_usage: self.technician_load(updated.service_id, technician_id),
            };
            admission::evaluate(entry, &Actor::from(technician), today, facts)?;
        }
        Ok(())
    }

    fn course_usage(&self, course_id: i32) -> i64 {
        count(self.enrollments.values(), |e| e.course_id == course_id && e.status.occupies_capacity())
    }

    fn summer_program_usage(&self, program_id: i32) -> i64 {
        count(self.summer_applications.values(), |a| {
            a.program_id == program_id && a.status.occupies_capacity()
        })
    }
}

fn count<'a, T: 'a>(rows: impl Iterator<Item = &'a T>, predicate: impl Fn(&T) -> bool) -> i64 {
    rows.filter(|row| predicate(*row)).count() as i64
}

fn next_id<T>(table: &BTreeMap<i32, T>) -> i32 {
    table.keys().next_back().map_or(1, |id| id + 1)
}

/// Replaces the stored row only while `current` still holds for it.
fn compare_and_set<T: Clone>(
    table: &mut BTreeMap<i32, T>,
    id: i32,
    kind: &'static str,
    current: impl Fn(&T) -> bool,
    row: T,
) -> StoreResult<T> {
    let slot = table.get_mut(&id).ok_or(StoreError::NotFound(kind))?;
    if !current(slot) {
        return Err(StoreError::Stale(kind));
    }
    *slot = row;
    Ok(slot.clone())
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::Duplicate("User with this email".to_string()));
        }
        if tables.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Duplicate("User with this username".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: next_id(&tables.users),
            email: new.email,
            username: new.username,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role: new.role,
            is_approved: new.is_approved,
            approved_by: None,
            approval_date: new.is_approved.then_some(now),
            institution: new.institution,
            department: new.department,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_pending_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().filter(|u| !u.is_approved).cloned().collect())
    }

    async fn set_user_approval(
        &self,
        id: i32,
        approved: bool,
        approved_by: Option<i32>,
        approval_date: Option<DateTime<Utc>>,
    ) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.is_approved = approved;
        user.approved_by = approved_by;
        user.approval_date = approval_date;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn insert_department(&self, new: NewDepartment) -> StoreResult<Department> {
        let mut tables = self.tables.lock().await;
        if tables.departments.values().any(|d| d.name == new.name) {
            return Err(StoreError::Duplicate("Department with this name".to_string()));
        }
        let now = Utc::now();
        let department = Department {
            id: next_id(&tables.departments),
            name: new.name,
            description: new.description,
            head_id: new.head_id,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn get_department(&self, id: i32) -> StoreResult<Option<Department>> {
        Ok(self.tables.lock().await.departments.get(&id).cloned())
    }

    async fn insert_lab(&self, new: NewLab) -> StoreResult<Lab> {
        let mut tables = self.tables.lock().await;
        if tables
            .labs
            .values()
            .any(|l| l.name == new.name && l.department_id == new.department_id)
        {
            return Err(StoreError::Duplicate("Lab with this name in the department".to_string()));
        }
        let now = Utc::now();
        let lab = Lab {
            id: next_id(&tables.labs),
            name: new.name,
            department_id: new.department_id,
            description: new.description,
            head_id: new.head_id,
            capacity: new.capacity,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.labs.insert(lab.id, lab.clone());
        Ok(lab)
    }

    async fn get_lab(&self, id: i32) -> StoreResult<Option<Lab>> {
        Ok(self.tables.lock().await.labs.get(&id).cloned())
    }

    async fn list_labs(&self) -> StoreResult<Vec<Lab>> {
        Ok(self.tables.lock().await.labs.values().cloned().collect())
    }

    async fn lab_usage(&self, lab_id: i32) -> StoreResult<i64> {
        Ok(self.tables.lock().await.lab_usage(lab_id))
    }

    async fn admit_assignment(
        &self,
        new: NewAssignment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ResearcherAssignment, AdmissionError> {
        let mut tables = self.tables.lock().await;
        let lab = tables.labs.get(&new.lab_id).cloned().ok_or(StoreError::NotFound("Lab"))?;
        let facts = AdmissionFacts {
            duplicate: tables.assignments.values().any(|a| {
                a.lab_id == lab.id
                    && a.researcher_id == new.researcher_id
                    && a.status.blocks_duplicate()
            }),
            current_usage: tables.lab_usage(lab.id),
        };
        admission::evaluate(&lab, applicant, today, facts)?;

        let now = Utc::now();
        let assignment = ResearcherAssignment {
            id: next_id(&tables.assignments),
            researcher_id: new.researcher_id,
            lab_id: lab.id,
            department_id: lab.department_id,
            start_date: new.start_date,
            end_date: new.end_date,
            position: new.position,
            status: AssignmentStatus::Active,
            assigned_by: new.assigned_by,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: i32) -> StoreResult<Option<ResearcherAssignment>> {
        Ok(self.tables.lock().await.assignments.get(&id).cloned())
    }

    async fn list_assignments_for_lab(&self, lab_id: i32) -> StoreResult<Vec<ResearcherAssignment>> {
        let tables = self.tables.lock().await;
        Ok(tables.assignments.values().filter(|a| a.lab_id == lab_id).cloned().collect())
    }

    async fn list_assignments_for_researcher(
        &self,
        researcher_id: i32,
    ) -> StoreResult<Vec<ResearcherAssignment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .values()
            .filter(|a| a.researcher_id == researcher_id)
            .cloned()
            .collect())
    }

    async fn update_assignment(
        &self,
        assignment: &ResearcherAssignment,
        expected: AssignmentStatus,
    ) -> StoreResult<ResearcherAssignment> {
        let mut row = assignment.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.assignments, row.id, "Assignment", |a| a.status == expected, row)
    }

    async fn insert_service(&self, new: NewTestService) -> StoreResult<TestService> {
        let mut tables = self.tables.lock().await;
        if tables.services.values().any(|s| s.service_code == new.service_code) {
            return Err(StoreError::Duplicate("Service with this code".to_string()));
        }
        let now = Utc::now();
        let service = TestService {
            id: next_id(&tables.services),
            service_code: new.service_code,
            name: new.name,
            description: new.description,
            category: new.category,
            department_id: new.department_id,
            lab_id: new.lab_id,
            base_price: new.base_price,
            is_free: new.is_free,
            max_concurrent_requests: new.max_concurrent_requests,
            status: RecordStatus::Active,
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
        };
        tables.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: i32) -> StoreResult<Option<TestService>> {
        Ok(self.tables.lock().await.services.get(&id).cloned())
    }

    async fn service_usage(&self, service_id: i32) -> StoreResult<i64> {
        Ok(self.tables.lock().await.service_usage(service_id))
    }

    async fn admit_service_request(
        &self,
        new: NewServiceRequest,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError> {
        let mut tables = self.tables.lock().await;
        let service = tables
            .services
            .get(&new.service_id)
            .cloned()
            .ok_or(StoreError::NotFound("Test service"))?;
        let facts = AdmissionFacts {
            duplicate: tables.service_requests.values().any(|r| {
                r.service_id == service.id
                    && r.requested_by == new.requested_by
                    && r.status.blocks_duplicate()
            }),
            current_usage: tables.service_usage(service.id),
        };
        admission::evaluate(&service, applicant, today, facts)?;

        let now = Utc::now();
        let id = next_id(&tables.service_requests);
        let request = ServiceRequest {
            id,
            request_code: request_code(now.year(), id),
            service_id: service.id,
            requested_by: new.requested_by,
            assigned_technician: None,
            title: new.title,
            description: new.description,
            quantity: new.quantity,
            priority: new.priority,
            urgency: new.urgency,
            preferred_completion_date: new.preferred_completion_date,
            status: ServiceRequestStatus::Submitted,
            estimated_cost: None,
            final_cost: None,
            reviewed_by: None,
            review_date: None,
            review_notes: String::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.service_requests.insert(id, request.clone());
        Ok(request)
    }

    async fn get_service_request(&self, id: i32) -> StoreResult<Option<ServiceRequest>> {
        Ok(self.tables.lock().await.service_requests.get(&id).cloned())
    }

    async fn update_service_request(
        &self,
        request: &ServiceRequest,
        expected: ServiceRequestStatus,
        today: NaiveDate,
    ) -> Result<ServiceRequest, AdmissionError> {
        let mut row = request.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        let stored = tables
            .service_requests
            .get(&row.id)
            .cloned()
            .ok_or(StoreError::NotFound("Service request"))?;
        if stored.status != expected {
            return Err(StoreError::Stale("Service request").into());
        }
        tables.check_claims(&stored, &row, today)?;
        Ok(compare_and_set(
            &mut tables.service_requests,
            row.id,
            "Service request",
            |r| r.status == expected,
            row,
        )?)
    }

    async fn insert_technician(
        &self,
        new: NewTechnicianAssignment,
    ) -> StoreResult<TechnicianAssignment> {
        let mut tables = self.tables.lock().await;
        if tables
            .technicians
            .values()
            .any(|t| t.service_id == new.service_id && t.technician_id == new.technician_id)
        {
            return Err(StoreError::Duplicate("Technician on this service".to_string()));
        }
        let now = Utc::now();
        let entry = TechnicianAssignment {
            id: next_id(&tables.technicians),
            service_id: new.service_id,
            technician_id: new.technician_id,
            role: new.role,
            is_active: true,
            start_date: new.start_date,
            end_date: new.end_date,
            max_concurrent_requests: new.max_concurrent_requests,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        tables.technicians.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_technician_assignment(
        &self,
        service_id: i32,
        technician_id: i32,
    ) -> StoreResult<Option<TechnicianAssignment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .technicians
            .values()
            .find(|t| t.service_id == service_id && t.technician_id == technician_id)
            .cloned())
    }

    async fn list_technicians_for_service(
        &self,
        service_id: i32,
    ) -> StoreResult<Vec<TechnicianAssignment>> {
        let tables = self.tables.lock().await;
        Ok(tables.technicians.values().filter(|t| t.service_id == service_id).cloned().collect())
    }

    async fn technician_load(&self, service_id: i32, technician_id: i32) -> StoreResult<i64> {
        Ok(self.tables.lock().await.technician_load(service_id, technician_id))
    }

    async fn insert_course(&self, new: NewCourse) -> StoreResult<Course> {
        let mut tables = self.tables.lock().await;
        if tables.courses.values().any(|c| c.course_code == new.course_code) {
            return Err(StoreError::Duplicate("Course with this code".to_string()));
        }
        let now = Utc::now();
        let course = Course {
            id: next_id(&tables.courses),
            course_code: new.course_code,
            title: new.title,
            description: new.description,
            department_id: new.department_id,
            instructor_id: new.instructor_id,
            start_date: new.start_date,
            end_date: new.end_date,
            registration_deadline: new.registration_deadline,
            max_participants: new.max_participants,
            min_participants: new.min_participants,
            price: new.price,
            is_free: new.is_free,
            status: ContentStatus::Draft,
            approved_by: None,
            approved_at: None,
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
        };
        tables.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: i32) -> StoreResult<Option<Course>> {
        Ok(self.tables.lock().await.courses.get(&id).cloned())
    }

    async fn update_course(&self, course: &Course, expected: ContentStatus) -> StoreResult<Course> {
        let mut row = course.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.courses, row.id, "Course", |c| c.status == expected, row)
    }

    async fn admit_enrollment(
        &self,
        new: NewEnrollment,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<CourseEnrollment, AdmissionError> {
        let mut tables = self.tables.lock().await;
        let course = tables
            .courses
            .get(&new.course_id)
            .cloned()
            .ok_or(StoreError::NotFound("Course"))?;
        let facts = AdmissionFacts {
            duplicate: tables.enrollments.values().any(|e| {
                e.course_id == course.id
                    && e.student_id == new.student_id
                    && e.status.blocks_duplicate()
            }),
            current_usage: tables.course_usage(course.id),
        };
        admission::evaluate(&course, applicant, today, facts)?;

        let now = Utc::now();
        let enrollment = CourseEnrollment {
            id: next_id(&tables.enrollments),
            course_id: course.id,
            student_id: new.student_id,
            status: EnrollmentStatus::Pending,
            payment_status: if new.payment_amount == BigDecimal::from(0) {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Pending
            },
            payment_amount: new.payment_amount,
            approved_by: None,
            approved_at: None,
            completion_date: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        tables.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn get_enrollment(&self, id: i32) -> StoreResult<Option<CourseEnrollment>> {
        Ok(self.tables.lock().await.enrollments.get(&id).cloned())
    }

    async fn update_enrollment(
        &self,
        enrollment: &CourseEnrollment,
        expected: EnrollmentStatus,
    ) -> StoreResult<CourseEnrollment> {
        let mut row = enrollment.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.enrollments, row.id, "Enrollment", |e| e.status == expected, row)
    }

    async fn insert_summer_program(&self, new: NewSummerProgram) -> StoreResult<SummerProgram> {
        let mut tables = self.tables.lock().await;
        if tables.summer_programs.values().any(|p| p.program_code == new.program_code) {
            return Err(StoreError::Duplicate("Summer program with this code".to_string()));
        }
        let now = Utc::now();
        let program = SummerProgram {
            id: next_id(&tables.summer_programs),
            program_code: new.program_code,
            title: new.title,
            description: new.description,
            duration_weeks: new.duration_weeks,
            hours_per_week: new.hours_per_week,
            supervisor_id: new.supervisor_id,
            department_id: new.department_id,
            lab_id: new.lab_id,
            start_date: new.start_date,
            end_date: new.end_date,
            application_deadline: new.application_deadline,
            max_trainees: new.max_trainees,
            min_trainees: new.min_trainees,
            is_paid: new.is_paid,
            stipend_amount: new.stipend_amount,
            status: ContentStatus::Draft,
            approved_by: None,
            approved_at: None,
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
        };
        tables.summer_programs.insert(program.id, program.clone());
        Ok(program)
    }

    async fn get_summer_program(&self, id: i32) -> StoreResult<Option<SummerProgram>> {
        Ok(self.tables.lock().await.summer_programs.get(&id).cloned())
    }

    async fn update_summer_program(
        &self,
        program: &SummerProgram,
        expected: ContentStatus,
    ) -> StoreResult<SummerProgram> {
        let mut row = program.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.summer_programs, row.id, "Summer program", |p| p.status == expected, row)
    }

    async fn summer_program_usage(&self, program_id: i32) -> StoreResult<i64> {
        Ok(self.tables.lock().await.summer_program_usage(program_id))
    }

    async fn admit_summer_application(
        &self,
        new: NewSummerApplication,
        applicant: &Actor,
        today: NaiveDate,
    ) -> Result<SummerApplication, AdmissionError> {
        let mut tables = self.tables.lock().await;
        let program = tables
            .summer_programs
            .get(&new.program_id)
            .cloned()
            .ok_or(StoreError::NotFound("Summer program"))?;
        let facts = AdmissionFacts {
            duplicate: tables.summer_applications.values().any(|a| {
                a.program_id == program.id
                    && a.applicant_id == new.applicant_id
                    && a.status.blocks_duplicate()
            }),
            current_usage: tables.summer_program_usage(program.id),
        };
        admission::evaluate(&program, applicant, today, facts)?;

        let now = Utc::now();
        let application = SummerApplication {
            id: next_id(&tables.summer_applications),
            program_id: program.id,
            applicant_id: new.applicant_id,
            status: ApplicationStatus::Submitted,
            university: new.university,
            major: new.major,
            year_of_study: new.year_of_study,
            gpa: new.gpa,
            motivation_letter: new.motivation_letter,
            relevant_experience: new.relevant_experience,
            skills_and_interests: new.skills_and_interests,
            reviewed_by: None,
            review_date: None,
            review_notes: String::new(),
            completion_date: None,
            created_at: now,
            updated_at: now,
        };
        tables.summer_applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn get_summer_application(&self, id: i32) -> StoreResult<Option<SummerApplication>> {
        Ok(self.tables.lock().await.summer_applications.get(&id).cloned())
    }

    async fn update_summer_application(
        &self,
        application: &SummerApplication,
        expected: ApplicationStatus,
    ) -> StoreResult<SummerApplication> {
        let mut row = application.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(
            &mut tables.summer_applications,
            row.id,
            "Summer application",
            |a| a.status == expected,
            row,
        )
    }

    async fn insert_publication(
        &self,
        new: NewPublication,
        submitted_by: i32,
    ) -> StoreResult<Publication> {
        let mut tables = self.tables.lock().await;
        if let Some(doi) = new.doi.as_deref() {
            if tables.publications.values().any(|p| p.doi.as_deref() == Some(doi)) {
                return Err(StoreError::Duplicate("Publication with this DOI".to_string()));
            }
        }
        let now = Utc::now();
        let publication = Publication {
            id: next_id(&tables.publications),
            title: new.title,
            abstract_text: new.abstract_text,
            publication_type: new.publication_type,
            journal_name: new.journal_name,
            doi: new.doi,
            publication_date: new.publication_date,
            keywords: new.keywords,
            status: ContentStatus::Draft,
            submitted_by,
            approved_by: None,
            approved_at: None,
            review_notes: String::new(),
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
        };
        tables.publications.insert(publication.id, publication.clone());
        Ok(publication)
    }

    async fn get_publication(&self, id: i32) -> StoreResult<Option<Publication>> {
        Ok(self.tables.lock().await.publications.get(&id).cloned())
    }

    async fn list_publications_by_status(
        &self,
        status: ContentStatus,
    ) -> StoreResult<Vec<Publication>> {
        let tables = self.tables.lock().await;
        Ok(tables.publications.values().filter(|p| p.status == status).cloned().collect())
    }

    async fn update_publication(
        &self,
        publication: &Publication,
        expected: ContentStatus,
    ) -> StoreResult<Publication> {
        let mut row = publication.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.publications, row.id, "Publication", |p| p.status == expected, row)
    }

    async fn insert_announcement(
        &self,
        new: NewAnnouncement,
        summary: String,
        author_id: i32,
    ) -> StoreResult<Announcement> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let announcement = Announcement {
            id: next_id(&tables.announcements),
            title: new.title,
            content: new.content,
            summary,
            announcement_type: new.announcement_type,
            priority: new.priority,
            target_audience: new.target_audience,
            status: ContentStatus::Draft,
            author_id,
            approved_by: None,
            approved_at: None,
            publish_at: new.publish_at.unwrap_or(now),
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        tables.announcements.insert(announcement.id, announcement.clone());
        Ok(announcement)
    }

    async fn get_announcement(&self, id: i32) -> StoreResult<Option<Announcement>> {
        Ok(self.tables.lock().await.announcements.get(&id).cloned())
    }

    async fn update_announcement(
        &self,
        announcement: &Announcement,
        expected: ContentStatus,
    ) -> StoreResult<Announcement> {
        let mut row = announcement.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(
            &mut tables.announcements,
            row.id,
            "Announcement",
            |a| a.status == expected,
            row,
        )
    }

    async fn insert_post(&self, new: NewPost, author_id: i32) -> StoreResult<Post> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let post = Post {
            id: next_id(&tables.posts),
            title: new.title,
            content: new.content,
            category: new.category,
            status: ContentStatus::Draft,
            author_id,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: i32) -> StoreResult<Option<Post>> {
        Ok(self.tables.lock().await.posts.get(&id).cloned())
    }

    async fn update_post(&self, post: &Post, expected: ContentStatus) -> StoreResult<Post> {
        let mut row = post.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.posts, row.id, "Post", |p| p.status == expected, row)
    }

    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let comment = Comment {
            id: next_id(&tables.comments),
            target_kind: new.target_kind,
            target_id: new.target_id,
            parent_id: new.parent_id,
            content: new.content,
            author_id: new.author_id,
            status: CommentStatus::Pending,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: i32) -> StoreResult<Option<Comment>> {
        Ok(self.tables.lock().await.comments.get(&id).cloned())
    }

    async fn list_comments_for_target(
        &self,
        kind: CommentableKind,
        target_id: i32,
    ) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .comments
            .values()
            .filter(|c| c.target_kind == kind && c.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn update_comment(
        &self,
        comment: &Comment,
        expected: CommentStatus,
    ) -> StoreResult<Comment> {
        let mut row = comment.clone();
        row.updated_at = Utc::now();
        let mut tables = self.tables.lock().await;
        compare_and_set(&mut tables.comments, row.id, "Comment", |c| c.status == expected, row)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::db::models::user::UserRole;
    use crate::domain::admission::Rejection;

    async fn researcher(store: &MemoryStore, n: i32) -> User {
        store
            .insert_user(NewUser {
                email: format!("r{n}@example.org"),
                username: format!("r{n}"),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: String::new(),
                role: UserRole::Researcher,
                is_approved: true,
                institution: String::new(),
                department: String::new(),
            })
            .await
            .unwrap()
    }

    async fn lab(store: &MemoryStore, capacity: i32) -> Lab {
        let department = store
            .insert_department(NewDepartment {
                name: format!("Biology {capacity}"),
                description: String::new(),
                head_id: None,
            })
            .await
            .unwrap();
        store
            .insert_lab(NewLab {
                name: "Wet lab".to_string(),
                department_id: department.id,
                description: String::new(),
                head_id: None,
                capacity,
            })
            .await
            .unwrap()
    }

    fn assignment(lab: &Lab, researcher: &User) -> NewAssignment {
        NewAssignment {
            researcher_id: researcher.id,
            lab_id: lab.id,
            start_date: Utc::now().date_naive(),
            end_date: None,
            position: "Researcher".to_string(),
            assigned_by: None,
            notes: String::new(),
        }
    }

    fn rejection(result: Result<ResearcherAssignment, AdmissionError>) -> Rejection {
        match result {
            Err(AdmissionError::Rejected(reason)) => reason,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lab_capacity_frees_up_when_an_assignment_ends() {
        let store = MemoryStore::new();
        let lab = lab(&store, 2).await;
        let today = Utc::now().date_naive();
        let a = researcher(&store, 1).await;
        let b = researcher(&store, 2).await;
        let c = researcher(&store, 3).await;

        let first = store
            .admit_assignment(assignment(&lab, &a), &Actor::from(&a), today)
            .await
            .unwrap();
        store.admit_assignment(assignment(&lab, &b), &Actor::from(&b), today).await.unwrap();
        let refused = store.admit_assignment(assignment(&lab, &c), &Actor::from(&c), today).await;
        assert_eq!(rejection(refused), Rejection::AtCapacity);
        assert_eq!(store.lab_usage(lab.id).await.unwrap(), 2);

        let mut ended = first.clone();
        ended.status = AssignmentStatus::Inactive;
        ended.end_date = Some(today);
        store.update_assignment(&ended, AssignmentStatus::Active).await.unwrap();
        assert_eq!(store.lab_usage(lab.id).await.unwrap(), 1);

        let admitted = assert_ok!(
            store.admit_assignment(assignment(&lab, &c), &Actor::from(&c), today).await
        );
        assert_eq!(admitted.department_id, lab.department_id);
        assert_eq!(store.lab_usage(lab.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn repeated_admission_is_a_duplicate() {
        let store = MemoryStore::new();
        let lab = lab(&store, 5).await;
        let today = Utc::now().date_naive();
        let a = researcher(&store, 1).await;

        store.admit_assignment(assignment(&lab, &a), &Actor::from(&a), today).await.unwrap();
        let again = store.admit_assignment(assignment(&lab, &a), &Actor::from(&a), today).await;
        assert_eq!(rejection(again), Rejection::Duplicate);
        assert_eq!(store.list_assignments_for_lab(lab.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_admissions_never_exceed_capacity() {
        let store = Arc::new(MemoryStore::new());
        let lab = lab(&store, 3).await;
        let today = Utc::now().date_naive();

        let mut researchers = Vec::new();
        for n in 0..10 {
            researchers.push(researcher(&store, n).await);
        }

        let handles: Vec<_> = researchers
            .into_iter()
            .map(|r| {
                let store = Arc::clone(&store);
                let new = assignment(&lab, &r);
                let applicant = Actor::from(&r);
                tokio::spawn(async move { store.admit_assignment(new, &applicant, today).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(store.lab_usage(lab.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn missing_resource_is_not_a_rejection() {
        let store = MemoryStore::new();
        let a = researcher(&store, 1).await;
        let new = NewAssignment {
            researcher_id: a.id,
            lab_id: 42,
            start_date: Utc::now().date_naive(),
            end_date: None,
            position: String::new(),
            assigned_by: None,
            notes: String::new(),
        };
        let result = store.admit_assignment(new, &Actor::from(&a), Utc::now().date_naive()).await;
        assert!(matches!(result, Err(AdmissionError::Store(StoreError::NotFound("Lab")))));
    }

    #[tokio::test]
    async fn stale_status_updates_are_refused() {
        let store = MemoryStore::new();
        let lab = lab(&store, 5).await;
        let a = researcher(&store, 1).await;
        let today = Utc::now().date_naive();
        let created = store
            .admit_assignment(assignment(&lab, &a), &Actor::from(&a), today)
            .await
            .unwrap();

        let mut ended = created.clone();
        ended.status = AssignmentStatus::Inactive;
        assert_ok!(store.update_assignment(&ended, AssignmentStatus::Active).await);

        let err = assert_err!(store.update_assignment(&ended, AssignmentStatus::Active).await);
        assert!(matches!(err, StoreError::Stale(_)));
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let store = MemoryStore::new();
        researcher(&store, 1).await;
        let err = store
            .insert_user(NewUser {
                email: "R1@example.org".to_string(),
                username: "other".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: String::new(),
                role: UserRole::Researcher,
                is_approved: false,
                institution: String::new(),
                department: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    async fn published_course(store: &MemoryStore, capacity: i32) -> Course {
        let today = Utc::now().date_naive();
        let course = store
            .insert_course(NewCourse {
                course_code: format!("CHEM-{capacity}"),
                title: "Spectroscopy".to_string(),
                description: String::new(),
                department_id: None,
                instructor_id: 1,
                start_date: today + chrono::Days::new(10),
                end_date: today + chrono::Days::new(20),
                registration_deadline: today + chrono::Days::new(5),
                max_participants: capacity,
                min_participants: 1,
                price: BigDecimal::from(0),
                is_free: true,
                is_public: true,
            })
            .await
            .unwrap();
        let mut published = course.clone();
        published.status = ContentStatus::Published;
        store.update_course(&published, ContentStatus::Draft).await.unwrap()
    }

    fn enrollment(course: &Course, student: &User) -> NewEnrollment {
        NewEnrollment {
            course_id: course.id,
            student_id: student.id,
            payment_amount: BigDecimal::from(0),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn enrollments_fill_a_course_and_dropping_frees_a_place() {
        let store = MemoryStore::new();
        let course = published_course(&store, 3).await;
        let today = Utc::now().date_naive();
        let mut students = Vec::new();
        for n in 1..=6 {
            students.push(researcher(&store, n).await);
        }

        let mut admitted = Vec::new();
        for student in &students[..3] {
            let row = assert_ok!(
                store.admit_enrollment(enrollment(&course, student), &Actor::from(student), today).await
            );
            assert_eq!(row.status, EnrollmentStatus::Pending);
            admitted.push(row);
        }
        let refused = store
            .admit_enrollment(enrollment(&course, &students[3]), &Actor::from(&students[3]), today)
            .await;
        assert!(matches!(refused, Err(AdmissionError::Rejected(Rejection::AtCapacity))));

        let mut dropped = admitted[0].clone();
        dropped.status = EnrollmentStatus::Dropped;
        store.update_enrollment(&dropped, EnrollmentStatus::Pending).await.unwrap();
        let mut rejected = admitted[1].clone();
        rejected.status = EnrollmentStatus::Rejected;
        store.update_enrollment(&rejected, EnrollmentStatus::Pending).await.unwrap();

        for student in &students[3..5] {
            assert_ok!(
                store.admit_enrollment(enrollment(&course, student), &Actor::from(student), today).await
            );
        }
        let refused = store
            .admit_enrollment(enrollment(&course, &students[5]), &Actor::from(&students[5]), today)
            .await;
        assert!(matches!(refused, Err(AdmissionError::Rejected(Rejection::AtCapacity))));

        let again = store
            .admit_enrollment(enrollment(&course, &students[0]), &Actor::from(&students[0]), today)
            .await;
        assert!(matches!(again, Err(AdmissionError::Rejected(Rejection::Duplicate))));
    }

    async fn service(store: &MemoryStore, capacity: i32) -> TestService {
        store
            .insert_service(NewTestService {
                service_code: format!("ICP-{capacity}"),
                name: "ICP-MS".to_string(),
                description: String::new(),
                category: crate::db::models::services::ServiceCategory::SampleAnalysis,
                department_id: None,
                lab_id: None,
                base_price: BigDecimal::from(0),
                is_free: true,
                max_concurrent_requests: capacity,
                is_public: true,
            })
            .await
            .unwrap()
    }

    fn service_request(service: &TestService, requester: &User) -> NewServiceRequest {
        NewServiceRequest {
            service_id: service.id,
            requested_by: requester.id,
            title: "Trace metals".to_string(),
            description: String::new(),
            quantity: 1,
            priority: Default::default(),
            urgency: Default::default(),
            preferred_completion_date: None,
        }
    }

    #[tokio::test]
    async fn resuming_a_held_request_is_admitted_again() {
        let store = MemoryStore::new();
        let service = service(&store, 2).await;
        let today = Utc::now().date_naive();
        let a = researcher(&store, 1).await;

        let held = store
            .admit_service_request(service_request(&service, &a), &Actor::from(&a), today)
            .await
            .unwrap();
        let mut paused = held.clone();
        paused.status = ServiceRequestStatus::OnHold;
        let paused = store
            .update_service_request(&paused, ServiceRequestStatus::Submitted, today)
            .await
            .unwrap();
        assert_eq!(store.service_usage(service.id).await.unwrap(), 0);

        let replacement = assert_ok!(
            store.admit_service_request(service_request(&service, &a), &Actor::from(&a), today).await
        );

        let mut resumed = paused.clone();
        resumed.status = ServiceRequestStatus::UnderReview;
        let refused = store
            .update_service_request(&resumed, ServiceRequestStatus::OnHold, today)
            .await;
        assert!(matches!(refused, Err(AdmissionError::Rejected(Rejection::Duplicate))));

        let mut cancelled = replacement.clone();
        cancelled.status = ServiceRequestStatus::Cancelled;
        store
            .update_service_request(&cancelled, ServiceRequestStatus::Submitted, today)
            .await
            .unwrap();
        let resumed = assert_ok!(
            store.update_service_request(&resumed, ServiceRequestStatus::OnHold, today).await
        );
        assert_eq!(resumed.status, ServiceRequestStatus::UnderReview);
        assert_eq!(store.service_usage(service.id).await.unwrap(), 1);

        let stale = store
            .update_service_request(&resumed, ServiceRequestStatus::OnHold, today)
            .await;
        assert!(matches!(stale, Err(AdmissionError::Store(StoreError::Stale(_)))));
    }
}
