//! Status machines for every entity that moves through a review or service
//! lifecycle.
//!
//! Each status enum carries a fixed transition table. Anything not listed is
//! illegal, including staying in the same status. Entities plug in their role
//! gates, preconditions and side effects through [`Workflow`], and
//! [`apply_transition`] runs the checks in a fixed order:
//! table, role gate, precondition, then mutation and approval stamping.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::common::ContentStatus;
use crate::db::models::content::{Announcement, Comment, CommentStatus, Post};
use crate::db::models::organization::{AssignmentStatus, ResearcherAssignment};
use crate::db::models::research::Publication;
use crate::db::models::services::{ServiceRequest, ServiceRequestStatus};
use crate::db::models::training::{
    ApplicationStatus, Course, CourseEnrollment, EnrollmentStatus, SummerApplication,
    SummerProgram,
};
use crate::domain::actor::{Actor, Ownable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot change status from {from} to {to}")]
    Illegal { from: String, to: String },
    #[error("You are not allowed to change this status to {0}")]
    NotPermitted(String),
    #[error("{0}")]
    Precondition(String),
}

pub trait WorkflowStatus: Copy + Eq + fmt::Display + 'static {
    /// Statuses reachable in one step.
    fn next_states(self) -> &'static [Self];

    /// Statuses that carry an approval stamp.
    fn is_approved_class(self) -> bool;

    fn can_transition_to(self, to: Self) -> bool {
        self.next_states().contains(&to)
    }
}

pub fn check_transition<S: WorkflowStatus>(from: S, to: S) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl WorkflowStatus for ContentStatus {
    fn next_states(self) -> &'static [Self] {
        use ContentStatus::*;
        match self {
            Draft => &[Pending],
            Pending => &[Approved, Rejected],
            Approved => &[Published, Rejected],
            Rejected => &[Pending],
            Published => &[Approved],
        }
    }

    fn is_approved_class(self) -> bool {
        matches!(self, ContentStatus::Approved | ContentStatus::Published)
    }
}

impl WorkflowStatus for CommentStatus {
    fn next_states(self) -> &'static [Self] {
        use CommentStatus::*;
        match self {
            Pending => &[Approved, Rejected],
            Approved => &[Rejected],
            Rejected => &[Approved],
        }
    }

    fn is_approved_class(self) -> bool {
        self == CommentStatus::Approved
    }
}

impl WorkflowStatus for ServiceRequestStatus {
    fn next_states(self) -> &'static [Self] {
        use ServiceRequestStatus::*;
        match self {
            Submitted => &[UnderReview, Cancelled, OnHold],
            UnderReview => &[Approved, Cancelled, OnHold],
            Approved => &[InProgress, Cancelled, OnHold],
            InProgress => &[Completed, OnHold],
            OnHold => &[UnderReview, Cancelled],
            Completed => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    fn is_approved_class(self) -> bool {
        use ServiceRequestStatus::*;
        matches!(self, Approved | InProgress | Completed | Delivered)
    }
}

impl WorkflowStatus for EnrollmentStatus {
    fn next_states(self) -> &'static [Self] {
        use EnrollmentStatus::*;
        match self {
            Pending => &[Approved, Rejected, Dropped],
            Approved => &[Completed, Dropped],
            Rejected | Completed | Dropped => &[],
        }
    }

    fn is_approved_class(self) -> bool {
        matches!(self, EnrollmentStatus::Approved | EnrollmentStatus::Completed)
    }
}

impl WorkflowStatus for ApplicationStatus {
    fn next_states(self) -> &'static [Self] {
        use ApplicationStatus::*;
        match self {
            Submitted => &[UnderReview, Withdrawn],
            UnderReview => &[Approved, Rejected, Withdrawn],
            Approved => &[Completed, Withdrawn],
            Rejected | Completed | Withdrawn => &[],
        }
    }

    fn is_approved_class(self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Completed)
    }
}

impl WorkflowStatus for AssignmentStatus {
    fn next_states(self) -> &'static [Self] {
        match self {
            AssignmentStatus::Active => &[AssignmentStatus::Inactive],
            AssignmentStatus::Inactive => &[],
        }
    }

    fn is_approved_class(self) -> bool {
        false
    }
}

/// Mutable view over an entity's `approved_by`/`approved_at` pair.
pub struct ApprovalStamp<'a> {
    pub by: &'a mut Option<i32>,
    pub at: &'a mut Option<DateTime<Utc>>,
}

/// Entering the approved class stamps, leaving it clears, moving within it keeps.
pub fn restamp<S: WorkflowStatus>(
    from: S,
    to: S,
    actor_id: i32,
    now: DateTime<Utc>,
    stamp: ApprovalStamp<'_>,
) {
    match (from.is_approved_class(), to.is_approved_class()) {
        (false, true) => {
            *stamp.by = Some(actor_id);
            *stamp.at = Some(now);
        }
        (true, false) => {
            *stamp.by = None;
            *stamp.at = None;
        }
        _ => {}
    }
}

pub trait Workflow: Ownable {
    type Status: WorkflowStatus;

    fn status(&self) -> Self::Status;

    fn set_status(&mut self, status: Self::Status);

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>>;

    /// Role gate for `from -> to`. Only called for legal transitions.
    fn may_transition(&self, actor: &Actor, from: Self::Status, to: Self::Status) -> bool;

    fn precondition(&self, _to: Self::Status) -> Result<(), TransitionError> {
        Ok(())
    }

    fn on_enter(&mut self, _to: Self::Status, _now: DateTime<Utc>) {}
}

/// Moves `entity` to `to` and returns the status it left.
///
/// The entity is untouched when any check fails.
pub fn apply_transition<W: Workflow>(
    entity: &mut W,
    actor: &Actor,
    to: W::Status,
    now: DateTime<Utc>,
) -> Result<W::Status, TransitionError> {
    let from = entity.status();
    check_transition(from, to)?;
    if !entity.may_transition(actor, from, to) {
        return Err(TransitionError::NotPermitted(to.to_string()));
    }
    entity.precondition(to)?;

    entity.set_status(to);
    entity.on_enter(to, now);
    if let Some(stamp) = entity.approval_stamp() {
        restamp(from, to, actor.user_id, now, stamp);
    }
    Ok(from)
}

/// Owners may submit or resubmit their content; everything else is a review.
fn content_gate(
    actor: &Actor,
    owner_id: i32,
    from: ContentStatus,
    to: ContentStatus,
    reviewer: fn(&Actor) -> bool,
) -> bool {
    let submission = matches!(
        (from, to),
        (ContentStatus::Draft, ContentStatus::Pending)
            | (ContentStatus::Rejected, ContentStatus::Pending)
    );
    (submission && actor.user_id == owner_id) || reviewer(actor)
}

macro_rules! content_workflow {
    ($($ty:ty => $reviewer:expr),+ $(,)?) => {
        $(
            impl Workflow for $ty {
                type Status = ContentStatus;

                fn status(&self) -> ContentStatus {
                    self.status
                }

                fn set_status(&mut self, status: ContentStatus) {
                    self.status = status;
                }

                fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
                    Some(ApprovalStamp { by: &mut self.approved_by, at: &mut self.approved_at })
                }

                fn may_transition(&self, actor: &Actor, from: ContentStatus, to: ContentStatus) -> bool {
                    content_gate(actor, self.owner_id(), from, to, $reviewer)
                }
            }
        )+
    };
}

content_workflow! {
    Publication => Actor::is_admin,
    Course => Actor::is_admin,
    SummerProgram => Actor::is_admin,
    Announcement => Actor::is_staff,
    Post => Actor::is_staff,
}

impl Workflow for Comment {
    type Status = CommentStatus;

    fn status(&self) -> CommentStatus {
        self.status
    }

    fn set_status(&mut self, status: CommentStatus) {
        self.status = status;
    }

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
        Some(ApprovalStamp { by: &mut self.approved_by, at: &mut self.approved_at })
    }

    fn may_transition(&self, actor: &Actor, _from: CommentStatus, _to: CommentStatus) -> bool {
        actor.is_staff()
    }
}

impl Workflow for ServiceRequest {
    type Status = ServiceRequestStatus;

    fn status(&self) -> ServiceRequestStatus {
        self.status
    }

    fn set_status(&mut self, status: ServiceRequestStatus) {
        self.status = status;
    }

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
        Some(ApprovalStamp { by: &mut self.reviewed_by, at: &mut self.review_date })
    }

    fn may_transition(
        &self,
        actor: &Actor,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
    ) -> bool {
        use ServiceRequestStatus::*;
        if actor.is_staff() {
            return true;
        }
        match (from, to) {
            (_, Cancelled) => actor.owns(self),
            (Approved, InProgress) | (InProgress, Completed) => {
                self.assigned_technician == Some(actor.user_id)
            }
            _ => false,
        }
    }

    fn precondition(&self, to: ServiceRequestStatus) -> Result<(), TransitionError> {
        if to == ServiceRequestStatus::InProgress && self.assigned_technician.is_none() {
            return Err(TransitionError::Precondition(
                "A technician must be assigned before work can start".to_string(),
            ));
        }
        Ok(())
    }

    fn on_enter(&mut self, to: ServiceRequestStatus, now: DateTime<Utc>) {
        match to {
            ServiceRequestStatus::InProgress => self.started_at = Some(now),
            ServiceRequestStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
    }
}

impl Workflow for CourseEnrollment {
    type Status = EnrollmentStatus;

    fn status(&self) -> EnrollmentStatus {
        self.status
    }

    fn set_status(&mut self, status: EnrollmentStatus) {
        self.status = status;
    }

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
        Some(ApprovalStamp { by: &mut self.approved_by, at: &mut self.approved_at })
    }

    fn may_transition(&self, actor: &Actor, _from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
        actor.is_staff() || (to == EnrollmentStatus::Dropped && actor.owns(self))
    }

    fn on_enter(&mut self, to: EnrollmentStatus, now: DateTime<Utc>) {
        if to == EnrollmentStatus::Completed {
            self.completion_date = Some(now.date_naive());
        }
    }
}

impl Workflow for SummerApplication {
    type Status = ApplicationStatus;

    fn status(&self) -> ApplicationStatus {
        self.status
    }

    fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
    }

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
        Some(ApprovalStamp { by: &mut self.reviewed_by, at: &mut self.review_date })
    }

    fn may_transition(&self, actor: &Actor, _from: ApplicationStatus, to: ApplicationStatus) -> bool {
        actor.is_staff() || (to == ApplicationStatus::Withdrawn && actor.owns(self))
    }

    fn on_enter(&mut self, to: ApplicationStatus, now: DateTime<Utc>) {
        if to == ApplicationStatus::Completed {
            self.completion_date = Some(now.date_naive());
        }
    }
}

impl Workflow for ResearcherAssignment {
    type Status = AssignmentStatus;

    fn status(&self) -> AssignmentStatus {
        self.status
    }

    fn set_status(&mut self, status: AssignmentStatus) {
        self.status = status;
    }

    fn approval_stamp(&mut self) -> Option<ApprovalStamp<'_>> {
        None
    }

    fn may_transition(&self, actor: &Actor, _from: AssignmentStatus, _to: AssignmentStatus) -> bool {
        actor.is_staff()
    }

    fn on_enter(&mut self, to: AssignmentStatus, now: DateTime<Utc>) {
        if to == AssignmentStatus::Inactive {
            self.end_date = Some(now.date_naive());
        }
    }
}
