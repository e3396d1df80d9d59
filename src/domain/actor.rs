use serde::{Deserialize, Serialize};

use crate::db::models::content::{Announcement, Comment, Post};
use crate::db::models::organization::ResearcherAssignment;
use crate::db::models::research::Publication;
use crate::db::models::services::ServiceRequest;
use crate::db::models::training::{Course, CourseEnrollment, SummerApplication, SummerProgram};
use crate::db::models::user::{User, UserRole};

/// The authenticated caller, as currently stored.
///
/// Role and approval come from the store on every request so that revoking a
/// user takes effect without reissuing tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i32,
    pub email: String,
    pub role: UserRole,
    pub is_approved: bool,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            is_approved: user.is_approved,
        }
    }
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Moderators and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }

    pub fn owns(&self, record: &impl Ownable) -> bool {
        record.owner_id() == self.user_id
    }

    pub fn owns_or_admin(&self, record: &impl Ownable) -> bool {
        self.is_admin() || self.owns(record)
    }

    pub fn owns_or_staff(&self, record: &impl Ownable) -> bool {
        self.is_staff() || self.owns(record)
    }
}

/// Records that belong to a single user.
pub trait Ownable {
    fn owner_id(&self) -> i32;
}

macro_rules! ownable {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl Ownable for $ty {
                fn owner_id(&self) -> i32 {
                    self.$field
                }
            }
        )+
    };
}

ownable! {
    ResearcherAssignment => researcher_id,
    ServiceRequest => requested_by,
    CourseEnrollment => student_id,
    Course => instructor_id,
    SummerProgram => supervisor_id,
    SummerApplication => applicant_id,
    Publication => submitted_by,
    Announcement => author_id,
    Post => author_id,
    Comment => author_id,
}
