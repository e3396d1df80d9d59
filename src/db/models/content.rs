use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::common::{ContentStatus, Priority};
use super::user::UserRole;
use crate::domain::actor::Actor;
use crate::domain::comment_target::CommentTarget;

status_enum! {
    pub enum AnnouncementType as "announcement_type" {
        General => "general",
        Urgent => "urgent",
        Maintenance => "maintenance",
        Event => "event",
        Deadline => "deadline",
        News => "news",
        Policy => "policy",
    }
}

status_enum! {
    pub enum TargetAudience as "target_audience" {
        All => "all",
        Researchers => "researchers",
        Moderators => "moderators",
        Admins => "admins",
        Approved => "approved",
    }
}

impl TargetAudience {
    pub fn reaches(self, role: UserRole, is_approved: bool) -> bool {
        match self {
            TargetAudience::All => true,
            TargetAudience::Researchers => role == UserRole::Researcher,
            TargetAudience::Moderators => role == UserRole::Moderator,
            TargetAudience::Admins => role == UserRole::Admin,
            TargetAudience::Approved => is_approved,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Announcement {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub announcement_type: AnnouncementType,
    pub priority: Priority,
    pub target_audience: TargetAudience,
    pub status: ContentStatus,
    pub author_id: i32,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub publish_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    #[serde(default = "default_announcement_type")]
    pub announcement_type: AnnouncementType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_audience")]
    pub target_audience: TargetAudience,
    pub publish_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Announcement {
    /// Published, in its display window, and addressed to `actor`.
    pub fn is_live_for(&self, actor: &Actor) -> bool {
        let now = Utc::now();
        self.status == ContentStatus::Published
            && self.publish_at <= now
            && self.expires_at.map_or(true, |expires| expires > now)
            && self.target_audience.reaches(actor.role, actor.is_approved)
    }
}

fn default_announcement_type() -> AnnouncementType {
    AnnouncementType::General
}

fn default_audience() -> TargetAudience {
    TargetAudience::All
}

const SUMMARY_LIMIT: usize = 300;
const SUMMARY_CUT: usize = 297;

/// Uses the supplied summary when present, otherwise derives one from the body.
pub fn derive_summary(content: &str, supplied: Option<&str>) -> String {
    if let Some(summary) = supplied.filter(|s| !s.trim().is_empty()) {
        return summary.to_string();
    }
    if content.chars().count() > SUMMARY_LIMIT {
        let head: String = content.chars().take(SUMMARY_CUT).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

status_enum! {
    pub enum PostCategory as "post_category" {
        Event => "event",
        Activity => "activity",
        Workshop => "workshop",
        Seminar => "seminar",
        Conference => "conference",
        Training => "training",
        Collaboration => "collaboration",
        Achievement => "achievement",
        General => "general",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub category: PostCategory,
    pub status: ContentStatus,
    pub author_id: i32,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: PostCategory,
}

fn default_category() -> PostCategory {
    PostCategory::General
}

status_enum! {
    pub enum CommentStatus as "comment_status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

status_enum! {
    pub enum CommentableKind as "commentable_kind" {
        Post => "post",
        Announcement => "announcement",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: i32,
    pub target_kind: CommentableKind,
    pub target_id: i32,
    pub parent_id: Option<i32>,
    pub content: String,
    pub author_id: i32,
    pub status: CommentStatus,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const COMMENT_MAX_CHARS: usize = 1000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComment {
    pub target: CommentTarget,
    pub content: String,
    /// Comment being replied to; must sit on the same target.
    pub parent_id: Option<i32>,
}

/// Selects the comments of one target.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommentQuery {
    pub kind: CommentableKind,
    pub id: i32,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub target_kind: CommentableKind,
    pub target_id: i32,
    pub parent_id: Option<i32>,
    pub content: String,
    pub author_id: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentStatusUpdate {
    pub status: CommentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_content_is_truncated_into_summary() {
        let content = "a".repeat(301);
        let summary = derive_summary(&content, None);
        assert_eq!(summary.chars().count(), 300);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn audiences_match_roles() {
        assert!(TargetAudience::All.reaches(UserRole::Researcher, false));
        assert!(TargetAudience::Researchers.reaches(UserRole::Researcher, true));
        assert!(!TargetAudience::Admins.reaches(UserRole::Moderator, true));
        assert!(!TargetAudience::Approved.reaches(UserRole::Admin, false));
    }

    #[test]
    fn short_content_and_supplied_summaries_are_kept() {
        let exactly = "b".repeat(300);
        assert_eq!(derive_summary(&exactly, None), exactly);
        assert_eq!(derive_summary(&exactly, Some("given")), "given");
        assert_eq!(derive_summary("body", Some("  ")), "body");
    }
}
