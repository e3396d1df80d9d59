use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::common::ContentStatus;

status_enum! {
    pub enum PublicationType as "publication_type" {
        JournalArticle => "journal_article",
        ConferencePaper => "conference_paper",
        BookChapter => "book_chapter",
        Book => "book",
        Thesis => "thesis",
        Report => "report",
        Preprint => "preprint",
        Other => "other",
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Publication {
    pub id: i32,
    pub title: String,
    #[serde(rename = "abstract")]
    #[sqlx(rename = "abstract")]
    pub abstract_text: String,
    pub publication_type: PublicationType,
    pub journal_name: String,
    pub doi: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub keywords: String,
    pub status: ContentStatus,
    pub submitted_by: i32,
    pub approved_by: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub review_notes: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPublication {
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub publication_type: PublicationType,
    #[serde(default)]
    pub journal_name: String,
    pub doi: Option<String>,
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub keywords: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkReviewAction {
    Approve,
    Reject,
}

impl BulkReviewAction {
    pub fn target(self) -> ContentStatus {
        match self {
            BulkReviewAction::Approve => ContentStatus::Approved,
            BulkReviewAction::Reject => ContentStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkReviewRequest {
    pub publication_ids: Vec<i32>,
    pub action: BulkReviewAction,
    #[serde(default)]
    pub review_notes: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkReviewFailure {
    pub id: i32,
    pub reason: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BulkReviewResult {
    pub updated: Vec<i32>,
    pub failed: Vec<BulkReviewFailure>,
}
