status_enum! {
    /// Lifecycle of departments, labs and test services.
    pub enum RecordStatus as "record_status" {
        Active => "active",
        Inactive => "inactive",
    }
}

status_enum! {
    /// Review lifecycle shared by publications, announcements, posts and courses.
    pub enum ContentStatus as "content_status" {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Published => "published",
    }
}

status_enum! {
    pub enum Priority as "priority_level" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Body of the `PATCH …/status` endpoints for content-workflow entities.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ContentStatusUpdate {
    pub status: ContentStatus,
    pub review_notes: Option<String>,
}
