use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::common::ContentStatus;
use crate::db::models::content::{Comment, CommentableKind};
use crate::db::store::{Store, StoreResult};
use crate::domain::actor::Actor;

/// Something a comment can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentTarget {
    Post(i32),
    Announcement(i32),
}

impl CommentTarget {
    pub fn new(kind: CommentableKind, id: i32) -> Self {
        match kind {
            CommentableKind::Post => CommentTarget::Post(id),
            CommentableKind::Announcement => CommentTarget::Announcement(id),
        }
    }

    pub fn kind(self) -> CommentableKind {
        match self {
            CommentTarget::Post(_) => CommentableKind::Post,
            CommentTarget::Announcement(_) => CommentableKind::Announcement,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            CommentTarget::Post(id) | CommentTarget::Announcement(id) => id,
        }
    }

    /// Loads the summary the comment rules need, as seen by `viewer`.
    /// `None` if the target is gone.
    pub async fn load(self, store: &dyn Store, viewer: &Actor) -> StoreResult<Option<TargetSummary>> {
        loader(self.kind())(store, self.id(), viewer).await
    }
}

impl Comment {
    pub fn target(&self) -> CommentTarget {
        CommentTarget::new(self.target_kind, self.target_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSummary {
    pub author_id: i32,
    pub status: ContentStatus,
    /// Shown to the viewer without owner or staff rights.
    pub live: bool,
}

impl TargetSummary {
    pub fn accepts_comments(self) -> bool {
        self.status == ContentStatus::Published
    }

    /// Same rule as reading the target itself.
    pub fn visible_to(self, viewer: &Actor) -> bool {
        self.live || viewer.is_staff() || self.author_id == viewer.user_id
    }
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = StoreResult<Option<TargetSummary>>> + Send + 'a>>;
type Loader = for<'a> fn(&'a dyn Store, i32, &'a Actor) -> LoadFuture<'a>;

fn loader(kind: CommentableKind) -> Loader {
    match kind {
        CommentableKind::Post => load_post,
        CommentableKind::Announcement => load_announcement,
    }
}

fn load_post<'a>(store: &'a dyn Store, id: i32, _viewer: &'a Actor) -> LoadFuture<'a> {
    Box::pin(async move {
        Ok(store.get_post(id).await?.map(|post| TargetSummary {
            author_id: post.author_id,
            status: post.status,
            live: post.status == ContentStatus::Published,
        }))
    })
}

fn load_announcement<'a>(store: &'a dyn Store, id: i32, viewer: &'a Actor) -> LoadFuture<'a> {
    Box::pin(async move {
        Ok(store.get_announcement(id).await?.map(|announcement| TargetSummary {
            author_id: announcement.author_id,
            status: announcement.status,
            live: announcement.is_live_for(viewer),
        }))
    })
}
