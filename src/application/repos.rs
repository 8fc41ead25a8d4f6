//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    CollectRecord, ContentItem, CounterRecord, LikeRecord, PublishedItem,
};
use crate::domain::types::ContentStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    /// An owner-checked write matched no row. Wrong id and wrong owner are not distinguished.
    #[error("resource not found or not owned by caller")]
    NotFoundOrForbidden,
    /// A toggle write affected no row because the prior state did not allow it.
    #[error("illegal state transition: {message}")]
    IllegalTransition { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalTransition {
            message: message.into(),
        }
    }
}

/// Authoritative CRUD over the author's working copy.
///
/// `insert`/`update_by_id` stamp `created_at`/`updated_at` themselves; values on the
/// passed item are ignored.
#[async_trait]
pub trait DraftRepo: Send + Sync {
    async fn insert(&self, item: &ContentItem) -> Result<i64, RepoError>;

    /// Overwrites title/body/status when both id and author match.
    async fn update_by_id(&self, item: &ContentItem) -> Result<(), RepoError>;

    /// Owner-checked status change.
    async fn update_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, RepoError>;

    /// Author's items ordered by `updated_at` descending.
    async fn list_by_author(
        &self,
        author_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ContentItem>, RepoError>;
}

/// Reader-facing projection store.
#[async_trait]
pub trait PublishedRepo: Send + Sync {
    /// Insert, or overwrite title/body/status/updated_at on id conflict. Never touches created_at.
    async fn upsert(&self, item: &PublishedItem) -> Result<(), RepoError>;

    async fn update_status(&self, id: i64, status: ContentStatus) -> Result<(), RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PublishedItem>, RepoError>;
}

/// Draft and published rows living in one transactional store.
#[async_trait]
pub trait ContentTxRepo: Send + Sync {
    /// Insert-or-update the draft then upsert the published row, atomically.
    /// Returns the draft id. With `inline_body == false` the published row keeps metadata only.
    async fn sync_in_tx(&self, item: &ContentItem, inline_body: bool) -> Result<i64, RepoError>;

    /// Owner-checked draft status change plus published status change, atomically.
    async fn sync_status_in_tx(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError>;

    async fn find_draft(&self, id: i64) -> Result<Option<ContentItem>, RepoError>;
}

/// Engagement counters and per-user toggles.
///
/// Every like/collect method mutates the counter and the toggle row in one transaction.
#[async_trait]
pub trait InteractionsRepo: Send + Sync {
    /// Upsert-with-increment; creates the row at 1 when absent.
    async fn incr_read(&self, biz: &str, biz_id: i64) -> Result<(), RepoError>;

    async fn batch_incr_read(&self, targets: &[(String, i64)]) -> Result<(), RepoError>;

    /// Fails with `IllegalTransition` when the like is already active.
    async fn insert_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError>;

    /// Fails with `IllegalTransition` when there is no active like.
    async fn cancel_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError>;

    async fn insert_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError>;

    async fn cancel_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError>;

    async fn find_counts(&self, biz: &str, biz_id: i64)
    -> Result<Option<CounterRecord>, RepoError>;

    /// Toggle row in any status.
    async fn find_like(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<LikeRecord>, RepoError>;

    /// Toggle row in any status.
    async fn find_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<CollectRecord>, RepoError>;
}

/// Display-name lookup owned by the user subsystem.
#[async_trait]
pub trait AuthorsRepo: Send + Sync {
    async fn display_name(&self, author_id: i64) -> Result<Option<String>, RepoError>;
}
