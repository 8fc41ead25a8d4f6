//! Draft → published propagation strategies.
//!
//! - [`TransactionalSync`]: both rows in one transactional store, all or nothing.
//! - [`SequentialSync`]: independent stores, draft first; a failed published write leaves a
//!   partial state that a repeated publish repairs.
//! - [`RetryingSync`]: like `SequentialSync`, with a bounded retry of the published write.
//!
//! Every strategy writes `item.id` back after the draft insert, and every strategy offloads
//! the body after the relational part has committed when an [`OffloadManager`] is attached.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::offload::OffloadManager;
use crate::application::repos::{ContentTxRepo, DraftRepo, PublishedRepo, RepoError};
use crate::domain::entities::{ContentItem, PublishedItem};
use crate::domain::types::{ContentStatus, SyncStrategy};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Half of a paired write that did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    PublishedStore,
    ObjectStore,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStage::PublishedStore => "published_store",
            SyncStage::ObjectStore => "object_store",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The draft write failed; nothing was propagated.
    #[error("draft write failed")]
    Draft(#[source] RepoError),
    /// The single transaction covering both rows failed and was rolled back.
    #[error("content transaction failed")]
    Transaction(#[source] RepoError),
    /// The draft is persisted but propagation failed. Re-publishing the same id repairs it.
    #[error("content {id} partially synchronized: {stage} failed after {attempts} attempt(s)")]
    PartialSync {
        id: i64,
        stage: SyncStage,
        attempts: u32,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SyncError {
    pub fn is_partial(&self) -> bool {
        matches!(self, SyncError::PartialSync { .. })
    }

    /// Id of the persisted draft when the failure happened after the draft write.
    pub fn persisted_id(&self) -> Option<i64> {
        match self {
            SyncError::PartialSync { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Repository error behind a draft or transaction failure.
    pub fn repo_error(&self) -> Option<&RepoError> {
        match self {
            SyncError::Draft(err) | SyncError::Transaction(err) => Some(err),
            SyncError::PartialSync { .. } => None,
        }
    }

    fn partial(
        id: i64,
        stage: SyncStage,
        attempts: u32,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        metrics::counter!("folio_sync_partial_total", "stage" => stage.as_str()).increment(1);
        SyncError::PartialSync {
            id,
            stage,
            attempts,
            source: Box::new(source),
        }
    }
}

#[async_trait]
pub trait Synchronizer: Send + Sync {
    fn strategy(&self) -> SyncStrategy;

    /// Propagate `item` to the published representation and return its id.
    ///
    /// `item.id` is populated as soon as the draft row exists, even when a later stage fails.
    async fn publish(&self, item: &mut ContentItem) -> Result<i64, SyncError>;

    /// Owner-checked status change on both representations.
    async fn sync_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), SyncError>;
}

async fn offload_body(
    offload: Option<&OffloadManager>,
    item: &ContentItem,
) -> Result<(), SyncError> {
    let Some(offload) = offload else {
        return Ok(());
    };
    offload.offload(item.id, &item.body).await.map_err(|err| {
        error!(content_id = item.id, error = %err, "partial failure: body offload failed");
        SyncError::partial(item.id, SyncStage::ObjectStore, 1, err)
    })?;
    Ok(())
}

/// Keep the offloaded body in step with a status change: `Private` removes it and
/// `Published` puts the draft body back.
async fn reconcile_body<F, Fut>(
    offload: Option<&OffloadManager>,
    id: i64,
    status: ContentStatus,
    load_draft: F,
) -> Result<(), SyncError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<ContentItem>, RepoError>>,
{
    let Some(offload) = offload else {
        return Ok(());
    };
    match status {
        ContentStatus::Private => offload.remove(id).await.map_err(|err| {
            error!(content_id = id, error = %err, "partial failure: offloaded body removal failed");
            SyncError::partial(id, SyncStage::ObjectStore, 1, err)
        }),
        ContentStatus::Published => {
            let draft = load_draft().await.map_err(|err| {
                error!(content_id = id, error = %err, "partial failure: draft body reload failed");
                SyncError::partial(id, SyncStage::ObjectStore, 1, err)
            })?;
            match draft {
                Some(draft) => offload_body(Some(offload), &draft).await,
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

async fn write_draft(drafts: &dyn DraftRepo, item: &mut ContentItem) -> Result<i64, SyncError> {
    if item.is_new() {
        let id = drafts.insert(item).await.map_err(SyncError::Draft)?;
        item.id = id;
    } else {
        drafts.update_by_id(item).await.map_err(SyncError::Draft)?;
    }
    Ok(item.id)
}

// ============================================================================
// S0: single transactional store
// ============================================================================

pub struct TransactionalSync {
    store: Arc<dyn ContentTxRepo>,
    offload: Option<OffloadManager>,
}

impl TransactionalSync {
    pub fn new(store: Arc<dyn ContentTxRepo>) -> Self {
        Self {
            store,
            offload: None,
        }
    }

    pub fn with_offload(mut self, offload: OffloadManager) -> Self {
        self.offload = Some(offload);
        self
    }
}

#[async_trait]
impl Synchronizer for TransactionalSync {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Transactional
    }

    async fn publish(&self, item: &mut ContentItem) -> Result<i64, SyncError> {
        let inline_body = self.offload.is_none();
        let id = self
            .store
            .sync_in_tx(item, inline_body)
            .await
            .map_err(SyncError::Transaction)?;
        item.id = id;

        offload_body(self.offload.as_ref(), item).await?;
        Ok(id)
    }

    async fn sync_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), SyncError> {
        self.store
            .sync_status_in_tx(author_id, id, status)
            .await
            .map_err(SyncError::Transaction)?;
        let store = self.store.as_ref();
        reconcile_body(self.offload.as_ref(), id, status, || store.find_draft(id)).await
    }
}

// ============================================================================
// S1: independent stores, no retry
// ============================================================================

pub struct SequentialSync {
    drafts: Arc<dyn DraftRepo>,
    published: Arc<dyn PublishedRepo>,
    offload: Option<OffloadManager>,
}

impl SequentialSync {
    pub fn new(drafts: Arc<dyn DraftRepo>, published: Arc<dyn PublishedRepo>) -> Self {
        Self {
            drafts,
            published,
            offload: None,
        }
    }

    pub fn with_offload(mut self, offload: OffloadManager) -> Self {
        self.offload = Some(offload);
        self
    }
}

#[async_trait]
impl Synchronizer for SequentialSync {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Sequential
    }

    async fn publish(&self, item: &mut ContentItem) -> Result<i64, SyncError> {
        let id = write_draft(self.drafts.as_ref(), item).await?;

        let projection = PublishedItem::from_draft(item, self.offload.is_none());
        if let Err(err) = self.published.upsert(&projection).await {
            warn!(content_id = id, error = %err, "partial failure: published write failed");
            return Err(SyncError::partial(id, SyncStage::PublishedStore, 1, err));
        }

        offload_body(self.offload.as_ref(), item).await?;
        Ok(id)
    }

    async fn sync_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), SyncError> {
        self.drafts
            .update_status(author_id, id, status)
            .await
            .map_err(SyncError::Draft)?;

        if let Err(err) = self.published.update_status(id, status).await {
            warn!(content_id = id, error = %err, "partial failure: published status write failed");
            return Err(SyncError::partial(id, SyncStage::PublishedStore, 1, err));
        }

        let drafts = self.drafts.as_ref();
        reconcile_body(self.offload.as_ref(), id, status, || drafts.find_by_id(id)).await
    }
}

// ============================================================================
// S2: independent stores, bounded retry of the published write
// ============================================================================

pub struct RetryingSync {
    drafts: Arc<dyn DraftRepo>,
    published: Arc<dyn PublishedRepo>,
    offload: Option<OffloadManager>,
    max_attempts: NonZeroU32,
    backoff: Duration,
}

impl RetryingSync {
    pub fn new(drafts: Arc<dyn DraftRepo>, published: Arc<dyn PublishedRepo>) -> Self {
        Self {
            drafts,
            published,
            offload: None,
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_offload(mut self, offload: OffloadManager) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn with_retry(mut self, max_attempts: NonZeroU32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    async fn retry_published<F, Fut>(&self, id: i64, mut op: F) -> Result<(), SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), RepoError>>,
    {
        let max = self.max_attempts.get();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(content_id = id, attempt, "published write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) if attempt < max => {
                    error!(
                        content_id = id,
                        attempt,
                        error = %err,
                        "partial failure: published write failed"
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(err) => {
                    error!(
                        content_id = id,
                        attempts = attempt,
                        error = %err,
                        "partial failure: published write retries exhausted"
                    );
                    return Err(SyncError::partial(
                        id,
                        SyncStage::PublishedStore,
                        attempt,
                        err,
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl Synchronizer for RetryingSync {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Retrying
    }

    async fn publish(&self, item: &mut ContentItem) -> Result<i64, SyncError> {
        let id = write_draft(self.drafts.as_ref(), item).await?;

        let projection = PublishedItem::from_draft(item, self.offload.is_none());
        let published = self.published.as_ref();
        self.retry_published(id, || published.upsert(&projection))
            .await?;

        offload_body(self.offload.as_ref(), item).await?;
        Ok(id)
    }

    async fn sync_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), SyncError> {
        self.drafts
            .update_status(author_id, id, status)
            .await
            .map_err(SyncError::Draft)?;

        let published = self.published.as_ref();
        self.retry_published(id, || published.update_status(id, status))
            .await?;

        let drafts = self.drafts.as_ref();
        reconcile_body(self.offload.as_ref(), id, status, || drafts.find_by_id(id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::domain::clock::FixedClock;
    use crate::infra::memory::MemoryRepositories;
    use crate::infra::objects::MemoryObjectStore;

    /// Published store that fails the first `failures` writes.
    struct FlakyPublished {
        inner: Arc<MemoryRepositories>,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyPublished {
        fn new(inner: Arc<MemoryRepositories>, failures: u32) -> Self {
            Self {
                inner,
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn take_failure(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl PublishedRepo for FlakyPublished {
        async fn upsert(&self, item: &PublishedItem) -> Result<(), RepoError> {
            if self.take_failure() {
                return Err(RepoError::Timeout);
            }
            self.inner.upsert(item).await
        }

        async fn update_status(&self, id: i64, status: ContentStatus) -> Result<(), RepoError> {
            if self.take_failure() {
                return Err(RepoError::Timeout);
            }
            PublishedRepo::update_status(self.inner.as_ref(), id, status).await
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<PublishedItem>, RepoError> {
            PublishedRepo::find_by_id(self.inner.as_ref(), id).await
        }
    }

    #[derive(Default)]
    struct RejectingDrafts {
        inserts: Mutex<u32>,
    }

    #[async_trait]
    impl DraftRepo for RejectingDrafts {
        async fn insert(&self, _item: &ContentItem) -> Result<i64, RepoError> {
            *self.inserts.lock().unwrap() += 1;
            Err(RepoError::from_persistence("disk full"))
        }

        async fn update_by_id(&self, _item: &ContentItem) -> Result<(), RepoError> {
            Err(RepoError::NotFoundOrForbidden)
        }

        async fn update_status(
            &self,
            _author_id: i64,
            _id: i64,
            _status: ContentStatus,
        ) -> Result<(), RepoError> {
            Err(RepoError::NotFoundOrForbidden)
        }

        async fn find_by_id(&self, _id: i64) -> Result<Option<ContentItem>, RepoError> {
            Ok(None)
        }

        async fn list_by_author(
            &self,
            _author_id: i64,
            _offset: u32,
            _limit: u32,
        ) -> Result<Vec<ContentItem>, RepoError> {
            Ok(Vec::new())
        }
    }

    fn repos() -> Arc<MemoryRepositories> {
        Arc::new(MemoryRepositories::with_clock(Arc::new(FixedClock::new(1_000))))
    }

    fn publishable(author: i64) -> ContentItem {
        let mut item = ContentItem::draft(author, "T", "B");
        item.status = ContentStatus::Published;
        item
    }

    fn retrying(repos: &Arc<MemoryRepositories>, published: Arc<dyn PublishedRepo>) -> RetryingSync {
        RetryingSync::new(repos.clone(), published)
            .with_retry(NonZeroU32::new(3).unwrap(), Duration::ZERO)
    }

    #[tokio::test]
    async fn transactional_publish_assigns_draft_id_to_published_row() {
        let repos = repos();
        let sync = TransactionalSync::new(repos.clone());
        let mut item = publishable(7);

        let id = sync.publish(&mut item).await.expect("publish");

        assert_eq!(item.id, id);
        let published = PublishedRepo::find_by_id(repos.as_ref(), id)
            .await
            .unwrap()
            .expect("published row");
        assert_eq!(published.id, id);
        assert_eq!(published.body, "B");
        assert_eq!(published.status, ContentStatus::Published);
    }

    #[tokio::test]
    async fn sequential_publish_surfaces_partial_failure_with_id() {
        let repos = repos();
        let flaky = Arc::new(FlakyPublished::new(repos.clone(), 1));
        let sync = SequentialSync::new(repos.clone(), flaky.clone());
        let mut item = publishable(7);

        let err = sync.publish(&mut item).await.expect_err("published write fails");
        assert!(err.is_partial());
        assert_eq!(err.persisted_id(), Some(item.id));
        assert!(
            DraftRepo::find_by_id(repos.as_ref(), item.id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            PublishedRepo::find_by_id(repos.as_ref(), item.id)
                .await
                .unwrap()
                .is_none()
        );

        // Re-publishing the same draft repairs the published side.
        let id = sync.publish(&mut item).await.expect("repair");
        assert_eq!(id, item.id);
        assert!(
            PublishedRepo::find_by_id(repos.as_ref(), id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn retrying_publish_recovers_on_third_attempt() {
        let repos = repos();
        let flaky = Arc::new(FlakyPublished::new(repos.clone(), 2));
        let sync = retrying(&repos, flaky.clone());
        let mut item = publishable(7);

        let id = sync.publish(&mut item).await.expect("third attempt succeeds");

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(id, item.id);
        assert!(
            PublishedRepo::find_by_id(repos.as_ref(), id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn retrying_publish_exhausts_into_partial_sync() {
        let repos = repos();
        let flaky = Arc::new(FlakyPublished::new(repos.clone(), 3));
        let sync = retrying(&repos, flaky.clone());
        let mut item = publishable(7);

        let err = sync.publish(&mut item).await.expect_err("all attempts fail");

        match err {
            SyncError::PartialSync {
                id,
                stage,
                attempts,
                ..
            } => {
                assert_eq!(id, item.id);
                assert_eq!(stage, SyncStage::PublishedStore);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(
            DraftRepo::find_by_id(repos.as_ref(), item.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn draft_failure_is_distinguishable_and_not_retried() {
        let repos = repos();
        let drafts = Arc::new(RejectingDrafts::default());
        let flaky = Arc::new(FlakyPublished::new(repos.clone(), 0));
        let sync = RetryingSync::new(drafts.clone(), flaky.clone())
            .with_retry(NonZeroU32::new(3).unwrap(), Duration::ZERO);
        let mut item = publishable(7);

        let err = sync.publish(&mut item).await.expect_err("draft fails");
        assert!(matches!(err, SyncError::Draft(_)));
        assert_eq!(*drafts.inserts.lock().unwrap(), 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
        assert_eq!(item.id, 0);
    }

    #[tokio::test]
    async fn offloaded_publish_keeps_metadata_only_and_private_removes_object() {
        let repos = repos();
        let objects = Arc::new(MemoryObjectStore::default());
        let offload = OffloadManager::new(objects.clone());
        let sync = TransactionalSync::new(repos.clone()).with_offload(offload.clone());
        let mut item = publishable(7);

        let id = sync.publish(&mut item).await.expect("publish");
        let published = PublishedRepo::find_by_id(repos.as_ref(), id)
            .await
            .unwrap()
            .expect("row");
        assert!(published.body.is_empty());
        assert_eq!(offload.load(id).await.unwrap().as_deref(), Some("B"));

        sync.sync_status(7, id, ContentStatus::Private)
            .await
            .expect("withdraw");
        assert!(offload.load(id).await.unwrap().is_none());
        let published = PublishedRepo::find_by_id(repos.as_ref(), id)
            .await
            .unwrap()
            .expect("row persists");
        assert_eq!(published.status, ContentStatus::Private);
    }

    #[tokio::test]
    async fn republishing_through_status_restores_the_offloaded_body() {
        let repos = repos();
        let objects = Arc::new(MemoryObjectStore::default());
        let offload = OffloadManager::new(objects.clone());
        let strategies: Vec<Box<dyn Synchronizer>> = vec![
            Box::new(TransactionalSync::new(repos.clone()).with_offload(offload.clone())),
            Box::new(SequentialSync::new(repos.clone(), repos.clone()).with_offload(offload.clone())),
            Box::new(retrying(&repos, repos.clone()).with_offload(offload.clone())),
        ];

        for sync in strategies {
            let mut item = publishable(7);
            let id = sync.publish(&mut item).await.expect("publish");

            sync.sync_status(7, id, ContentStatus::Private)
                .await
                .expect("withdraw");
            assert!(offload.load(id).await.unwrap().is_none());

            sync.sync_status(7, id, ContentStatus::Published)
                .await
                .expect("restore");
            assert_eq!(
                offload.load(id).await.unwrap().as_deref(),
                Some("B"),
                "{} strategy lost the body",
                sync.strategy().as_str()
            );
        }
    }

    #[tokio::test]
    async fn failed_offload_is_partial_after_commit() {
        let repos = repos();
        let objects = Arc::new(MemoryObjectStore::default());
        objects.fail_next_puts(1);
        let offload = OffloadManager::new(objects.clone());
        let sync = TransactionalSync::new(repos.clone()).with_offload(offload.clone());
        let mut item = publishable(7);

        let err = sync.publish(&mut item).await.expect_err("offload fails");
        match &err {
            SyncError::PartialSync { stage, .. } => assert_eq!(*stage, SyncStage::ObjectStore),
            other => panic!("unexpected error: {other:?}"),
        }
        let id = item.id;
        assert!(
            PublishedRepo::find_by_id(repos.as_ref(), id)
                .await
                .unwrap()
                .is_some()
        );

        sync.publish(&mut item).await.expect("retry repairs");
        assert_eq!(item.id, id);
        assert_eq!(offload.load(id).await.unwrap().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn status_change_by_non_owner_is_rejected() {
        let repos = repos();
        let sync = TransactionalSync::new(repos.clone());
        let mut item = publishable(7);
        let id = sync.publish(&mut item).await.expect("publish");

        let err = sync
            .sync_status(8, id, ContentStatus::Private)
            .await
            .expect_err("foreign author");
        assert!(matches!(
            err.repo_error(),
            Some(RepoError::NotFoundOrForbidden)
        ));
    }
}
