//! Content façade: drafts, publishing and cached reads.
//!
//! Writes hit the authoritative stores first and then invalidate the affected cache entries;
//! invalidation failures are logged and never fail the write. Reads try the cache, fall back
//! to the store on a miss or a cache failure, and backfill on a detached task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::backfill::Backfill;
use crate::application::error::ContentError;
use crate::application::offload::OffloadManager;
use crate::application::repos::{AuthorsRepo, DraftRepo, PublishedRepo};
use crate::application::sync::Synchronizer;
use crate::cache::{CacheError, ContentCache};
use crate::domain::entities::ContentItem;
use crate::domain::error::DomainError;
use crate::domain::types::{ContentStatus, SyncStrategy};

/// Cache call bounded by `timeout`; elapsing counts as a cache failure.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(CacheError::Timeout))
}

pub struct ContentRepository {
    drafts: Arc<dyn DraftRepo>,
    published: Arc<dyn PublishedRepo>,
    authors: Arc<dyn AuthorsRepo>,
    sync: Arc<dyn Synchronizer>,
    cache: ContentCache,
    offload: Option<OffloadManager>,
    backfill: Backfill,
}

impl ContentRepository {
    pub fn new(
        drafts: Arc<dyn DraftRepo>,
        published: Arc<dyn PublishedRepo>,
        authors: Arc<dyn AuthorsRepo>,
        sync: Arc<dyn Synchronizer>,
        cache: ContentCache,
    ) -> Self {
        let backfill = Backfill::new(cache.config().backfill_timeout());
        Self {
            drafts,
            published,
            authors,
            sync,
            cache,
            offload: None,
            backfill,
        }
    }

    /// Published reads load offloaded bodies through `offload`.
    pub fn with_offload(mut self, offload: OffloadManager) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.sync.strategy()
    }

    pub async fn create(&self, item: &mut ContentItem) -> Result<i64, ContentError> {
        validate(item)?;
        let id = self.drafts.insert(item).await?;
        item.id = id;
        debug!(content_id = id, author_id = item.author.id, "draft created");

        self.invalidate_first_page(item.author.id).await;
        Ok(id)
    }

    pub async fn update(&self, item: &ContentItem) -> Result<(), ContentError> {
        validate(item)?;
        self.drafts.update_by_id(item).await?;

        self.invalidate_first_page(item.author.id).await;
        self.invalidate_detail(item.id).await;
        Ok(())
    }

    /// Update when the item already exists, create otherwise.
    pub async fn save(&self, item: &mut ContentItem) -> Result<i64, ContentError> {
        if item.is_new() {
            self.create(item).await
        } else {
            self.update(item).await?;
            Ok(item.id)
        }
    }

    /// Propagate the draft to the published side with the configured strategy.
    ///
    /// On success the published detail is warmed in the background with the author name.
    pub async fn publish(&self, item: &mut ContentItem) -> Result<i64, ContentError> {
        validate(item)?;
        item.status = ContentStatus::Published;
        let result = self.sync.publish(item).await;

        // A partial failure still left a persisted draft behind.
        if result.as_ref().map_or_else(|err| err.is_partial(), |_| true) {
            self.invalidate_first_page(item.author.id).await;
            self.invalidate_detail(item.id).await;
        }

        let id = result?;
        info!(
            content_id = id,
            author_id = item.author.id,
            strategy = self.sync.strategy().as_str(),
            "content published"
        );
        self.warm_published(item.clone());
        Ok(id)
    }

    /// Owner-checked status change on both representations.
    pub async fn sync_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), ContentError> {
        let result = self.sync.sync_status(author_id, id, status).await;

        if result.as_ref().map_or_else(|err| err.is_partial(), |_| true) {
            self.invalidate_first_page(author_id).await;
            self.invalidate_detail(id).await;
            self.invalidate_published(id).await;
        }
        result?;

        info!(content_id = id, author_id, status = %status, "content status synchronized");
        Ok(())
    }

    /// Author's items, newest update first. The first page is served from the cache.
    pub async fn list_by_author(
        &self,
        author_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ContentItem>, ContentError> {
        let config = self.cache.config();
        let first_page = config.is_first_page(offset, limit);

        if first_page {
            match bounded(config.backfill_timeout(), self.cache.get_first_page(author_id)).await
            {
                Ok(Some(items)) => return Ok(items),
                Ok(None) => {}
                Err(err) => {
                    warn!(author_id, error = %err, "first page cache read failed");
                }
            }
        }

        let items = self.drafts.list_by_author(author_id, offset, limit).await?;

        if first_page {
            let cache = self.cache.clone();
            let page = items.clone();
            self.backfill.spawn("first_page", async move {
                cache.set_first_page(author_id, &page).await
            });
        }
        self.precache(&items);
        Ok(items)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ContentItem>, ContentError> {
        match bounded(self.backfill.timeout(), self.cache.get(id)).await {
            Ok(Some(item)) => return Ok(Some(item)),
            Ok(None) => {}
            Err(err) => warn!(content_id = id, error = %err, "detail cache read failed"),
        }

        let Some(item) = self.drafts.find_by_id(id).await? else {
            return Ok(None);
        };

        let cache = self.cache.clone();
        let cached = item.clone();
        self.backfill
            .spawn("detail", async move { cache.set(&cached).await });
        Ok(Some(item))
    }

    /// Reader-facing detail with the author display name resolved.
    pub async fn get_published_by_id(&self, id: i64) -> Result<Option<ContentItem>, ContentError> {
        match bounded(self.backfill.timeout(), self.cache.get_published(id)).await {
            Ok(Some(item)) => return Ok(Some(item)),
            Ok(None) => {}
            Err(err) => warn!(content_id = id, error = %err, "published cache read failed"),
        }

        let Some(mut published) = self.published.find_by_id(id).await? else {
            return Ok(None);
        };
        if let Some(offload) = &self.offload
            && published.body.is_empty()
        {
            published.body = offload.load(id).await?.unwrap_or_default();
        }

        let name = self
            .authors
            .display_name(published.author_id)
            .await?
            .unwrap_or_default();
        let item = published.into_content(name);

        let cache = self.cache.clone();
        let cached = item.clone();
        self.backfill
            .spawn("published", async move { cache.set_published(&cached).await });
        Ok(Some(item))
    }

    fn warm_published(&self, mut item: ContentItem) {
        let cache = self.cache.clone();
        let authors = self.authors.clone();
        self.backfill.spawn("published_warm", async move {
            match authors.display_name(item.author.id).await {
                Ok(name) => item.author.name = name.unwrap_or_default(),
                Err(err) => return Err(err.to_string()),
            }
            cache
                .set_published(&item)
                .await
                .map_err(|err| err.to_string())
        });
    }

    /// Warm one small detail entry after a listing read: the first listed item, or the
    /// configured fixed id, which is loaded from the draft store when the listing lacks it.
    fn precache(&self, items: &[ContentItem]) {
        let config = self.cache.config();
        if !config.precache_enabled {
            return;
        }

        let listed = match config.precache_id {
            None => items.first(),
            Some(target) => items.iter().find(|item| item.id == target),
        };
        if let Some(item) = listed {
            if !config.should_precache(item.body_len()) {
                debug!(content_id = item.id, size = item.body_len(), "precache skipped: body too large");
                return;
            }
            let cache = self.cache.clone();
            let cached = item.clone();
            self.backfill
                .spawn("precache", async move { cache.set(&cached).await });
            return;
        }

        let Some(target) = config.precache_id else {
            return;
        };
        let cache = self.cache.clone();
        let drafts = self.drafts.clone();
        self.backfill.spawn("precache", async move {
            let item = match drafts.find_by_id(target).await {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(()),
                Err(err) => return Err(err.to_string()),
            };
            if !cache.config().should_precache(item.body_len()) {
                debug!(content_id = item.id, size = item.body_len(), "precache skipped: body too large");
                return Ok(());
            }
            cache.set(&item).await.map_err(|err| err.to_string())
        });
    }

    async fn invalidate_first_page(&self, author_id: i64) {
        if let Err(err) = bounded(
            self.backfill.timeout(),
            self.cache.del_first_page(author_id),
        )
        .await
        {
            warn!(author_id, error = %err, "first page cache invalidation failed");
        }
    }

    async fn invalidate_detail(&self, id: i64) {
        if id <= 0 {
            return;
        }
        if let Err(err) = bounded(self.backfill.timeout(), self.cache.del(id)).await {
            warn!(content_id = id, error = %err, "detail cache invalidation failed");
        }
    }

    async fn invalidate_published(&self, id: i64) {
        if let Err(err) = bounded(self.backfill.timeout(), self.cache.del_published(id)).await {
            warn!(content_id = id, error = %err, "published cache invalidation failed");
        }
    }
}

fn validate(item: &ContentItem) -> Result<(), DomainError> {
    if item.author.id <= 0 {
        return Err(DomainError::validation("content must have an author"));
    }
    if item.title.trim().is_empty() {
        return Err(DomainError::validation("content title must not be empty"));
    }
    Ok(())
}
