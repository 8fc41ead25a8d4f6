//! In-process relational store.
//!
//! Implements every repository contract over plain maps. All state sits behind one mutex, so
//! each call is atomic the way a single relational transaction is. Used for embedded runs and
//! for exercising the façades without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::repos::{
    AuthorsRepo, ContentTxRepo, DraftRepo, InteractionsRepo, PublishedRepo, RepoError,
};
use crate::cache::lock::mutex_lock;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::entities::{
    Author, CollectRecord, ContentItem, CounterRecord, InteractionCounts, LikeRecord,
    PublishedItem,
};
use crate::domain::types::{ContentStatus, ToggleStatus};

const SOURCE: &str = "infra::memory";

type ToggleKey = (i64, String, i64);

#[derive(Default)]
struct State {
    last_id: i64,
    drafts: BTreeMap<i64, ContentItem>,
    published: BTreeMap<i64, PublishedItem>,
    counters: HashMap<(String, i64), CounterRecord>,
    likes: HashMap<ToggleKey, LikeRecord>,
    collects: HashMap<ToggleKey, CollectRecord>,
    authors: HashMap<i64, String>,
}

impl State {
    fn insert_draft(&mut self, item: &ContentItem, now: i64) -> i64 {
        self.last_id += 1;
        let id = self.last_id;
        self.drafts.insert(
            id,
            ContentItem {
                id,
                author: Author::new(item.author.id),
                created_at: now,
                updated_at: now,
                ..item.clone()
            },
        );
        id
    }

    fn owned_draft(&mut self, author_id: i64, id: i64) -> Result<&mut ContentItem, RepoError> {
        self.drafts
            .get_mut(&id)
            .filter(|draft| draft.author.id == author_id)
            .ok_or(RepoError::NotFoundOrForbidden)
    }

    fn update_draft(&mut self, item: &ContentItem, now: i64) -> Result<(), RepoError> {
        let draft = self.owned_draft(item.author.id, item.id)?;
        draft.title = item.title.clone();
        draft.body = item.body.clone();
        draft.status = item.status;
        draft.updated_at = now;
        Ok(())
    }

    fn update_draft_status(
        &mut self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
        now: i64,
    ) -> Result<(), RepoError> {
        let draft = self.owned_draft(author_id, id)?;
        draft.status = status;
        draft.updated_at = now;
        Ok(())
    }

    fn upsert_published(&mut self, item: &PublishedItem, now: i64) {
        self.published
            .entry(item.id)
            .and_modify(|row| {
                row.title = item.title.clone();
                row.body = item.body.clone();
                row.status = item.status;
                row.updated_at = now;
            })
            .or_insert_with(|| PublishedItem {
                created_at: now,
                updated_at: now,
                ..item.clone()
            });
    }

    fn update_published_status(&mut self, id: i64, status: ContentStatus, now: i64) {
        if let Some(row) = self.published.get_mut(&id) {
            row.status = status;
            row.updated_at = now;
        }
    }

    fn counter(&mut self, biz: &str, biz_id: i64, now: i64) -> &mut CounterRecord {
        let record = self
            .counters
            .entry((biz.to_string(), biz_id))
            .or_insert_with(|| CounterRecord {
                biz: biz.to_string(),
                biz_id,
                counts: InteractionCounts::default(),
                created_at: now,
                updated_at: now,
            });
        record.updated_at = now;
        record
    }
}

pub struct MemoryRepositories {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRepositories {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Register a display name for `AuthorsRepo` lookups.
    pub fn add_author(&self, author_id: i64, name: impl Into<String>) {
        mutex_lock(&self.state, SOURCE, "add_author")
            .authors
            .insert(author_id, name.into());
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

#[async_trait]
impl DraftRepo for MemoryRepositories {
    async fn insert(&self, item: &ContentItem) -> Result<i64, RepoError> {
        let now = self.now();
        Ok(mutex_lock(&self.state, SOURCE, "insert").insert_draft(item, now))
    }

    async fn update_by_id(&self, item: &ContentItem) -> Result<(), RepoError> {
        let now = self.now();
        mutex_lock(&self.state, SOURCE, "update_by_id").update_draft(item, now)
    }

    async fn update_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError> {
        let now = self.now();
        mutex_lock(&self.state, SOURCE, "update_status").update_draft_status(
            author_id, id, status, now,
        )
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_by_id")
            .drafts
            .get(&id)
            .cloned())
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ContentItem>, RepoError> {
        let state = mutex_lock(&self.state, SOURCE, "list_by_author");
        let mut items: Vec<ContentItem> = state
            .drafts
            .values()
            .filter(|draft| draft.author.id == author_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl PublishedRepo for MemoryRepositories {
    async fn upsert(&self, item: &PublishedItem) -> Result<(), RepoError> {
        let now = self.now();
        mutex_lock(&self.state, SOURCE, "upsert").upsert_published(item, now);
        Ok(())
    }

    async fn update_status(&self, id: i64, status: ContentStatus) -> Result<(), RepoError> {
        let now = self.now();
        mutex_lock(&self.state, SOURCE, "update_published_status")
            .update_published_status(id, status, now);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PublishedItem>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_published")
            .published
            .get(&id)
            .cloned())
    }
}

#[async_trait]
impl ContentTxRepo for MemoryRepositories {
    async fn sync_in_tx(&self, item: &ContentItem, inline_body: bool) -> Result<i64, RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "sync_in_tx");

        let id = if item.is_new() {
            state.insert_draft(item, now)
        } else {
            state.update_draft(item, now)?;
            item.id
        };

        let mut synced = item.clone();
        synced.id = id;
        state.upsert_published(&PublishedItem::from_draft(&synced, inline_body), now);
        Ok(id)
    }

    async fn sync_status_in_tx(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "sync_status_in_tx");
        state.update_draft_status(author_id, id, status, now)?;
        state.update_published_status(id, status, now);
        Ok(())
    }

    async fn find_draft(&self, id: i64) -> Result<Option<ContentItem>, RepoError> {
        DraftRepo::find_by_id(self, id).await
    }
}

#[async_trait]
impl InteractionsRepo for MemoryRepositories {
    async fn incr_read(&self, biz: &str, biz_id: i64) -> Result<(), RepoError> {
        let now = self.now();
        mutex_lock(&self.state, SOURCE, "incr_read")
            .counter(biz, biz_id, now)
            .counts
            .read_count += 1;
        Ok(())
    }

    async fn batch_incr_read(&self, targets: &[(String, i64)]) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "batch_incr_read");
        for (biz, biz_id) in targets {
            state.counter(biz, *biz_id, now).counts.read_count += 1;
        }
        Ok(())
    }

    async fn insert_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "insert_like");
        let key = (user_id, biz.to_string(), biz_id);

        match state.likes.get_mut(&key) {
            Some(like) if like.status.is_active() => {
                return Err(RepoError::illegal("like is already active"));
            }
            Some(like) => {
                like.status = ToggleStatus::Active;
                like.updated_at = now;
            }
            None => {
                state.likes.insert(
                    key,
                    LikeRecord {
                        user_id,
                        biz: biz.to_string(),
                        biz_id,
                        status: ToggleStatus::Active,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        state.counter(biz, biz_id, now).counts.like_count += 1;
        Ok(())
    }

    async fn cancel_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "cancel_like");
        let key = (user_id, biz.to_string(), biz_id);

        match state.likes.get_mut(&key) {
            Some(like) if like.status.is_active() => {
                like.status = ToggleStatus::Inactive;
                like.updated_at = now;
            }
            _ => return Err(RepoError::illegal("no active like to cancel")),
        }
        let counts = &mut state.counter(biz, biz_id, now).counts;
        counts.like_count = (counts.like_count - 1).max(0);
        Ok(())
    }

    async fn insert_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "insert_collect");
        let key = (user_id, biz.to_string(), biz_id);

        match state.collects.get_mut(&key) {
            Some(collect) if collect.status.is_active() => {
                return Err(RepoError::illegal("item is already collected"));
            }
            Some(collect) => {
                collect.status = ToggleStatus::Active;
                collect.collection_id = collection_id;
                collect.updated_at = now;
            }
            None => {
                state.collects.insert(
                    key,
                    CollectRecord {
                        user_id,
                        biz: biz.to_string(),
                        biz_id,
                        collection_id,
                        status: ToggleStatus::Active,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        state.counter(biz, biz_id, now).counts.collect_count += 1;
        Ok(())
    }

    async fn cancel_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut state = mutex_lock(&self.state, SOURCE, "cancel_collect");
        let key = (user_id, biz.to_string(), biz_id);

        match state.collects.get_mut(&key) {
            Some(collect)
                if collect.status.is_active() && collect.collection_id == collection_id =>
            {
                collect.status = ToggleStatus::Inactive;
                collect.updated_at = now;
            }
            _ => return Err(RepoError::illegal("no active collect in this collection")),
        }
        let counts = &mut state.counter(biz, biz_id, now).counts;
        counts.collect_count = (counts.collect_count - 1).max(0);
        Ok(())
    }

    async fn find_counts(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<CounterRecord>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_counts")
            .counters
            .get(&(biz.to_string(), biz_id))
            .cloned())
    }

    async fn find_like(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<LikeRecord>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_like")
            .likes
            .get(&(user_id, biz.to_string(), biz_id))
            .cloned())
    }

    async fn find_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<CollectRecord>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_collect")
            .collects
            .get(&(user_id, biz.to_string(), biz_id))
            .cloned())
    }
}

#[async_trait]
impl AuthorsRepo for MemoryRepositories {
    async fn display_name(&self, author_id: i64) -> Result<Option<String>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "display_name")
            .authors
            .get(&author_id)
            .cloned())
    }
}
