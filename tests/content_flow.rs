//! End-to-end content flows over the in-process stores.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio::application::content::ContentRepository;
use folio::application::error::ContentError;
use folio::application::offload::OffloadManager;
use folio::application::repos::{DraftRepo, PublishedRepo};
use folio::application::sync::{SequentialSync, Synchronizer, TransactionalSync};
use folio::cache::{
    CacheConfig, CacheError, ContentCache, IncrOutcome, KvStore, MemoryKvStore, keys,
};
use folio::domain::clock::FixedClock;
use folio::domain::entities::ContentItem;
use folio::domain::types::ContentStatus;
use folio::infra::memory::MemoryRepositories;
use folio::infra::objects::MemoryObjectStore;

struct Harness {
    repos: Arc<MemoryRepositories>,
    kv: Arc<MemoryKvStore>,
    clock: Arc<FixedClock>,
    content: ContentRepository,
}

fn harness(config: CacheConfig) -> Harness {
    let clock = Arc::new(FixedClock::new(1_000));
    let repos = Arc::new(MemoryRepositories::with_clock(clock.clone()));
    let kv = Arc::new(MemoryKvStore::with_clock(
        NonZeroUsize::new(64).expect("non-zero"),
        clock.clone(),
    ));
    let sync: Arc<dyn Synchronizer> = Arc::new(TransactionalSync::new(repos.clone()));
    let content = ContentRepository::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        sync,
        ContentCache::new(kv.clone(), config),
    );
    Harness {
        repos,
        kv,
        clock,
        content,
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn transactional_publish_mirrors_the_draft() {
    let h = harness(CacheConfig::default());

    let mut item = ContentItem::draft(7, "T", "B");
    let id = h.content.create(&mut item).await.expect("create");
    assert_eq!(id, 1);
    assert_eq!(item.id, 1);

    let published_id = h.content.publish(&mut item).await.expect("publish");
    assert_eq!(published_id, 1);

    let draft = DraftRepo::find_by_id(h.repos.as_ref(), 1)
        .await
        .expect("draft lookup")
        .expect("draft row");
    let published = PublishedRepo::find_by_id(h.repos.as_ref(), 1)
        .await
        .expect("published lookup")
        .expect("published row");

    assert_eq!(published.id, draft.id);
    assert_eq!(published.title, "T");
    assert_eq!(published.body, "B");
    assert_eq!(published.status, ContentStatus::Published);
    assert_eq!(published.status, draft.status);
    assert_eq!(published.body, draft.body);
}

#[tokio::test]
async fn republish_keeps_created_at_and_advances_updated_at() {
    let h = harness(CacheConfig::default());

    let mut item = ContentItem::draft(7, "T", "B");
    h.content.publish(&mut item).await.expect("first publish");
    let first = PublishedRepo::find_by_id(h.repos.as_ref(), item.id)
        .await
        .expect("lookup")
        .expect("row");

    h.clock.advance(5_000);
    h.content.publish(&mut item).await.expect("second publish");
    let second = PublishedRepo::find_by_id(h.repos.as_ref(), item.id)
        .await
        .expect("lookup")
        .expect("row");

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
}

#[tokio::test]
async fn first_page_is_cached_as_abstracts_and_invalidated_by_writes() {
    let config = CacheConfig {
        abstract_chars: 4,
        precache_enabled: false,
        ..CacheConfig::default()
    };
    let h = harness(config);

    let mut item = ContentItem::draft(7, "Title", "long body text");
    h.content.create(&mut item).await.expect("create");

    let listed = h.content.list_by_author(7, 0, 100).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].body, "long body text");

    let key = keys::first_page(7);
    let kv = h.kv.clone();
    eventually(|| {
        let kv = kv.clone();
        let key = key.clone();
        async move { kv.contains(&key) }
    })
    .await;

    let cached = h.content.list_by_author(7, 0, 100).await.expect("cached list");
    assert_eq!(cached[0].body, "long");

    let mut second = ContentItem::draft(7, "Second", "b");
    h.content.create(&mut second).await.expect("create second");
    assert!(!h.kv.contains(&key));

    let refreshed = h.content.list_by_author(7, 0, 100).await.expect("list");
    assert_eq!(refreshed.len(), 2);
}

#[tokio::test]
async fn other_pages_bypass_the_first_page_cache() {
    let h = harness(CacheConfig::default());

    for title in ["a", "b", "c"] {
        let mut item = ContentItem::draft(7, title, "body");
        h.content.create(&mut item).await.expect("create");
    }

    let page = h.content.list_by_author(7, 1, 2).await.expect("list");
    assert_eq!(page.len(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!h.kv.contains(&keys::first_page(7)));
}

#[tokio::test]
async fn listing_precaches_the_first_listed_item() {
    let h = harness(CacheConfig::default());

    let mut foreign = ContentItem::draft(3, "reference", "ref");
    h.content.create(&mut foreign).await.expect("create");
    for title in ["older", "newer"] {
        h.clock.advance(10);
        let mut item = ContentItem::draft(7, title, "tiny");
        h.content.create(&mut item).await.expect("create");
    }

    let listed = h.content.list_by_author(7, 0, 100).await.expect("list");
    let ids: Vec<i64> = listed.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![3, 2]);

    let kv = h.kv.clone();
    eventually(|| {
        let kv = kv.clone();
        async move { kv.contains(&keys::detail(3)) }
    })
    .await;
    assert!(!h.kv.contains(&keys::detail(1)));
}

#[tokio::test]
async fn listing_precaches_a_fixed_item_owned_by_another_author() {
    let h = harness(CacheConfig {
        precache_id: Some(1),
        precache_max_bytes: 64,
        ..CacheConfig::default()
    });

    let mut reference = ContentItem::draft(3, "reference", "ref");
    h.content.create(&mut reference).await.expect("create");
    let mut own = ContentItem::draft(7, "own", "tiny");
    h.content.create(&mut own).await.expect("create");

    h.content.list_by_author(7, 0, 100).await.expect("list");

    let kv = h.kv.clone();
    eventually(|| {
        let kv = kv.clone();
        async move { kv.contains(&keys::detail(1)) }
    })
    .await;
    let cached = h.content.get_by_id(1).await.expect("read").expect("item");
    assert_eq!(cached.author.id, 3);
}

#[tokio::test]
async fn listing_skips_precache_of_large_bodies() {
    let h = harness(CacheConfig {
        precache_max_bytes: 8,
        ..CacheConfig::default()
    });

    let mut large = ContentItem::draft(7, "large", "x".repeat(64));
    h.content.create(&mut large).await.expect("create");

    h.content.list_by_author(7, 0, 100).await.expect("list");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!h.kv.contains(&keys::detail(1)));
}

#[tokio::test]
async fn disabled_precache_warms_nothing() {
    let h = harness(CacheConfig {
        precache_enabled: false,
        ..CacheConfig::default()
    });

    let mut item = ContentItem::draft(7, "small", "tiny");
    h.content.create(&mut item).await.expect("create");
    h.content.list_by_author(7, 0, 100).await.expect("list");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!h.kv.contains(&keys::detail(item.id)));
}

#[tokio::test]
async fn published_detail_resolves_the_author_name() {
    let h = harness(CacheConfig::default());
    h.repos.add_author(7, "Ada");

    let mut item = ContentItem::draft(7, "T", "B");
    let id = h.content.publish(&mut item).await.expect("publish");

    let detail = h
        .content
        .get_published_by_id(id)
        .await
        .expect("read")
        .expect("published item");
    assert_eq!(detail.author.name, "Ada");
    assert_eq!(detail.body, "B");

    assert!(h.content.get_published_by_id(404).await.expect("read").is_none());
}

#[tokio::test]
async fn publish_warms_the_published_cache() {
    let h = harness(CacheConfig::default());
    h.repos.add_author(7, "Ada");

    let mut item = ContentItem::draft(7, "T", "B");
    let id = h.content.publish(&mut item).await.expect("publish");

    let kv = h.kv.clone();
    eventually(|| {
        let kv = kv.clone();
        async move { kv.contains(&keys::published_detail(id)) }
    })
    .await;
}

#[tokio::test]
async fn private_status_withdraws_and_removes_the_object() {
    let clock = Arc::new(FixedClock::new(1_000));
    let repos = Arc::new(MemoryRepositories::with_clock(clock));
    let objects = Arc::new(MemoryObjectStore::default());
    let offload = OffloadManager::new(objects.clone()).with_prefix("articles/");
    let sync: Arc<dyn Synchronizer> = Arc::new(
        SequentialSync::new(repos.clone(), repos.clone()).with_offload(offload.clone()),
    );
    let kv = Arc::new(MemoryKvStore::new(NonZeroUsize::new(64).expect("non-zero")));
    let content = ContentRepository::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        sync,
        ContentCache::new(kv, CacheConfig::default()),
    )
    .with_offload(offload);

    let mut item = ContentItem::draft(7, "T", "offloaded body");
    let id = content.publish(&mut item).await.expect("publish");
    assert_eq!(objects.len(), 1);

    let row = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert!(row.body.is_empty());

    let detail = content
        .get_published_by_id(id)
        .await
        .expect("read")
        .expect("item");
    assert_eq!(detail.body, "offloaded body");

    content
        .sync_status(7, id, ContentStatus::Private)
        .await
        .expect("withdraw");
    assert!(objects.is_empty());

    let row = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(row.status, ContentStatus::Private);

    content
        .sync_status(7, id, ContentStatus::Published)
        .await
        .expect("restore");
    assert_eq!(objects.len(), 1);

    let detail = content
        .get_published_by_id(id)
        .await
        .expect("read")
        .expect("item");
    assert_eq!(detail.status, ContentStatus::Published);
    assert_eq!(detail.body, "offloaded body");
}

#[tokio::test]
async fn foreign_author_cannot_update_or_withdraw() {
    let h = harness(CacheConfig::default());

    let mut item = ContentItem::draft(7, "T", "B");
    let id = h.content.create(&mut item).await.expect("create");

    let mut forged = item.clone();
    forged.author.id = 8;
    let err = h.content.update(&forged).await.expect_err("not the owner");
    assert!(matches!(err, ContentError::NotFoundOrForbidden));

    let err = h
        .content
        .sync_status(8, id, ContentStatus::Private)
        .await
        .expect_err("not the owner");
    assert!(matches!(err, ContentError::NotFoundOrForbidden));
}

#[tokio::test]
async fn save_creates_then_updates() {
    let h = harness(CacheConfig::default());

    let mut item = ContentItem::draft(7, "T", "B");
    let id = h.content.save(&mut item).await.expect("create");

    item.title = "T2".to_string();
    assert_eq!(h.content.save(&mut item).await.expect("update"), id);

    let stored = h
        .content
        .get_by_id(id)
        .await
        .expect("read")
        .expect("item");
    assert_eq!(stored.title, "T2");
}

#[tokio::test]
async fn empty_title_is_rejected_before_any_write() {
    let h = harness(CacheConfig::default());

    let mut item = ContentItem::draft(7, "", "B");
    let err = h.content.create(&mut item).await.expect_err("invalid");
    assert!(matches!(err, ContentError::Domain(_)));
    assert!(
        DraftRepo::find_by_id(h.repos.as_ref(), 1)
            .await
            .expect("lookup")
            .is_none()
    );
}

/// Every call fails, like a cache server that is down.
struct DownKvStore;

#[async_trait]
impl KvStore for DownKvStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn hget_all(&self, _key: &str) -> Result<HashMap<String, i64>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn hset(
        &self,
        _key: &str,
        _fields: &[(&str, i64)],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn hincr_if_exists(
        &self,
        _key: &str,
        _field: &str,
        _delta: i64,
    ) -> Result<IncrOutcome, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn cache_outage_falls_back_to_the_stores() {
    let repos = Arc::new(MemoryRepositories::new());
    repos.add_author(7, "Ada");
    let sync: Arc<dyn Synchronizer> = Arc::new(TransactionalSync::new(repos.clone()));
    let content = ContentRepository::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        sync,
        ContentCache::new(Arc::new(DownKvStore), CacheConfig::default()),
    );

    let mut item = ContentItem::draft(7, "T", "B");
    let id = content.publish(&mut item).await.expect("publish despite cache");

    let listed = content.list_by_author(7, 0, 100).await.expect("list");
    assert_eq!(listed.len(), 1);

    let detail = content.get_by_id(id).await.expect("detail").expect("item");
    assert_eq!(detail.title, "T");

    let published = content
        .get_published_by_id(id)
        .await
        .expect("published")
        .expect("item");
    assert_eq!(published.author.name, "Ada");
}
