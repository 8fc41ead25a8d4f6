//! Counter hashes per business item.
//!
//! Adjustments go through the conditional increment, so an absent key stays absent: a
//! missing hash means "not cached", never zero.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::content::record_lookup;
use super::keys::{self, FIELD_COLLECT_COUNT, FIELD_LIKE_COUNT, FIELD_READ_COUNT};
use super::kv::{CacheError, IncrOutcome, KvStore};
use crate::domain::entities::InteractionCounts;

pub const CACHE_INTERACTIVE: &str = "interactive";

#[derive(Clone)]
pub struct InteractionCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl InteractionCache {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub async fn incr_read_if_present(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.adjust(biz, biz_id, FIELD_READ_COUNT, 1).await
    }

    pub async fn incr_like_if_present(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.adjust(biz, biz_id, FIELD_LIKE_COUNT, 1).await
    }

    pub async fn decr_like_if_present(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.adjust(biz, biz_id, FIELD_LIKE_COUNT, -1).await
    }

    pub async fn incr_collect_if_present(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.adjust(biz, biz_id, FIELD_COLLECT_COUNT, 1).await
    }

    pub async fn decr_collect_if_present(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.adjust(biz, biz_id, FIELD_COLLECT_COUNT, -1).await
    }

    pub async fn get(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<InteractionCounts>, CacheError> {
        let result = self
            .kv
            .hget_all(&keys::interactive(biz, biz_id))
            .await
            .map(|fields| counts_from_fields(&fields));
        record_lookup(CACHE_INTERACTIVE, &result);
        result
    }

    /// Writes all three counters and applies the TTL.
    pub async fn set(
        &self,
        biz: &str,
        biz_id: i64,
        counts: InteractionCounts,
    ) -> Result<(), CacheError> {
        self.kv
            .hset(
                &keys::interactive(biz, biz_id),
                &[
                    (FIELD_READ_COUNT, counts.read_count),
                    (FIELD_LIKE_COUNT, counts.like_count),
                    (FIELD_COLLECT_COUNT, counts.collect_count),
                ],
                self.ttl,
            )
            .await
    }

    async fn adjust(
        &self,
        biz: &str,
        biz_id: i64,
        field: &str,
        delta: i64,
    ) -> Result<IncrOutcome, CacheError> {
        self.kv
            .hincr_if_exists(&keys::interactive(biz, biz_id), field, delta)
            .await
    }
}

fn counts_from_fields(fields: &HashMap<String, i64>) -> Option<InteractionCounts> {
    if fields.is_empty() {
        return None;
    }
    let field = |name: &str| fields.get(name).copied().unwrap_or_default();
    Some(InteractionCounts {
        read_count: field(FIELD_READ_COUNT),
        like_count: field(FIELD_LIKE_COUNT),
        collect_count: field(FIELD_COLLECT_COUNT),
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::cache::kv::MemoryKvStore;
    use crate::domain::clock::FixedClock;

    fn cache() -> (InteractionCache, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(0));
        let kv = Arc::new(MemoryKvStore::with_clock(
            NonZeroUsize::new(16).unwrap(),
            clock.clone(),
        ));
        (InteractionCache::new(kv, Duration::from_secs(60)), clock)
    }

    #[tokio::test]
    async fn increments_on_absent_key_do_not_populate() {
        let (cache, _) = cache();
        assert_eq!(
            cache.incr_read_if_present("article", 1).await.unwrap(),
            IncrOutcome::KeyAbsent
        );
        assert!(cache.get("article", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_adjust() {
        let (cache, _) = cache();
        cache
            .set(
                "article",
                1,
                InteractionCounts {
                    read_count: 10,
                    like_count: 2,
                    collect_count: 1,
                },
            )
            .await
            .unwrap();

        cache.incr_read_if_present("article", 1).await.unwrap();
        cache.incr_like_if_present("article", 1).await.unwrap();
        cache.decr_collect_if_present("article", 1).await.unwrap();

        let counts = cache.get("article", 1).await.unwrap().expect("cached");
        assert_eq!(counts.read_count, 11);
        assert_eq!(counts.like_count, 3);
        assert_eq!(counts.collect_count, 0);
    }

    #[tokio::test]
    async fn set_applies_ttl() {
        let (cache, clock) = cache();
        cache
            .set("article", 2, InteractionCounts::default())
            .await
            .unwrap();
        clock.advance(60_000);
        assert!(cache.get("article", 2).await.unwrap().is_none());
    }
}
