//! Engagement façade: read/like/collect counters and per-user toggles.
//!
//! The relational write is authoritative and happens first. Cache counter adjustments follow
//! on a detached task and only touch hashes that are already cached; their failures are
//! logged and never roll anything back.

use std::sync::Arc;

use futures::try_join;
use tracing::{debug, warn};

use crate::application::backfill::Backfill;
use crate::application::content::bounded;
use crate::application::error::InteractionError;
use crate::application::repos::InteractionsRepo;
use crate::cache::{CacheError, IncrOutcome, InteractionCache};
use crate::domain::entities::{Interaction, InteractionCounts};

#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Read,
    Like,
    Unlike,
    Collect,
    Uncollect,
}

impl Adjustment {
    fn as_str(self) -> &'static str {
        match self {
            Adjustment::Read => "read_count",
            Adjustment::Like => "like",
            Adjustment::Unlike => "cancel_like",
            Adjustment::Collect => "collect",
            Adjustment::Uncollect => "cancel_collect",
        }
    }

    async fn apply(
        self,
        cache: &InteractionCache,
        biz: &str,
        biz_id: i64,
    ) -> Result<IncrOutcome, CacheError> {
        match self {
            Adjustment::Read => cache.incr_read_if_present(biz, biz_id).await,
            Adjustment::Like => cache.incr_like_if_present(biz, biz_id).await,
            Adjustment::Unlike => cache.decr_like_if_present(biz, biz_id).await,
            Adjustment::Collect => cache.incr_collect_if_present(biz, biz_id).await,
            Adjustment::Uncollect => cache.decr_collect_if_present(biz, biz_id).await,
        }
    }
}

pub struct InteractionRepository {
    store: Arc<dyn InteractionsRepo>,
    cache: InteractionCache,
    backfill: Backfill,
}

impl InteractionRepository {
    pub fn new(store: Arc<dyn InteractionsRepo>, cache: InteractionCache, backfill: Backfill) -> Self {
        Self {
            store,
            cache,
            backfill,
        }
    }

    pub async fn incr_read(&self, biz: &str, biz_id: i64) -> Result<(), InteractionError> {
        self.store.incr_read(biz, biz_id).await?;
        self.adjust_cache(Adjustment::Read, biz, biz_id);
        Ok(())
    }

    /// One relational transaction for the whole batch, then conditional cache increments.
    pub async fn batch_incr_read(&self, targets: &[(String, i64)]) -> Result<(), InteractionError> {
        if targets.is_empty() {
            return Ok(());
        }
        self.store.batch_incr_read(targets).await?;

        let cache = self.cache.clone();
        let targets = targets.to_vec();
        self.backfill.spawn("read_count_batch", async move {
            for (biz, biz_id) in &targets {
                if let Err(err) = cache.incr_read_if_present(biz, *biz_id).await {
                    warn!(biz = %biz, biz_id, error = %err, "read count cache increment failed");
                }
            }
            Ok::<(), CacheError>(())
        });
        Ok(())
    }

    pub async fn like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), InteractionError> {
        self.store.insert_like(biz, biz_id, user_id).await?;
        self.adjust_cache(Adjustment::Like, biz, biz_id);
        Ok(())
    }

    pub async fn cancel_like(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<(), InteractionError> {
        self.store.cancel_like(biz, biz_id, user_id).await?;
        self.adjust_cache(Adjustment::Unlike, biz, biz_id);
        Ok(())
    }

    pub async fn collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), InteractionError> {
        self.store
            .insert_collect(biz, biz_id, user_id, collection_id)
            .await?;
        self.adjust_cache(Adjustment::Collect, biz, biz_id);
        Ok(())
    }

    pub async fn cancel_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), InteractionError> {
        self.store
            .cancel_collect(biz, biz_id, user_id, collection_id)
            .await?;
        self.adjust_cache(Adjustment::Uncollect, biz, biz_id);
        Ok(())
    }

    /// Counters from the cache, falling back to the store. Unknown items count as zero.
    pub async fn get_counts(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<InteractionCounts, InteractionError> {
        match bounded(self.backfill.timeout(), self.cache.get(biz, biz_id)).await {
            Ok(Some(counts)) => return Ok(counts),
            Ok(None) => {}
            Err(err) => warn!(biz, biz_id, error = %err, "interaction cache read failed"),
        }

        let Some(record) = self.store.find_counts(biz, biz_id).await? else {
            return Ok(InteractionCounts::default());
        };

        let cache = self.cache.clone();
        let biz_owned = biz.to_string();
        let counts = record.counts;
        self.backfill.spawn("interactive", async move {
            cache.set(&biz_owned, biz_id, counts).await
        });
        Ok(counts)
    }

    pub async fn liked(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<bool, InteractionError> {
        let record = self.store.find_like(biz, biz_id, user_id).await?;
        Ok(record.is_some_and(|like| like.status.is_active()))
    }

    pub async fn collected(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<bool, InteractionError> {
        let record = self.store.find_collect(biz, biz_id, user_id).await?;
        Ok(record.is_some_and(|collect| collect.status.is_active()))
    }

    /// Counters first; the per-user flags are fetched only after they succeed, together.
    pub async fn get(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Interaction, InteractionError> {
        let counts = self.get_counts(biz, biz_id).await?;
        let (liked, collected) = try_join!(
            self.liked(biz, biz_id, user_id),
            self.collected(biz, biz_id, user_id)
        )?;

        Ok(Interaction {
            biz: biz.to_string(),
            biz_id,
            counts,
            liked,
            collected,
        })
    }

    fn adjust_cache(&self, adjustment: Adjustment, biz: &str, biz_id: i64) {
        let cache = self.cache.clone();
        let biz = biz.to_string();
        self.backfill.spawn(adjustment.as_str(), async move {
            let outcome = adjustment.apply(&cache, &biz, biz_id).await?;
            if outcome == IncrOutcome::KeyAbsent {
                debug!(biz = %biz, biz_id, op = adjustment.as_str(), "counter not cached");
            }
            Ok::<(), CacheError>(())
        });
    }
}
