use async_trait::async_trait;

use crate::{
    application::repos::{ContentTxRepo, DraftRepo, RepoError},
    domain::{
        entities::{ContentItem, PublishedItem},
        types::ContentStatus,
    },
};

use super::{
    PostgresRepositories,
    drafts::{insert_draft, update_draft, update_draft_status},
    published::{update_published_status, upsert_published},
    util::map_sqlx_error,
};

#[async_trait]
impl ContentTxRepo for PostgresRepositories {
    async fn sync_in_tx(&self, item: &ContentItem, inline_body: bool) -> Result<i64, RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let id = if item.is_new() {
            insert_draft(&mut tx, item, now).await?
        } else {
            update_draft(&mut tx, item, now).await?;
            item.id
        };

        let mut synced = item.clone();
        synced.id = id;
        upsert_published(&mut tx, &PublishedItem::from_draft(&synced, inline_body), now).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(id)
    }

    async fn sync_status_in_tx(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        update_draft_status(&mut tx, author_id, id, status, now).await?;
        update_published_status(&mut tx, id, status, now).await?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn find_draft(&self, id: i64) -> Result<Option<ContentItem>, RepoError> {
        DraftRepo::find_by_id(self, id).await
    }
}
