use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    application::repos::{PublishedRepo, RepoError},
    domain::{entities::PublishedItem, types::ContentStatus},
};

use super::{PostgresRepositories, util::map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PublishedRow {
    id: i64,
    title: String,
    body: String,
    author_id: i64,
    status: i16,
    created_at: i64,
    updated_at: i64,
}

impl From<PublishedRow> for PublishedItem {
    fn from(row: PublishedRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            author_id: row.author_id,
            status: ContentStatus::from_code(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insert, or overwrite everything but `created_at` on id conflict.
pub(super) async fn upsert_published(
    conn: &mut PgConnection,
    item: &PublishedItem,
    now: i64,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO published_articles (id, title, body, author_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title,
            body = EXCLUDED.body,
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(item.id)
    .bind(&item.title)
    .bind(&item.body)
    .bind(item.author_id)
    .bind(item.status.code())
    .bind(now)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// Never-published items have no row; the update is then a no-op.
pub(super) async fn update_published_status(
    conn: &mut PgConnection,
    id: i64,
    status: ContentStatus,
    now: i64,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        UPDATE published_articles
        SET status = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(status.code())
    .bind(now)
    .bind(id)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl PublishedRepo for PostgresRepositories {
    async fn upsert(&self, item: &PublishedItem) -> Result<(), RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        upsert_published(&mut conn, item, self.now()).await
    }

    async fn update_status(&self, id: i64, status: ContentStatus) -> Result<(), RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        update_published_status(&mut conn, id, status, self.now()).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PublishedItem>, RepoError> {
        let row = sqlx::query_as::<_, PublishedRow>(
            r#"
            SELECT id, title, body, author_id, status, created_at, updated_at
            FROM published_articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PublishedItem::from))
    }
}
