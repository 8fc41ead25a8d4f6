use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    application::repos::{DraftRepo, RepoError},
    domain::{
        entities::{Author, ContentItem},
        types::ContentStatus,
    },
};

use super::{
    PostgresRepositories, to_db_offset,
    util::{expect_owned, map_sqlx_error},
};

#[derive(sqlx::FromRow)]
struct DraftRow {
    id: i64,
    title: String,
    body: String,
    author_id: i64,
    status: i16,
    created_at: i64,
    updated_at: i64,
}

impl From<DraftRow> for ContentItem {
    fn from(row: DraftRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            author: Author::new(row.author_id),
            status: ContentStatus::from_code(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) async fn insert_draft(
    conn: &mut PgConnection,
    item: &ContentItem,
    now: i64,
) -> Result<i64, RepoError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO articles (title, body, author_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id
        "#,
    )
    .bind(&item.title)
    .bind(&item.body)
    .bind(item.author.id)
    .bind(item.status.code())
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(map_sqlx_error)
}

pub(super) async fn update_draft(
    conn: &mut PgConnection,
    item: &ContentItem,
    now: i64,
) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"
        UPDATE articles
        SET title = $1, body = $2, status = $3, updated_at = $4
        WHERE id = $5 AND author_id = $6
        "#,
    )
    .bind(&item.title)
    .bind(&item.body)
    .bind(item.status.code())
    .bind(now)
    .bind(item.id)
    .bind(item.author.id)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;

    expect_owned(result.rows_affected())
}

pub(super) async fn update_draft_status(
    conn: &mut PgConnection,
    author_id: i64,
    id: i64,
    status: ContentStatus,
    now: i64,
) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"
        UPDATE articles
        SET status = $1, updated_at = $2
        WHERE id = $3 AND author_id = $4
        "#,
    )
    .bind(status.code())
    .bind(now)
    .bind(id)
    .bind(author_id)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;

    expect_owned(result.rows_affected())
}

#[async_trait]
impl DraftRepo for PostgresRepositories {
    async fn insert(&self, item: &ContentItem) -> Result<i64, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        insert_draft(&mut conn, item, self.now()).await
    }

    async fn update_by_id(&self, item: &ContentItem) -> Result<(), RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        update_draft(&mut conn, item, self.now()).await
    }

    async fn update_status(
        &self,
        author_id: i64,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        update_draft_status(&mut conn, author_id, id, status, self.now()).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, RepoError> {
        let row = sqlx::query_as::<_, DraftRow>(
            r#"
            SELECT id, title, body, author_id, status, created_at, updated_at
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ContentItem::from))
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ContentItem>, RepoError> {
        let rows = sqlx::query_as::<_, DraftRow>(
            r#"
            SELECT id, title, body, author_id, status, created_at, updated_at
            FROM articles
            WHERE author_id = $1
            ORDER BY updated_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(author_id)
        .bind(to_db_offset(limit))
        .bind(to_db_offset(offset))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ContentItem::from).collect())
    }
}
