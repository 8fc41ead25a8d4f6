use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    application::repos::{InteractionsRepo, RepoError},
    domain::{
        entities::{CollectRecord, CounterRecord, InteractionCounts, LikeRecord},
        types::ToggleStatus,
    },
};

use super::{
    PostgresRepositories,
    util::{expect_transition, map_sqlx_error},
};

#[derive(sqlx::FromRow)]
struct CounterRow {
    biz: String,
    biz_id: i64,
    read_cnt: i64,
    like_cnt: i64,
    collect_cnt: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<CounterRow> for CounterRecord {
    fn from(row: CounterRow) -> Self {
        Self {
            biz: row.biz,
            biz_id: row.biz_id,
            counts: InteractionCounts {
                read_count: row.read_cnt,
                like_count: row.like_cnt,
                collect_count: row.collect_cnt,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LikeRow {
    uid: i64,
    biz: String,
    biz_id: i64,
    status: i16,
    created_at: i64,
    updated_at: i64,
}

impl From<LikeRow> for LikeRecord {
    fn from(row: LikeRow) -> Self {
        Self {
            user_id: row.uid,
            biz: row.biz,
            biz_id: row.biz_id,
            status: ToggleStatus::from_code(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CollectRow {
    uid: i64,
    biz: String,
    biz_id: i64,
    cid: i64,
    status: i16,
    created_at: i64,
    updated_at: i64,
}

impl From<CollectRow> for CollectRecord {
    fn from(row: CollectRow) -> Self {
        Self {
            user_id: row.uid,
            biz: row.biz,
            biz_id: row.biz_id,
            collection_id: row.cid,
            status: ToggleStatus::from_code(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Counter columns the toggles adjust.
#[derive(Clone, Copy)]
enum Counter {
    Read,
    Like,
    Collect,
}

impl Counter {
    fn column(self) -> &'static str {
        match self {
            Counter::Read => "read_cnt",
            Counter::Like => "like_cnt",
            Counter::Collect => "collect_cnt",
        }
    }
}

/// Upsert-with-increment: creates the row at 1 when absent.
async fn increment(
    conn: &mut PgConnection,
    counter: Counter,
    biz: &str,
    biz_id: i64,
    now: i64,
) -> Result<(), RepoError> {
    let column = counter.column();
    let statement = format!(
        "INSERT INTO interactives (biz, biz_id, {column}, created_at, updated_at) \
         VALUES ($1, $2, 1, $3, $3) \
         ON CONFLICT (biz_id, biz) DO UPDATE \
         SET {column} = interactives.{column} + 1, updated_at = EXCLUDED.updated_at"
    );
    sqlx::query(&statement)
        .bind(biz)
        .bind(biz_id)
        .bind(now)
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Decrement floored at zero.
async fn decrement(
    conn: &mut PgConnection,
    counter: Counter,
    biz: &str,
    biz_id: i64,
    now: i64,
) -> Result<(), RepoError> {
    let column = counter.column();
    let statement = format!(
        "UPDATE interactives \
         SET {column} = GREATEST({column} - 1, 0), updated_at = $1 \
         WHERE biz_id = $2 AND biz = $3"
    );
    sqlx::query(&statement)
        .bind(now)
        .bind(biz_id)
        .bind(biz)
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl InteractionsRepo for PostgresRepositories {
    async fn incr_read(&self, biz: &str, biz_id: i64) -> Result<(), RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        increment(&mut conn, Counter::Read, biz, biz_id, self.now()).await
    }

    async fn batch_incr_read(&self, targets: &[(String, i64)]) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;
        for (biz, biz_id) in targets {
            increment(&mut tx, Counter::Read, biz, *biz_id, now).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn insert_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_like_biz (uid, biz, biz_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (uid, biz_id, biz) DO UPDATE
            SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            WHERE user_like_biz.status = $6
            "#,
        )
        .bind(user_id)
        .bind(biz)
        .bind(biz_id)
        .bind(ToggleStatus::Active.code())
        .bind(now)
        .bind(ToggleStatus::Inactive.code())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_transition(result.rows_affected(), "like is already active")?;

        increment(&mut tx, Counter::Like, biz, biz_id, now).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn cancel_like(&self, biz: &str, biz_id: i64, user_id: i64) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_like_biz
            SET status = $1, updated_at = $2
            WHERE uid = $3 AND biz_id = $4 AND biz = $5 AND status = $6
            "#,
        )
        .bind(ToggleStatus::Inactive.code())
        .bind(now)
        .bind(user_id)
        .bind(biz_id)
        .bind(biz)
        .bind(ToggleStatus::Active.code())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_transition(result.rows_affected(), "no active like to cancel")?;

        decrement(&mut tx, Counter::Like, biz, biz_id, now).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn insert_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_collection_biz (uid, biz, biz_id, cid, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (uid, biz_id, biz) DO UPDATE
            SET status = EXCLUDED.status, cid = EXCLUDED.cid, updated_at = EXCLUDED.updated_at
            WHERE user_collection_biz.status = $7
            "#,
        )
        .bind(user_id)
        .bind(biz)
        .bind(biz_id)
        .bind(collection_id)
        .bind(ToggleStatus::Active.code())
        .bind(now)
        .bind(ToggleStatus::Inactive.code())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_transition(result.rows_affected(), "item is already collected")?;

        increment(&mut tx, Counter::Collect, biz, biz_id, now).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn cancel_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
        collection_id: i64,
    ) -> Result<(), RepoError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_collection_biz
            SET status = $1, updated_at = $2
            WHERE uid = $3 AND biz_id = $4 AND biz = $5 AND cid = $6 AND status = $7
            "#,
        )
        .bind(ToggleStatus::Inactive.code())
        .bind(now)
        .bind(user_id)
        .bind(biz_id)
        .bind(biz)
        .bind(collection_id)
        .bind(ToggleStatus::Active.code())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_transition(result.rows_affected(), "no active collect in this collection")?;

        decrement(&mut tx, Counter::Collect, biz, biz_id, now).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn find_counts(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<CounterRecord>, RepoError> {
        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT biz, biz_id, read_cnt, like_cnt, collect_cnt, created_at, updated_at
            FROM interactives
            WHERE biz_id = $1 AND biz = $2
            "#,
        )
        .bind(biz_id)
        .bind(biz)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CounterRecord::from))
    }

    async fn find_like(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<LikeRecord>, RepoError> {
        let row = sqlx::query_as::<_, LikeRow>(
            r#"
            SELECT uid, biz, biz_id, status, created_at, updated_at
            FROM user_like_biz
            WHERE uid = $1 AND biz_id = $2 AND biz = $3
            "#,
        )
        .bind(user_id)
        .bind(biz_id)
        .bind(biz)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(LikeRecord::from))
    }

    async fn find_collect(
        &self,
        biz: &str,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<CollectRecord>, RepoError> {
        let row = sqlx::query_as::<_, CollectRow>(
            r#"
            SELECT uid, biz, biz_id, cid, status, created_at, updated_at
            FROM user_collection_biz
            WHERE uid = $1 AND biz_id = $2 AND biz = $3
            "#,
        )
        .bind(user_id)
        .bind(biz_id)
        .bind(biz)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CollectRecord::from))
    }
}
