//! Postgres adapter behavior. Needs `DATABASE_URL`.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use folio::application::backfill::Backfill;
use folio::application::error::InteractionError;
use folio::application::interactions::InteractionRepository;
use folio::application::repos::{
    AuthorsRepo, ContentTxRepo, DraftRepo, InteractionsRepo, PublishedRepo, RepoError,
};
use folio::application::sync::{RetryingSync, SequentialSync, Synchronizer, TransactionalSync};
use folio::cache::{InteractionCache, MemoryKvStore};
use folio::domain::clock::FixedClock;
use folio::domain::entities::{ContentItem, PublishedItem};
use folio::domain::types::{ContentStatus, ToggleStatus};
use folio::infra::db::PostgresRepositories;
use sqlx::PgPool;

fn repositories(pool: PgPool) -> (Arc<PostgresRepositories>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(1_000));
    (
        Arc::new(PostgresRepositories::with_clock(pool, clock.clone())),
        clock,
    )
}

#[sqlx::test(migrations = "./migrations")]
async fn schema_has_uniqueness_indexes(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT tablename::text, indexdef FROM pg_indexes \
         WHERE schemaname = 'public' AND indexdef LIKE 'CREATE UNIQUE%'",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch indexes");

    let defs: HashSet<(String, String)> = rows.into_iter().collect();
    for (table, columns) in [
        ("interactives", "(biz_id, biz)"),
        ("user_like_biz", "(uid, biz_id, biz)"),
        ("user_collection_biz", "(uid, biz_id, biz)"),
    ] {
        assert!(
            defs.iter()
                .any(|(name, def)| name == table && def.contains(columns)),
            "missing unique index on {table} {columns}"
        );
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn transactional_publish_keeps_ids_and_created_at(pool: PgPool) {
    let (repos, clock) = repositories(pool);
    let sync = TransactionalSync::new(repos.clone());

    let mut item = ContentItem::draft(7, "T", "B");
    item.status = ContentStatus::Published;
    let id = sync.publish(&mut item).await.expect("publish");
    assert_eq!(item.id, id);

    let first = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(first.id, id);
    assert_eq!(first.body, "B");
    assert_eq!(first.status, ContentStatus::Published);

    clock.advance(1_000);
    item.title = "T2".to_string();
    sync.publish(&mut item).await.expect("republish");

    let second = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(second.title, "T2");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);

    let draft = DraftRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("draft");
    assert_eq!(draft.status, second.status);
    assert_eq!(draft.body, second.body);
}

#[sqlx::test(migrations = "./migrations")]
async fn transactional_sync_rolls_back_on_foreign_update(pool: PgPool) {
    let (repos, _) = repositories(pool);

    let item = ContentItem::draft(7, "T", "B");
    let id = repos.sync_in_tx(&item, true).await.expect("sync");

    let mut forged = ContentItem::draft(8, "hijack", "x");
    forged.id = id;
    let err = repos
        .sync_in_tx(&forged, true)
        .await
        .expect_err("not the owner");
    assert!(matches!(err, RepoError::NotFoundOrForbidden));

    let published = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(published.title, "T");
}

#[sqlx::test(migrations = "./migrations")]
async fn status_change_reaches_both_rows(pool: PgPool) {
    let (repos, _) = repositories(pool);
    let sync = SequentialSync::new(repos.clone(), repos.clone());

    let mut item = ContentItem::draft(7, "T", "B");
    item.status = ContentStatus::Published;
    let id = sync.publish(&mut item).await.expect("publish");

    sync.sync_status(7, id, ContentStatus::Private)
        .await
        .expect("withdraw");

    let draft = DraftRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("draft");
    let published = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(draft.status, ContentStatus::Private);
    assert_eq!(published.status, ContentStatus::Private);

    let err = sync
        .sync_status(8, id, ContentStatus::Published)
        .await
        .expect_err("foreign author");
    assert!(matches!(
        err.repo_error(),
        Some(RepoError::NotFoundOrForbidden)
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn retrying_publish_succeeds_against_a_healthy_store(pool: PgPool) {
    let (repos, _) = repositories(pool);
    let sync = RetryingSync::new(repos.clone(), repos.clone())
        .with_retry(NonZeroU32::new(3).expect("non-zero"), Duration::ZERO);

    let mut item = ContentItem::draft(7, "T", "B");
    let id = sync.publish(&mut item).await.expect("publish");

    let published: PublishedItem = PublishedRepo::find_by_id(repos.as_ref(), id)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(published.id, id);
}

#[sqlx::test(migrations = "./migrations")]
async fn listing_orders_by_update_and_pages(pool: PgPool) {
    let (repos, clock) = repositories(pool);

    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        clock.advance(10);
        ids.push(
            repos
                .insert(&ContentItem::draft(7, title, "body"))
                .await
                .expect("insert"),
        );
    }
    repos
        .insert(&ContentItem::draft(8, "other", "body"))
        .await
        .expect("insert");

    let all = repos.list_by_author(7, 0, 10).await.expect("list");
    let listed: Vec<i64> = all.iter().map(|item| item.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);

    let page = repos.list_by_author(7, 1, 1).await.expect("page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[1]);
}

#[sqlx::test(migrations = "./migrations")]
async fn like_toggles_are_guarded_in_both_directions(pool: PgPool) {
    let (repos, _) = repositories(pool);
    let kv = Arc::new(MemoryKvStore::new(
        std::num::NonZeroUsize::new(16).expect("non-zero"),
    ));
    let interactions = InteractionRepository::new(
        repos.clone(),
        InteractionCache::new(kv, Duration::from_secs(60)),
        Backfill::new(Duration::from_secs(1)),
    );

    interactions.like("article", 1, 42).await.expect("like");
    let err = interactions
        .like("article", 1, 42)
        .await
        .expect_err("already liked");
    assert!(matches!(err, InteractionError::IllegalOperation { .. }));

    let counts = repos
        .find_counts("article", 1)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(counts.counts.like_count, 1);

    interactions
        .cancel_like("article", 1, 42)
        .await
        .expect("cancel");
    let err = interactions
        .cancel_like("article", 1, 42)
        .await
        .expect_err("already cancelled");
    assert!(matches!(err, InteractionError::IllegalOperation { .. }));

    let counts = repos
        .find_counts("article", 1)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(counts.counts.like_count, 0);

    let like = repos
        .find_like("article", 1, 42)
        .await
        .expect("lookup")
        .expect("toggle row");
    assert_eq!(like.status, ToggleStatus::Inactive);
}

#[sqlx::test(migrations = "./migrations")]
async fn collect_round_trip_and_batch_reads(pool: PgPool) {
    let (repos, _) = repositories(pool);

    repos
        .insert_collect("article", 2, 42, 9)
        .await
        .expect("collect");
    let err = repos
        .cancel_collect("article", 2, 42, 10)
        .await
        .expect_err("wrong collection");
    assert!(matches!(err, RepoError::IllegalTransition { .. }));
    repos
        .cancel_collect("article", 2, 42, 9)
        .await
        .expect("cancel");

    repos
        .batch_incr_read(&[("article".to_string(), 2), ("article".to_string(), 2)])
        .await
        .expect("batch");

    let counts = repos
        .find_counts("article", 2)
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(counts.counts.read_count, 2);
    assert_eq!(counts.counts.collect_count, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn author_display_name_lookup(pool: PgPool) {
    sqlx::query("INSERT INTO users (id, nickname, created_at, updated_at) VALUES (7, 'Ada', 0, 0)")
        .execute(&pool)
        .await
        .expect("seed user");
    let (repos, _) = repositories(pool);

    assert_eq!(
        repos.display_name(7).await.expect("lookup").as_deref(),
        Some("Ada")
    );
    assert_eq!(repos.display_name(8).await.expect("lookup"), None);
}
