use std::{io, process, sync::Arc};

use folio::{
    application::{
        backfill::Backfill,
        content::ContentRepository,
        error::AppError,
        interactions::InteractionRepository,
        offload::OffloadManager,
        read_events::{ReadEvent, ReadEventConsumer, ReadEventQueue},
        repos::DraftRepo,
        sync::{RetryingSync, SequentialSync, Synchronizer, TransactionalSync},
    },
    cache::{CacheConfig, ContentCache, InteractionCache, KvStore, MemoryKvStore},
    config,
    domain::types::SyncStrategy,
    infra::{db::PostgresRepositories, error::InfraError, objects::FsObjectStore, telemetry},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Check(config::CommonOverrides::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Check(_) => run_check(settings).await,
        config::Command::Republish(args) => run_republish(settings, args).await,
        config::Command::ConsumeReads(args) => run_consume_reads(settings, args).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::Migration(err.to_string())))?;
    info!(target = "folio::migrate", "migrations applied");
    Ok(())
}

async fn run_check(settings: config::Settings) -> Result<(), AppError> {
    let repositories = PostgresRepositories::new(connect(&settings).await?);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "folio::check", "database reachable");
    Ok(())
}

async fn run_republish(
    settings: config::Settings,
    args: config::RepublishArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let kv = build_kv_store(&settings);
    let content = build_content_repository(&settings, repositories.clone(), kv)?;

    let drafts: Arc<dyn DraftRepo> = repositories;
    let mut item = drafts
        .find_by_id(args.id)
        .await
        .map_err(InfraError::from)?
        .ok_or(AppError::NotFound)?;

    let id = content.publish(&mut item).await?;
    info!(
        target = "folio::republish",
        content_id = id,
        strategy = content.strategy().as_str(),
        "draft republished"
    );
    Ok(())
}

async fn run_consume_reads(
    settings: config::Settings,
    args: config::ConsumeReadsArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let kv = build_kv_store(&settings);
    let interactions = Arc::new(InteractionRepository::new(
        repositories,
        InteractionCache::new(kv, cache_config.ttl()),
        Backfill::new(cache_config.backfill_timeout()),
    ));

    let read_events = &settings.read_events;
    let queue = Arc::new(ReadEventQueue::new(read_events.queue_limit));
    let consumer = Arc::new(ReadEventConsumer::new(
        queue.clone(),
        interactions,
        read_events.batch_limit,
        read_events.batch_timeout,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = {
        let consumer = consumer.clone();
        let interval = read_events.interval;
        tokio::spawn(async move { consumer.run(interval, shutdown_rx).await })
    };

    let fed = match args.file.as_ref() {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(InfraError::from)?;
            feed_events(BufReader::new(file), &queue, &consumer, read_events.queue_limit).await
        }
        None => {
            let stdin = tokio::io::stdin();
            feed_events(BufReader::new(stdin), &queue, &consumer, read_events.queue_limit).await
        }
    };

    let _ = shutdown_tx.send(true);
    worker
        .await
        .map_err(|err| AppError::unexpected(format!("read event consumer panicked: {err}")))?;

    let published = fed?;
    info!(target = "folio::consume_reads", published, "read events consumed");
    Ok(())
}

/// Publish every parseable line; a full queue is drained inline instead of dropping events.
async fn feed_events<R>(
    reader: R,
    queue: &ReadEventQueue,
    consumer: &ReadEventConsumer,
    queue_limit: usize,
) -> Result<usize, AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0usize;

    while let Some(line) = lines.next_line().await.map_err(InfraError::from)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: ReadEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "skipping malformed read event");
                continue;
            }
        };

        if queue.len() >= queue_limit {
            consumer.consume().await?;
        }
        if queue.publish(event) {
            published += 1;
        }
    }

    Ok(published)
}

async fn connect(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = connect(settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::Migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_kv_store(settings: &config::Settings) -> Arc<dyn KvStore> {
    let config = CacheConfig::from(&settings.cache);
    Arc::new(MemoryKvStore::new(config.kv_capacity_non_zero()))
}

fn build_offload(settings: &config::Settings) -> Result<Option<OffloadManager>, AppError> {
    let objects = &settings.objects;
    if !objects.enabled {
        return Ok(None);
    }

    let store = FsObjectStore::new(objects.directory.clone()).map_err(|err: io::Error| {
        AppError::from(InfraError::configuration(format!(
            "object store directory `{}` is unusable: {err}",
            objects.directory.display()
        )))
    })?;
    Ok(Some(
        OffloadManager::new(Arc::new(store)).with_prefix(objects.prefix.clone()),
    ))
}

fn build_synchronizer(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    offload: Option<OffloadManager>,
) -> Arc<dyn Synchronizer> {
    let sync = &settings.sync;
    match (sync.strategy, offload) {
        (SyncStrategy::Transactional, None) => Arc::new(TransactionalSync::new(repositories)),
        (SyncStrategy::Transactional, Some(offload)) => {
            Arc::new(TransactionalSync::new(repositories).with_offload(offload))
        }
        (SyncStrategy::Sequential, None) => {
            Arc::new(SequentialSync::new(repositories.clone(), repositories))
        }
        (SyncStrategy::Sequential, Some(offload)) => Arc::new(
            SequentialSync::new(repositories.clone(), repositories).with_offload(offload),
        ),
        (SyncStrategy::Retrying, offload) => {
            let retrying = RetryingSync::new(repositories.clone(), repositories)
                .with_retry(sync.max_attempts, sync.retry_backoff);
            match offload {
                Some(offload) => Arc::new(retrying.with_offload(offload)),
                None => Arc::new(retrying),
            }
        }
    }
}

fn build_content_repository(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    kv: Arc<dyn KvStore>,
) -> Result<ContentRepository, AppError> {
    let offload = build_offload(settings)?;
    let sync = build_synchronizer(settings, repositories.clone(), offload.clone());
    let cache = ContentCache::new(kv, CacheConfig::from(&settings.cache));

    let content = ContentRepository::new(
        repositories.clone(),
        repositories.clone(),
        repositories,
        sync,
        cache,
    );
    Ok(match offload {
        Some(offload) => content.with_offload(offload),
        None => content,
    })
}
