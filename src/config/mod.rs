//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::sync::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF};
use crate::domain::entities::DEFAULT_ABSTRACT_CHARS;
use crate::domain::types::SyncStrategy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 15 * 60;
const DEFAULT_FIRST_PAGE_LIMIT: u32 = 100;
const DEFAULT_PRECACHE_MAX_BYTES: usize = 1024 * 1024;
const DEFAULT_BACKFILL_TIMEOUT_MS: u64 = 1000;
const DEFAULT_KV_CAPACITY: usize = 10_000;
const DEFAULT_OBJECT_DIR: &str = "objects";
const DEFAULT_READ_QUEUE_LIMIT: usize = 10_000;
const DEFAULT_READ_BATCH_LIMIT: usize = 100;
const DEFAULT_READ_INTERVAL_MS: u64 = 1000;
const DEFAULT_READ_BATCH_TIMEOUT_MS: u64 = 5000;

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Draft/published content sync and interaction cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate(CommonOverrides),
    /// Verify database connectivity.
    Check(CommonOverrides),
    /// Re-run the publish of a stored draft with the configured strategy.
    Republish(RepublishArgs),
    /// Apply read events from a newline-delimited JSON file (stdin when omitted).
    #[command(name = "consume-reads")]
    ConsumeReads(ConsumeReadsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON (`--log-json` or `--log-json=<BOOL>`).
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RepublishArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Override the sync strategy (transactional|sequential|retrying).
    #[arg(long = "sync-strategy", value_name = "STRATEGY")]
    pub sync_strategy: Option<String>,

    /// Override the number of published-store attempts of the retrying strategy.
    #[arg(long = "sync-max-attempts", value_name = "COUNT")]
    pub sync_max_attempts: Option<u32>,

    /// Offload bodies into the filesystem object store (`--objects-enabled=<BOOL>` to set false).
    #[arg(
        long = "objects-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub objects_enabled: Option<bool>,

    /// Override the object store directory.
    #[arg(long = "objects-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub objects_directory: Option<PathBuf>,

    /// Content id of the draft to publish.
    #[arg(value_name = "ID")]
    pub id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct ConsumeReadsArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Override the number of events applied per batch.
    #[arg(long = "batch-limit", value_name = "COUNT")]
    pub batch_limit: Option<usize>,

    /// Override the consumer interval in milliseconds.
    #[arg(long = "interval-ms", value_name = "MILLIS")]
    pub interval_ms: Option<u64>,

    /// Input file; stdin when omitted.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub sync: SyncSettings,
    pub objects: ObjectSettings,
    pub read_events: ReadEventSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
    pub abstract_chars: usize,
    pub first_page_limit: u32,
    pub precache_enabled: bool,
    /// `None` warms the first listed item (`precache_id <= 0` or unset).
    pub precache_id: Option<i64>,
    pub precache_max_bytes: usize,
    pub backfill_timeout_ms: u64,
    pub kv_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub strategy: SyncStrategy,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct ReadEventSettings {
    pub queue_limit: usize,
    pub batch_limit: usize,
    pub interval: Duration,
    pub batch_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Migrate(overrides)) | Some(Command::Check(overrides)) => {
            raw.apply_common_overrides(overrides)
        }
        Some(Command::Republish(args)) => raw.apply_republish_overrides(args),
        Some(Command::ConsumeReads(args)) => raw.apply_consume_reads_overrides(args),
        None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    sync: RawSyncSettings,
    objects: RawObjectSettings,
    read_events: RawReadEventSettings,
}

impl RawSettings {
    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_republish_overrides(&mut self, args: &RepublishArgs) {
        self.apply_common_overrides(&args.overrides);
        if let Some(strategy) = args.sync_strategy.as_ref() {
            self.sync.strategy = Some(strategy.clone());
        }
        if let Some(attempts) = args.sync_max_attempts {
            self.sync.max_attempts = Some(attempts);
        }
        if let Some(enabled) = args.objects_enabled {
            self.objects.enabled = Some(enabled);
        }
        if let Some(directory) = args.objects_directory.as_ref() {
            self.objects.directory = Some(directory.clone());
        }
    }

    fn apply_consume_reads_overrides(&mut self, args: &ConsumeReadsArgs) {
        self.apply_common_overrides(&args.overrides);
        if let Some(limit) = args.batch_limit {
            self.read_events.batch_limit = Some(limit);
        }
        if let Some(interval) = args.interval_ms {
            self.read_events.interval_ms = Some(interval);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            sync,
            objects,
            read_events,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            sync: build_sync_settings(sync)?,
            objects: build_object_settings(objects),
            read_events: build_read_event_settings(read_events)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = positive(
        cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.ttl_seconds",
    )?;
    let abstract_chars = positive(
        cache.abstract_chars.unwrap_or(DEFAULT_ABSTRACT_CHARS),
        "cache.abstract_chars",
    )?;
    let first_page_limit = positive(
        cache.first_page_limit.unwrap_or(DEFAULT_FIRST_PAGE_LIMIT),
        "cache.first_page_limit",
    )?;
    let backfill_timeout_ms = positive(
        cache
            .backfill_timeout_ms
            .unwrap_or(DEFAULT_BACKFILL_TIMEOUT_MS),
        "cache.backfill_timeout_ms",
    )?;
    let kv_capacity = positive(
        cache.kv_capacity.unwrap_or(DEFAULT_KV_CAPACITY),
        "cache.kv_capacity",
    )?;

    let precache_id = cache.precache_id.filter(|id| *id > 0);

    Ok(CacheSettings {
        ttl_seconds,
        abstract_chars,
        first_page_limit,
        precache_enabled: cache.precache_enabled.unwrap_or(true),
        precache_id,
        precache_max_bytes: cache
            .precache_max_bytes
            .unwrap_or(DEFAULT_PRECACHE_MAX_BYTES),
        backfill_timeout_ms,
        kv_capacity,
    })
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let strategy = match sync.strategy {
        Some(value) => SyncStrategy::try_from(value.trim()).map_err(|_| {
            LoadError::invalid(
                "sync.strategy",
                format!("unknown strategy `{value}` (transactional|sequential|retrying)"),
            )
        })?,
        None => SyncStrategy::Transactional,
    };

    let max_attempts = non_zero_u32(
        sync.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).into(),
        "sync.max_attempts",
    )?;
    let retry_backoff = sync
        .retry_backoff_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_RETRY_BACKOFF);

    Ok(SyncSettings {
        strategy,
        max_attempts,
        retry_backoff,
    })
}

fn build_object_settings(objects: RawObjectSettings) -> ObjectSettings {
    ObjectSettings {
        enabled: objects.enabled.unwrap_or(false),
        directory: objects
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJECT_DIR)),
        prefix: objects.prefix.unwrap_or_default(),
    }
}

fn build_read_event_settings(
    read_events: RawReadEventSettings,
) -> Result<ReadEventSettings, LoadError> {
    let queue_limit = positive(
        read_events.queue_limit.unwrap_or(DEFAULT_READ_QUEUE_LIMIT),
        "read_events.queue_limit",
    )?;
    let batch_limit = positive(
        read_events.batch_limit.unwrap_or(DEFAULT_READ_BATCH_LIMIT),
        "read_events.batch_limit",
    )?;
    let interval_ms = positive(
        read_events.interval_ms.unwrap_or(DEFAULT_READ_INTERVAL_MS),
        "read_events.interval_ms",
    )?;
    let batch_timeout_ms = positive(
        read_events
            .batch_timeout_ms
            .unwrap_or(DEFAULT_READ_BATCH_TIMEOUT_MS),
        "read_events.batch_timeout_ms",
    )?;

    Ok(ReadEventSettings {
        queue_limit,
        batch_limit,
        interval: Duration::from_millis(interval_ms),
        batch_timeout: Duration::from_millis(batch_timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<u64>,
    abstract_chars: Option<usize>,
    first_page_limit: Option<u32>,
    precache_enabled: Option<bool>,
    precache_id: Option<i64>,
    precache_max_bytes: Option<usize>,
    backfill_timeout_ms: Option<u64>,
    kv_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    strategy: Option<String>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObjectSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReadEventSettings {
    queue_limit: Option<usize>,
    batch_limit: Option<usize>,
    interval_ms: Option<u64>,
    batch_timeout_ms: Option<u64>,
}

fn positive<T>(value: T, key: &'static str) -> Result<T, LoadError>
where
    T: PartialOrd + Default,
{
    if value <= T::default() {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
