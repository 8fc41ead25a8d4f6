use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_cache_hit_total",
            Unit::Count,
            "Cache lookups answered from the cache, by cache."
        );
        describe_counter!(
            "folio_cache_miss_total",
            Unit::Count,
            "Cache lookups that found no entry, by cache."
        );
        describe_counter!(
            "folio_cache_error_total",
            Unit::Count,
            "Cache lookups that failed and fell back to the store, by cache."
        );
        describe_counter!(
            "folio_backfill_total",
            Unit::Count,
            "Detached cache writes, by outcome."
        );
        describe_counter!(
            "folio_sync_partial_total",
            Unit::Count,
            "Publishes or status changes left partially synchronized, by failed stage."
        );
        describe_counter!(
            "folio_read_events_dropped_total",
            Unit::Count,
            "Read events dropped because the queue was full."
        );
        describe_gauge!(
            "folio_read_event_queue_len",
            Unit::Count,
            "Read events waiting to be applied."
        );
        describe_histogram!(
            "folio_read_event_batch_ms",
            Unit::Milliseconds,
            "Latency of applying one read event batch."
        );
    });
}
