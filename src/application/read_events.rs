//! Read events.
//!
//! Readers publish into a bounded in-memory queue; a consumer drains it in batches and turns
//! each batch into one `batch_incr_read` call. A full queue drops the event: read counts are
//! allowed to lag, request latency is not.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::application::error::InteractionError;
use crate::application::interactions::InteractionRepository;
use crate::application::repos::RepoError;
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::read_events";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadEvent {
    pub biz: String,
    pub biz_id: i64,
    pub user_id: i64,
}

impl ReadEvent {
    pub fn new(biz: impl Into<String>, biz_id: i64, user_id: i64) -> Self {
        Self {
            biz: biz.into(),
            biz_id,
            user_id,
        }
    }
}

pub struct ReadEventQueue {
    queue: Mutex<VecDeque<ReadEvent>>,
    limit: usize,
}

impl ReadEventQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Enqueue `event`. Returns `false` when the queue is full and the event was dropped.
    pub fn publish(&self, event: ReadEvent) -> bool {
        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.limit {
            drop(queue);
            metrics::counter!("folio_read_events_dropped_total", "reason" => "queue_full")
                .increment(1);
            warn!(biz = %event.biz, biz_id = event.biz_id, "read event queue full, event dropped");
            return false;
        }
        queue.push_back(event);
        metrics::gauge!("folio_read_event_queue_len").set(queue.len() as f64);
        true
    }

    /// Up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<ReadEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let batch: Vec<ReadEvent> = queue.drain(..count).collect();
        metrics::gauge!("folio_read_event_queue_len").set(queue.len() as f64);
        batch
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ReadEventConsumer {
    queue: Arc<ReadEventQueue>,
    interactions: Arc<InteractionRepository>,
    batch_limit: usize,
    timeout: Duration,
}

impl ReadEventConsumer {
    pub fn new(
        queue: Arc<ReadEventQueue>,
        interactions: Arc<InteractionRepository>,
        batch_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            interactions,
            batch_limit: batch_limit.max(1),
            timeout,
        }
    }

    /// Drain one batch. Returns the number of events applied.
    ///
    /// A failed batch is not re-enqueued; its events are counted as dropped.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> Result<usize, InteractionError> {
        let events = self.queue.drain(self.batch_limit);
        if events.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        let targets: Vec<(String, i64)> = events
            .into_iter()
            .map(|event| (event.biz, event.biz_id))
            .collect();
        let applied = targets.len();

        let result = tokio::time::timeout(self.timeout, self.interactions.batch_incr_read(&targets))
            .await
            .map_err(|_| InteractionError::Repo(RepoError::Timeout))
            .and_then(|outcome| outcome);
        if let Err(err) = result {
            metrics::counter!("folio_read_events_dropped_total", "reason" => "batch_failed")
                .increment(applied as u64);
            warn!(dropped = applied, error = %err, "read event batch failed, events dropped");
            return Err(err);
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("folio_read_event_batch_ms").record(elapsed_ms);
        debug!(applied, elapsed_ms, "read events applied");
        Ok(applied)
    }

    /// Consume every `interval` until `shutdown` flips to true, then drain what is left.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.consume_logged().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        while !self.queue.is_empty() {
            if self.consume_logged().await == 0 {
                break;
            }
        }
        info!("read event consumer stopped");
    }

    async fn consume_logged(&self) -> usize {
        match self.consume().await {
            Ok(applied) => applied,
            Err(err) => {
                error!(error = %err, "read event batch failed");
                0
            }
        }
    }
}
