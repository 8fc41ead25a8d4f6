//! Detached cache writes.
//!
//! A backfill runs on its own tokio task under its own deadline. Dropping or cancelling the
//! request that dispatched it does not abort it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    Ok,
    Error,
    Timeout,
}

impl BackfillOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            BackfillOutcome::Ok => "ok",
            BackfillOutcome::Error => "error",
            BackfillOutcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backfill {
    timeout: Duration,
}

impl Backfill {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `task` detached. The handle only reports the outcome; dropping it changes nothing.
    pub fn spawn<F, E>(&self, what: &'static str, task: F) -> JoinHandle<BackfillOutcome>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let timeout = self.timeout;
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {
                    debug!(what, "cache backfill done");
                    BackfillOutcome::Ok
                }
                Ok(Err(err)) => {
                    warn!(what, error = %err, "cache backfill failed");
                    BackfillOutcome::Error
                }
                Err(_) => {
                    warn!(what, timeout_ms = timeout.as_millis() as u64, "cache backfill timed out");
                    BackfillOutcome::Timeout
                }
            };
            metrics::counter!("folio_backfill_total", "outcome" => outcome.as_str()).increment(1);
            outcome
        })
    }
}
