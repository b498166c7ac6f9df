use crate::validator::{self, RejectionReason};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use wxmon_alert::cache::RuleCache;
use wxmon_alert::evaluator::{evaluate, OpenAlert};
use wxmon_alert::lifecycle::AlertLifecycleManager;
use wxmon_common::types::Reading;
use wxmon_storage::{StorageError, WeatherStore};

/// How one message ended. Rejections are terminal per message; only
/// [`ProcessError`] sends a message back to the broker.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Reading persisted (first delivery); `alerts` lifecycle events
    /// were applied.
    Stored { alerts: usize },
    /// Redelivery of an already-persisted reading. Evaluation still
    /// ran; the lifecycle manager absorbs repeats.
    Duplicate,
    /// Validation failed; the message must be acked away.
    Rejected(RejectionReason),
}

/// A transient infrastructure failure; the consumer nacks and the
/// broker redelivers within the bounded attempt budget.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Ingest: storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Ingest: persistence pipeline timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs the validate → persist → evaluate → notify pipeline for one
/// message. One instance is shared by all consumer workers; it holds no
/// per-message state.
pub struct Processor {
    store: Arc<WeatherStore>,
    rules: Arc<RuleCache>,
    lifecycle: Arc<AlertLifecycleManager>,
    clock_skew: chrono::Duration,
    io_timeout: Duration,
}

impl Processor {
    pub fn new(
        store: Arc<WeatherStore>,
        rules: Arc<RuleCache>,
        lifecycle: Arc<AlertLifecycleManager>,
        clock_skew_secs: u64,
        io_timeout_secs: u64,
    ) -> Self {
        Self {
            store,
            rules,
            lifecycle,
            clock_skew: chrono::Duration::seconds(clock_skew_secs as i64),
            io_timeout: Duration::from_secs(io_timeout_secs),
        }
    }

    pub async fn process(&self, payload: &[u8]) -> Result<ProcessOutcome, ProcessError> {
        let raw = match validator::decode(payload) {
            Ok(raw) => raw,
            Err(reason) => return Ok(ProcessOutcome::Rejected(reason)),
        };
        let reading = match validator::validate(raw, Utc::now(), self.clock_skew) {
            Ok(reading) => reading,
            Err(reason) => return Ok(ProcessOutcome::Rejected(reason)),
        };

        // Everything I/O-bound runs under one bounded timeout; a hung
        // store or notifier surfaces as a transient failure, never an
        // indefinitely stuck worker.
        match tokio::time::timeout(self.io_timeout, self.persist_and_evaluate(&reading)).await {
            Ok(result) => result.map_err(ProcessError::from),
            Err(_) => Err(ProcessError::Timeout(self.io_timeout)),
        }
    }

    async fn persist_and_evaluate(&self, reading: &Reading) -> Result<ProcessOutcome, StorageError> {
        let inserted = self.store.insert_reading(reading).await?;

        let open_rows = self
            .store
            .open_alerts_for_station(&reading.station_id)
            .await?;
        let open: Vec<OpenAlert> = open_rows
            .iter()
            .map(|row| OpenAlert {
                alert_type: row.alert_type.clone(),
                threshold: row.threshold_value,
            })
            .collect();

        let rules = self.rules.snapshot();
        let events = evaluate(reading, &rules, &open);
        for event in &events {
            self.lifecycle.apply(event).await?;
        }

        if inserted {
            Ok(ProcessOutcome::Stored {
                alerts: events.len(),
            })
        } else {
            Ok(ProcessOutcome::Duplicate)
        }
    }
}
