use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use wxmon_alert::lifecycle::AlertLifecycleManager;
use wxmon_common::types::{AlertAction, AlertEvent, Severity, STATION_NOT_REPORTING};
use wxmon_storage::{Result, WeatherStore};

/// Time-driven watchdog for stations that stop sending telemetry.
///
/// Each tick sweeps the station projection: silent stations get a
/// `STATION_NOT_REPORTING` trigger, reporting stations a clear, both
/// through the same lifecycle manager the evaluator feeds, so dedup,
/// notification and resolution bookkeeping come for free. The sweep
/// runs as one sequential task; a tick never overlaps the previous one.
pub struct StationLivenessMonitor {
    store: Arc<WeatherStore>,
    lifecycle: Arc<AlertLifecycleManager>,
    tick_secs: u64,
    staleness: Duration,
    severity: Severity,
}

impl StationLivenessMonitor {
    pub fn new(
        store: Arc<WeatherStore>,
        lifecycle: Arc<AlertLifecycleManager>,
        tick_secs: u64,
        staleness_secs: u64,
        severity: Severity,
    ) -> Self {
        Self {
            store,
            lifecycle,
            tick_secs,
            staleness: Duration::seconds(staleness_secs as i64),
            severity,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            tick_secs = self.tick_secs,
            staleness_secs = self.staleness.num_seconds(),
            "Station liveness monitor started"
        );
        let mut tick = interval(std::time::Duration::from_secs(self.tick_secs));
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.scan().await {
                        tracing::error!(error = %e, "Liveness scan failed");
                    }
                }
            }
        }
        tracing::info!("Station liveness monitor stopped");
    }

    /// One sweep over every known station.
    pub async fn scan(&self) -> Result<()> {
        let now = Utc::now();
        for station in self.store.list_stations().await? {
            let Some(last_seen) = station.last_reading_at else {
                continue;
            };
            let age = now - last_seen;
            let stale = age > self.staleness;

            let event = AlertEvent {
                station_id: station.station_id.clone(),
                alert_type: STATION_NOT_REPORTING.to_string(),
                action: if stale {
                    AlertAction::Trigger
                } else {
                    AlertAction::Clear
                },
                value: age.num_seconds() as f64,
                threshold: self.staleness.num_seconds() as f64,
                severity: self.severity,
                message: if stale {
                    format!(
                        "station {} has not reported for {}s",
                        station.station_id,
                        age.num_seconds()
                    )
                } else {
                    format!("station {} is reporting again", station.station_id)
                },
                timestamp: now,
            };
            self.lifecycle.apply(&event).await?;
        }
        Ok(())
    }
}
