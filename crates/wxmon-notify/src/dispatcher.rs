use crate::Notifier;
use metrics::counter;
use std::time::Duration;
use wxmon_common::types::AlertNotification;

/// Fans one notification out to every registered sink.
///
/// Each sink runs under its own bounded timeout; a slow or failing sink
/// is logged, counted and skipped, never blocking the others or the
/// caller's alert state transition.
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>, timeout: Duration) -> Self {
        Self { notifiers, timeout }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver to all sinks; returns how many succeeded.
    pub async fn dispatch(&self, notification: &AlertNotification) -> usize {
        let mut delivered = 0usize;
        for notifier in &self.notifiers {
            match tokio::time::timeout(self.timeout, notifier.notify(notification)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    counter!("wxmon_notify_failures_total", "channel" => notifier.name().to_string())
                        .increment(1);
                    tracing::warn!(
                        channel = notifier.name(),
                        alert_type = %notification.alert_type,
                        station_id = %notification.station_id,
                        error = %e,
                        "Notifier failed"
                    );
                }
                Err(_) => {
                    counter!("wxmon_notify_failures_total", "channel" => notifier.name().to_string())
                        .increment(1);
                    tracing::warn!(
                        channel = notifier.name(),
                        alert_type = %notification.alert_type,
                        timeout_secs = self.timeout.as_secs(),
                        "Notifier timed out"
                    );
                }
            }
        }
        if delivered > 0 {
            counter!("wxmon_alerts_sent_total", "severity" => notification.severity.to_string())
                .increment(1);
        }
        delivered
    }

    /// Whether a dispatch result counts as a successful announcement:
    /// at least one sink delivered, or there is nothing to deliver to.
    pub fn announced(&self, delivered: usize) -> bool {
        delivered > 0 || self.notifiers.is_empty()
    }
}
