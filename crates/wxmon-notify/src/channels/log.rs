use crate::error::Result;
use crate::Notifier;
use async_trait::async_trait;
use wxmon_common::types::AlertNotification;

/// Structured-log sink. Always succeeds; useful as the baseline notifier
/// and in environments without external delivery targets.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        tracing::info!(
            alert_id = %notification.alert_id,
            station_id = %notification.station_id,
            alert_type = %notification.alert_type,
            severity = %notification.severity,
            phase = %notification.phase,
            value = notification.value,
            threshold = notification.threshold,
            "{}",
            notification.message,
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
