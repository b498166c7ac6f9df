use crate::error::{NotifyError, Result};
use crate::Notifier;
use async_trait::async_trait;
use serde_json::Value;
use wxmon_common::types::AlertNotification;

/// HTTP POST sink: delivers the notification as a JSON document to one
/// configured endpoint, retrying transient failures with exponential
/// backoff before giving up.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

const MAX_ATTEMPTS: u32 = 3;

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    fn payload(notification: &AlertNotification) -> Value {
        serde_json::json!({
            "alert_id": notification.alert_id,
            "station_id": notification.station_id,
            "alert_type": notification.alert_type,
            "severity": notification.severity.to_string(),
            "phase": notification.phase.to_string(),
            "message": notification.message,
            "value": notification.value,
            "threshold": notification.threshold,
            "timestamp": notification.timestamp.to_rfc3339(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        let body = Self::payload(notification);
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self.client.post(&self.url).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let text = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::Other("webhook delivery failed".to_string())))
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
