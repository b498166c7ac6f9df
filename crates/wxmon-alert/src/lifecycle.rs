use chrono::Utc;
use std::sync::Arc;
use wxmon_common::types::{
    AlertAction, AlertEvent, AlertNotification, AlertStatus, NotificationPhase,
};
use wxmon_notify::dispatcher::Dispatcher;
use wxmon_storage::{AlertRow, NewAlert, OpenAlertInsert, Result, WeatherStore};

/// Owns the NEW → ACTIVE → RESOLVED state machine for every
/// (station_id, alert_type) slot.
///
/// No other component writes alert status. Dedup under concurrent
/// workers is settled by the store's partial unique index and guarded
/// updates, not by in-process locking: a losing insert or a losing
/// resolve is a no-op here, because the winning worker already recorded
/// the same fact.
pub struct AlertLifecycleManager {
    store: Arc<WeatherStore>,
    dispatcher: Arc<Dispatcher>,
}

impl AlertLifecycleManager {
    pub fn new(store: Arc<WeatherStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn apply(&self, event: &AlertEvent) -> Result<()> {
        match event.action {
            AlertAction::Trigger => self.on_trigger(event).await,
            AlertAction::Clear => self.on_clear(event).await,
        }
    }

    async fn on_trigger(&self, event: &AlertEvent) -> Result<()> {
        let existing = self
            .store
            .open_alert(&event.station_id, &event.alert_type)
            .await?;

        let row = match existing {
            Some(row) => Some(row),
            None => {
                let new_alert = NewAlert {
                    station_id: event.station_id.clone(),
                    alert_type: event.alert_type.clone(),
                    alert_message: event.message.clone(),
                    alert_value: event.value,
                    threshold_value: event.threshold,
                    timestamp: event.timestamp,
                    severity: event.severity,
                };
                match self.store.insert_open_alert(&new_alert).await? {
                    OpenAlertInsert::Inserted(row) => {
                        tracing::info!(
                            station_id = %row.station_id,
                            alert_type = %row.alert_type,
                            severity = %row.severity,
                            value = row.alert_value,
                            "Alert opened"
                        );
                        self.announce_open(&row, event).await?;
                        return Ok(());
                    }
                    // Another worker won the slot between our lookup and
                    // insert; carry on against its row.
                    OpenAlertInsert::AlreadyOpen => {
                        self.store
                            .open_alert(&event.station_id, &event.alert_type)
                            .await?
                    }
                }
            }
        };

        let Some(row) = row else {
            // The slot closed again between the conflict and the reload;
            // the next trigger for this key starts a fresh row.
            return Ok(());
        };

        // Ongoing breach: keep the row current, never notify twice.
        self.store
            .refresh_alert(&row.id, event.value, event.timestamp)
            .await?;
        if row.status == AlertStatus::New {
            // The open notification failed earlier; retry it now.
            self.announce_open(&row, event).await?;
        }
        Ok(())
    }

    /// Send the open notification and promote NEW → ACTIVE when it got
    /// out. On total delivery failure the row stays NEW and the next
    /// trigger for the same key retries; the breach is never lost.
    async fn announce_open(&self, row: &AlertRow, event: &AlertEvent) -> Result<()> {
        let notification = AlertNotification {
            alert_id: row.id.clone(),
            station_id: event.station_id.clone(),
            alert_type: event.alert_type.clone(),
            message: event.message.clone(),
            value: event.value,
            threshold: event.threshold,
            severity: event.severity,
            phase: NotificationPhase::Firing,
            timestamp: event.timestamp,
        };
        let delivered = self.dispatcher.dispatch(&notification).await;
        if self.dispatcher.announced(delivered) {
            self.store.activate_alert(&row.id).await?;
        } else {
            tracing::warn!(
                station_id = %event.station_id,
                alert_type = %event.alert_type,
                "Open notification undelivered, alert stays NEW for retry"
            );
        }
        Ok(())
    }

    async fn on_clear(&self, event: &AlertEvent) -> Result<()> {
        let Some(row) = self
            .store
            .open_alert(&event.station_id, &event.alert_type)
            .await?
        else {
            tracing::debug!(
                station_id = %event.station_id,
                alert_type = %event.alert_type,
                "Clear for a key with no open alert"
            );
            return Ok(());
        };

        // The guarded update picks exactly one winner under races; only
        // the winner sends the resolution notification.
        if self.store.resolve_alert(&row.id, Utc::now()).await? {
            tracing::info!(
                station_id = %row.station_id,
                alert_type = %row.alert_type,
                "Alert resolved"
            );
            let notification = AlertNotification {
                alert_id: row.id.clone(),
                station_id: row.station_id.clone(),
                alert_type: row.alert_type.clone(),
                message: event.message.clone(),
                value: event.value,
                threshold: row.threshold_value,
                severity: row.severity,
                phase: NotificationPhase::Resolved,
                timestamp: event.timestamp,
            };
            self.dispatcher.dispatch(&notification).await;
        }
        Ok(())
    }
}
