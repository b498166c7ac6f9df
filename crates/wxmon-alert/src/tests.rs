use crate::cache::RuleCache;
use crate::evaluator::{evaluate, OpenAlert};
use crate::lifecycle::AlertLifecycleManager;
use crate::rules::{CompareOp, RuleSpec};
use async_trait::async_trait;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wxmon_common::types::{
    AlertAction, AlertEvent, AlertNotification, AlertStatus, NotificationPhase, Reading, Severity,
    StationStatus,
};
use wxmon_notify::dispatcher::Dispatcher;
use wxmon_notify::error::{NotifyError, Result as NotifyResult};
use wxmon_notify::Notifier;
use wxmon_storage::WeatherStore;

async fn setup_store() -> Arc<WeatherStore> {
    wxmon_common::id::init(1, 1);
    let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
    opts.max_connections(1);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    Arc::new(WeatherStore::from_connection(db))
}

/// Captures everything it is asked to deliver.
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<AlertNotification>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, n: &AlertNotification) -> NotifyResult<()> {
        self.sent.lock().unwrap().push(n.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _n: &AlertNotification) -> NotifyResult<()> {
        Err(NotifyError::Other("sink down".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn recording_dispatcher() -> (Arc<Dispatcher>, Arc<Mutex<Vec<AlertNotification>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Arc::new(Dispatcher::new(
        vec![Box::new(RecordingNotifier { sent: sent.clone() })],
        Duration::from_secs(5),
    ));
    (dispatcher, sent)
}

fn rule(field: &str, op: CompareOp, threshold: f64, severity: Severity) -> RuleSpec {
    RuleSpec {
        id: wxmon_common::id::next_id(),
        name: format!("{field}_{}_{threshold}", op.short()),
        field: field.to_string(),
        op,
        threshold,
        severity,
    }
}

fn reading(station: &str) -> Reading {
    Reading {
        station_id: station.to_string(),
        timestamp: Utc::now(),
        temperature: None,
        humidity: None,
        pressure: None,
        wind_speed: None,
        wind_direction: None,
        precipitation: None,
        solar_radiation: None,
        battery_level: None,
        status: StationStatus::Active,
    }
}

fn trigger_event(station: &str, alert_type: &str, value: f64, threshold: f64) -> AlertEvent {
    AlertEvent {
        station_id: station.to_string(),
        alert_type: alert_type.to_string(),
        action: AlertAction::Trigger,
        value,
        threshold,
        severity: Severity::Warning,
        message: format!("{alert_type}: {value}"),
        timestamp: Utc::now(),
    }
}

fn clear_event(station: &str, alert_type: &str, value: f64, threshold: f64) -> AlertEvent {
    AlertEvent {
        action: AlertAction::Clear,
        ..trigger_event(station, alert_type, value, threshold)
    }
}

// ---- evaluator ----

#[test]
fn exact_threshold_does_not_trigger_strict_operator() {
    let rules = vec![rule("temperature", CompareOp::GreaterThan, 35.0, Severity::Warning)];
    let mut r = reading("S1");
    r.temperature = Some(35.0);

    assert!(evaluate(&r, &rules, &[]).is_empty());

    // One hair above the threshold does trigger.
    r.temperature = Some(35.000001);
    let events = evaluate(&r, &rules, &[]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AlertAction::Trigger);
}

#[test]
fn battery_scenario_produces_expected_event() {
    let rules = vec![rule("battery_level", CompareOp::LessThan, 20.0, Severity::Warning)];
    let mut r = reading("S1");
    r.battery_level = Some(15.0);

    let events = evaluate(&r, &rules, &[]);
    assert_eq!(events.len(), 1);
    let e = &events[0];
    assert_eq!(e.alert_type, "battery_level_lt_20");
    assert_eq!(e.action, AlertAction::Trigger);
    assert_eq!(e.value, 15.0);
    assert_eq!(e.threshold, 20.0);
    assert_eq!(e.severity, Severity::Warning);
    assert_eq!(e.station_id, "S1");
}

#[test]
fn ongoing_breach_with_open_alert_is_a_noop() {
    let rules = vec![rule("battery_level", CompareOp::LessThan, 20.0, Severity::Warning)];
    let mut r = reading("S1");
    r.battery_level = Some(12.0);

    let open = vec![OpenAlert {
        alert_type: "battery_level_lt_20".to_string(),
        threshold: 20.0,
    }];
    assert!(evaluate(&r, &rules, &open).is_empty());
}

#[test]
fn recovered_value_clears_only_open_alerts() {
    let rules = vec![rule("battery_level", CompareOp::LessThan, 20.0, Severity::Warning)];
    let mut r = reading("S1");
    r.battery_level = Some(55.0);

    // No open alert: nothing to clear.
    assert!(evaluate(&r, &rules, &[]).is_empty());

    let open = vec![OpenAlert {
        alert_type: "battery_level_lt_20".to_string(),
        threshold: 20.0,
    }];
    let events = evaluate(&r, &rules, &open);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AlertAction::Clear);
}

#[test]
fn simultaneous_breaches_yield_independent_events() {
    let rules = vec![
        rule("temperature", CompareOp::GreaterThan, 35.0, Severity::Warning),
        rule("battery_level", CompareOp::LessThan, 20.0, Severity::Critical),
        rule("humidity", CompareOp::GreaterEqual, 95.0, Severity::Warning),
    ];
    let mut r = reading("S1");
    r.temperature = Some(40.0);
    r.battery_level = Some(10.0);
    r.humidity = Some(50.0); // not breached

    let events = evaluate(&r, &rules, &[]);
    assert_eq!(events.len(), 2);
    let types: Vec<&str> = events.iter().map(|e| e.alert_type.as_str()).collect();
    assert!(types.contains(&"temperature_gt_35"));
    assert!(types.contains(&"battery_level_lt_20"));
}

#[test]
fn absent_fields_are_skipped() {
    let rules = vec![rule("pressure", CompareOp::LessThan, 950.0, Severity::Warning)];
    let r = reading("S1"); // no pressure reported
    assert!(evaluate(&r, &rules, &[]).is_empty());
}

#[test]
fn liveness_alerts_are_never_cleared_by_the_evaluator() {
    let rules = vec![rule("temperature", CompareOp::GreaterThan, 35.0, Severity::Warning)];
    let mut r = reading("S1");
    r.temperature = Some(20.0);

    let open = vec![OpenAlert {
        alert_type: "STATION_NOT_REPORTING".to_string(),
        threshold: 900.0,
    }];
    assert!(evaluate(&r, &rules, &open).is_empty());
}

// ---- rule cache ----

#[tokio::test]
async fn cache_orders_by_severity_then_insertion_and_skips_bad_rows() {
    let store = setup_store().await;
    store
        .insert_alert_configuration("heat_critical", "temperature", ">", 45.0, "CRITICAL", true)
        .await
        .unwrap();
    store
        .insert_alert_configuration("low_battery", "battery_level", "<", 20.0, "WARNING", true)
        .await
        .unwrap();
    store
        .insert_alert_configuration("bogus_field", "dew_point", ">", 10.0, "WARNING", true)
        .await
        .unwrap();
    store
        .insert_alert_configuration("bogus_op", "humidity", "~", 10.0, "WARNING", true)
        .await
        .unwrap();
    store
        .insert_alert_configuration("disabled", "humidity", ">", 95.0, "WARNING", false)
        .await
        .unwrap();

    let cache = RuleCache::new(store);
    let count = cache.refresh().await.unwrap();
    assert_eq!(count, 2);

    let snapshot = cache.snapshot();
    assert_eq!(snapshot[0].severity, Severity::Warning);
    assert_eq!(snapshot[0].field, "battery_level");
    assert_eq!(snapshot[1].severity, Severity::Critical);
    assert_eq!(snapshot[1].field, "temperature");
}

// ---- lifecycle ----

#[tokio::test]
async fn trigger_opens_then_activates_with_one_notification() {
    let store = setup_store().await;
    let (dispatcher, sent) = recording_dispatcher();
    let manager = AlertLifecycleManager::new(store.clone(), dispatcher);

    manager
        .apply(&trigger_event("S1", "battery_level_lt_20", 15.0, 20.0))
        .await
        .unwrap();

    let row = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();
    assert_eq!(row.status, AlertStatus::Active);
    assert_eq!(row.alert_value, 15.0);
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(sent.lock().unwrap()[0].phase, NotificationPhase::Firing);

    // Repeated trigger refreshes the same row, no second notification.
    manager
        .apply(&trigger_event("S1", "battery_level_lt_20", 11.0, 20.0))
        .await
        .unwrap();

    let row2 = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();
    assert_eq!(row2.id, row.id);
    assert_eq!(row2.alert_value, 11.0);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn trigger_then_clear_resolves_with_one_resolution_notification() {
    let store = setup_store().await;
    let (dispatcher, sent) = recording_dispatcher();
    let manager = AlertLifecycleManager::new(store.clone(), dispatcher);

    manager
        .apply(&trigger_event("S1", "battery_level_lt_20", 15.0, 20.0))
        .await
        .unwrap();
    let row = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();

    manager
        .apply(&clear_event("S1", "battery_level_lt_20", 80.0, 20.0))
        .await
        .unwrap();

    let resolved = store.get_alert(&row.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].phase, NotificationPhase::Resolved);

    // No open slot remains.
    assert!(store.open_alert("S1", "battery_level_lt_20").await.unwrap().is_none());
}

#[tokio::test]
async fn clear_without_open_alert_is_a_noop() {
    let store = setup_store().await;
    let (dispatcher, sent) = recording_dispatcher();
    let manager = AlertLifecycleManager::new(store.clone(), dispatcher);

    manager
        .apply(&clear_event("S1", "battery_level_lt_20", 80.0, 20.0))
        .await
        .unwrap();
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn undelivered_open_notification_keeps_new_and_retries() {
    let store = setup_store().await;
    let failing = Arc::new(Dispatcher::new(
        vec![Box::new(FailingNotifier)],
        Duration::from_secs(5),
    ));
    let manager = AlertLifecycleManager::new(store.clone(), failing);

    manager
        .apply(&trigger_event("S1", "temperature_gt_35", 38.0, 35.0))
        .await
        .unwrap();
    let row = store.open_alert("S1", "temperature_gt_35").await.unwrap().unwrap();
    assert_eq!(row.status, AlertStatus::New);

    // Next evaluation cycle, notifiers are reachable again: the retry
    // promotes the same row instead of opening a second one.
    let (dispatcher, sent) = recording_dispatcher();
    let recovered = AlertLifecycleManager::new(store.clone(), dispatcher);
    recovered
        .apply(&trigger_event("S1", "temperature_gt_35", 39.0, 35.0))
        .await
        .unwrap();

    let row2 = store.open_alert("S1", "temperature_gt_35").await.unwrap().unwrap();
    assert_eq!(row2.id, row.id);
    assert_eq!(row2.status, AlertStatus::Active);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resolved_is_terminal_and_a_fresh_breach_opens_a_new_row() {
    let store = setup_store().await;
    let (dispatcher, _sent) = recording_dispatcher();
    let manager = AlertLifecycleManager::new(store.clone(), dispatcher);

    manager
        .apply(&trigger_event("S1", "battery_level_lt_20", 15.0, 20.0))
        .await
        .unwrap();
    let first = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();
    manager
        .apply(&clear_event("S1", "battery_level_lt_20", 90.0, 20.0))
        .await
        .unwrap();

    manager
        .apply(&trigger_event("S1", "battery_level_lt_20", 8.0, 20.0))
        .await
        .unwrap();
    let second = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();

    assert_ne!(first.id, second.id);
    let old = store.get_alert(&first.id).await.unwrap().unwrap();
    assert_eq!(old.status, AlertStatus::Resolved);
    assert_eq!(second.status, AlertStatus::Active);
}
