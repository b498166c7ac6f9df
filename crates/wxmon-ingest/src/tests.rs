use crate::processor::{ProcessOutcome, Processor};
use crate::validator::{decode, validate, RejectionReason};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, EntityTrait, PaginatorTrait};
use std::sync::{Arc, Mutex};
use wxmon_alert::cache::RuleCache;
use wxmon_alert::lifecycle::AlertLifecycleManager;
use wxmon_common::types::{AlertNotification, AlertStatus, StationStatus};
use wxmon_notify::dispatcher::Dispatcher;
use wxmon_notify::error::Result as NotifyResult;
use wxmon_notify::Notifier;
use wxmon_storage::WeatherStore;

fn skew() -> Duration {
    Duration::seconds(120)
}

fn raw(json: &str) -> crate::validator::RawReading {
    decode(json.as_bytes()).unwrap()
}

// ---- validator ----

#[test]
fn valid_message_normalizes() {
    let ts = (Utc::now() - Duration::seconds(30)).to_rfc3339();
    let json = format!(
        r#"{{"station_id":"S1","timestamp":"{ts}","temperature":21.4,"humidity":55.0,
            "wind_direction":"SW","status":"ACTIVE","firmware":"ignored"}}"#
    );
    let reading = validate(raw(&json), Utc::now(), skew()).unwrap();
    assert_eq!(reading.station_id, "S1");
    assert_eq!(reading.temperature, Some(21.4));
    assert_eq!(reading.wind_direction.as_deref(), Some("SW"));
    assert_eq!(reading.status, StationStatus::Active);
    assert!(reading.pressure.is_none());
}

#[test]
fn missing_required_fields_are_named() {
    let ts = Utc::now().to_rfc3339();

    let r = validate(raw(&format!(r#"{{"timestamp":"{ts}","status":"ACTIVE"}}"#)), Utc::now(), skew());
    assert!(matches!(r, Err(RejectionReason::MissingField("station_id"))));

    let r = validate(raw(r#"{"station_id":"S1","status":"ACTIVE"}"#), Utc::now(), skew());
    assert!(matches!(r, Err(RejectionReason::MissingField("timestamp"))));

    let r = validate(raw(&format!(r#"{{"station_id":"S1","timestamp":"{ts}"}}"#)), Utc::now(), skew());
    assert!(matches!(r, Err(RejectionReason::MissingField("status"))));

    // Whitespace-only station id does not count as present.
    let r = validate(
        raw(&format!(r#"{{"station_id":"  ","timestamp":"{ts}","status":"ACTIVE"}}"#)),
        Utc::now(),
        skew(),
    );
    assert!(matches!(r, Err(RejectionReason::MissingField("station_id"))));
}

#[test]
fn out_of_range_temperature_is_rejected_not_clamped() {
    let ts = Utc::now().to_rfc3339();
    let json = format!(
        r#"{{"station_id":"S1","timestamp":"{ts}","temperature":65.0,"status":"ACTIVE"}}"#
    );
    let err = validate(raw(&json), Utc::now(), skew()).unwrap_err();
    match err {
        RejectionReason::OutOfRange { field, value, .. } => {
            assert_eq!(field, "temperature");
            assert_eq!(value, 65.0);
        }
        other => panic!("expected OUT_OF_RANGE, got {other:?}"),
    }
    assert_eq!(err.code(), "OUT_OF_RANGE");
}

#[test]
fn range_bounds_are_inclusive() {
    let ts = Utc::now().to_rfc3339();
    for (field, value) in [
        ("temperature", -80.0),
        ("temperature", 60.0),
        ("humidity", 0.0),
        ("humidity", 100.0),
        ("pressure", 1200.0),
        ("wind_speed", 200.0),
    ] {
        let json = format!(
            r#"{{"station_id":"S1","timestamp":"{ts}","{field}":{value},"status":"ACTIVE"}}"#
        );
        assert!(
            validate(raw(&json), Utc::now(), skew()).is_ok(),
            "{field}={value} should sit exactly on the accepted bound"
        );
    }

    let json = format!(
        r#"{{"station_id":"S1","timestamp":"{ts}","humidity":100.1,"status":"ACTIVE"}}"#
    );
    assert!(matches!(
        validate(raw(&json), Utc::now(), skew()),
        Err(RejectionReason::OutOfRange { field: "humidity", .. })
    ));
}

#[test]
fn future_timestamp_beyond_skew_is_rejected() {
    let now = Utc::now();

    let inside = (now + Duration::seconds(60)).to_rfc3339();
    let json = format!(r#"{{"station_id":"S1","timestamp":"{inside}","status":"ACTIVE"}}"#);
    assert!(validate(raw(&json), now, skew()).is_ok());

    let outside = (now + Duration::seconds(300)).to_rfc3339();
    let json = format!(r#"{{"station_id":"S1","timestamp":"{outside}","status":"ACTIVE"}}"#);
    assert!(matches!(
        validate(raw(&json), now, skew()),
        Err(RejectionReason::FutureTimestamp)
    ));
}

#[test]
fn malformed_payloads_are_rejected_with_reason() {
    assert!(matches!(
        decode(b"not json at all"),
        Err(RejectionReason::Malformed(_))
    ));
    // Wrong value type for a sensor field fails the decode.
    assert!(matches!(
        decode(br#"{"station_id":"S1","temperature":"warm"}"#),
        Err(RejectionReason::Malformed(_))
    ));

    let ts = Utc::now().to_rfc3339();
    let bad_ts = format!(r#"{{"station_id":"S1","timestamp":"today","status":"ACTIVE"}}"#);
    assert!(matches!(
        validate(raw(&bad_ts), Utc::now(), skew()),
        Err(RejectionReason::Malformed(_))
    ));
    let bad_status =
        format!(r#"{{"station_id":"S1","timestamp":"{ts}","status":"SLEEPING"}}"#);
    assert!(matches!(
        validate(raw(&bad_status), Utc::now(), skew()),
        Err(RejectionReason::Malformed(_))
    ));
}

// ---- processor ----

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

async fn setup_processor() -> (Arc<WeatherStore>, Processor, Arc<Mutex<Vec<AlertNotification>>>) {
    wxmon_common::id::init(1, 1);
    let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
    opts.max_connections(1);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let store = Arc::new(WeatherStore::from_connection(db));

    store
        .insert_alert_configuration("low_battery", "battery_level", "<", 20.0, "WARNING", true)
        .await
        .unwrap();
    let rules = Arc::new(RuleCache::new(store.clone()));
    rules.refresh().await.unwrap();

    let sent = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Arc::new(Dispatcher::new(
        vec![Box::new(RecordingNotifier { sent: sent.clone() })],
        std::time::Duration::from_secs(5),
    ));
    let lifecycle = Arc::new(AlertLifecycleManager::new(store.clone(), dispatcher));

    let processor = Processor::new(store.clone(), rules, lifecycle, 120, 10);
    (store, processor, sent)
}

fn payload(station: &str, battery: f64, secs_ago: i64) -> Vec<u8> {
    let ts = (Utc::now() - Duration::seconds(secs_ago)).to_rfc3339();
    format!(
        r#"{{"station_id":"{station}","timestamp":"{ts}","battery_level":{battery},"status":"ACTIVE"}}"#
    )
    .into_bytes()
}

#[tokio::test]
async fn replayed_message_persists_once_and_opens_one_alert() {
    let (store, processor, sent) = setup_processor().await;
    let msg = payload("S1", 15.0, 30);

    let first = processor.process(&msg).await.unwrap();
    assert!(matches!(first, ProcessOutcome::Stored { alerts: 1 }));

    // Simulated at-least-once redelivery of the identical payload.
    let second = processor.process(&msg).await.unwrap();
    assert!(matches!(second, ProcessOutcome::Duplicate));

    let readings = wxmon_storage::entities::weather_log::Entity::find()
        .count(store.db())
        .await
        .unwrap();
    assert_eq!(readings, 1);

    let alerts = wxmon_storage::entities::weather_alert::Entity::find()
        .count(store.db())
        .await
        .unwrap();
    assert_eq!(alerts, 1);
    assert_eq!(sent.lock().unwrap().len(), 1);

    let open = store.open_alert("S1", "battery_level_lt_20").await.unwrap().unwrap();
    assert_eq!(open.status, AlertStatus::Active);
    assert_eq!(open.alert_value, 15.0);
}

#[tokio::test]
async fn recovery_reading_resolves_the_open_alert() {
    let (store, processor, sent) = setup_processor().await;

    processor.process(&payload("S1", 15.0, 60)).await.unwrap();
    let outcome = processor.process(&payload("S1", 85.0, 0)).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Stored { alerts: 1 }));

    assert!(store.open_alert("S1", "battery_level_lt_20").await.unwrap().is_none());
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].phase, wxmon_common::types::NotificationPhase::Resolved);
}

#[tokio::test]
async fn rejected_message_is_never_persisted() {
    let (store, processor, _sent) = setup_processor().await;
    let ts = Utc::now().to_rfc3339();
    let msg = format!(
        r#"{{"station_id":"S1","timestamp":"{ts}","temperature":65.0,"status":"ACTIVE"}}"#
    );

    let outcome = processor.process(msg.as_bytes()).await.unwrap();
    match outcome {
        ProcessOutcome::Rejected(reason) => assert_eq!(reason.code(), "OUT_OF_RANGE"),
        other => panic!("expected rejection, got {other:?}"),
    }

    let readings = wxmon_storage::entities::weather_log::Entity::find()
        .count(store.db())
        .await
        .unwrap();
    assert_eq!(readings, 0);
    assert!(store.list_stations().await.unwrap().is_empty());
}

#[tokio::test]
async fn station_projection_follows_ingestion() {
    let (store, processor, _sent) = setup_processor().await;
    processor.process(&payload("S7", 90.0, 10)).await.unwrap();

    let stations = store.list_stations().await.unwrap();
    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0].station_id, "S7");
    assert!(stations[0].last_reading_at.is_some());
}
