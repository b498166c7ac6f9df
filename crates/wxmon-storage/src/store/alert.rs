use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, SqlErr};
use serde::{Deserialize, Serialize};
use wxmon_common::types::{AlertStatus, Severity};

use crate::entities::weather_alert::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::WeatherStore;

/// Alert data row (from the `weather_alerts` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub station_id: String,
    pub alert_type: String,
    pub alert_message: String,
    pub alert_value: f64,
    pub threshold_value: f64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Fields for a freshly breached alert; the store fills in id, NEW
/// status and created_at.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub station_id: String,
    pub alert_type: String,
    pub alert_message: String,
    pub alert_value: f64,
    pub threshold_value: f64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

/// Outcome of a conditional open-alert insert.
#[derive(Debug)]
pub enum OpenAlertInsert {
    /// This writer created the NEW row.
    Inserted(AlertRow),
    /// The partial unique index rejected the insert: another writer
    /// already holds the open slot for this (station, type).
    AlreadyOpen,
}

fn to_row(m: weather_alert::Model) -> Result<AlertRow> {
    let severity = m
        .severity
        .parse::<Severity>()
        .map_err(|_| StorageError::InvalidColumn {
            column: "severity",
            value: m.severity.clone(),
        })?;
    let status = m
        .status
        .parse::<AlertStatus>()
        .map_err(|_| StorageError::InvalidColumn {
            column: "status",
            value: m.status.clone(),
        })?;
    Ok(AlertRow {
        id: m.id,
        station_id: m.station_id,
        alert_type: m.alert_type,
        alert_message: m.alert_message,
        alert_value: m.alert_value,
        threshold_value: m.threshold_value,
        timestamp: m.timestamp,
        severity,
        status,
        created_at: m.created_at,
        resolved_at: m.resolved_at,
    })
}

const OPEN_STATUSES: [&str; 2] = ["NEW", "ACTIVE"];

impl WeatherStore {
    /// Insert a NEW alert row, deferring to the partial unique index on
    /// (station_id, alert_type) for races between concurrent workers.
    /// The losing writer gets [`OpenAlertInsert::AlreadyOpen`], never an
    /// error.
    pub async fn insert_open_alert(&self, alert: &NewAlert) -> Result<OpenAlertInsert> {
        let id = wxmon_common::id::next_id();
        let am = weather_alert::ActiveModel {
            id: Set(id.clone()),
            station_id: Set(alert.station_id.clone()),
            alert_type: Set(alert.alert_type.clone()),
            alert_message: Set(alert.alert_message.clone()),
            alert_value: Set(alert.alert_value),
            threshold_value: Set(alert.threshold_value),
            timestamp: Set(alert.timestamp),
            severity: Set(alert.severity.to_string()),
            status: Set(AlertStatus::New.to_string()),
            created_at: Set(Utc::now()),
            resolved_at: Set(None),
        };
        match Entity::insert(am).exec_without_returning(self.db()).await {
            Ok(_) => {
                let model = Entity::find_by_id(id.as_str()).one(self.db()).await?.ok_or(
                    StorageError::NotFound {
                        entity: "weather_alert",
                        id,
                    },
                )?;
                Ok(OpenAlertInsert::Inserted(to_row(model)?))
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(OpenAlertInsert::AlreadyOpen)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The single open (NEW or ACTIVE) alert for a (station, type) pair,
    /// if any.
    pub async fn open_alert(&self, station_id: &str, alert_type: &str) -> Result<Option<AlertRow>> {
        let model = Entity::find()
            .filter(Column::StationId.eq(station_id))
            .filter(Column::AlertType.eq(alert_type))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .one(self.db())
            .await?;
        model.map(to_row).transpose()
    }

    /// All open alerts for one station, in creation order. This is the
    /// snapshot the evaluator receives.
    pub async fn open_alerts_for_station(&self, station_id: &str) -> Result<Vec<AlertRow>> {
        let models = Entity::find()
            .filter(Column::StationId.eq(station_id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .order_by_asc(Column::CreatedAt)
            .all(self.db())
            .await?;
        models.into_iter().map(to_row).collect()
    }

    /// Refresh value/timestamp of an alert that is still open. A `false`
    /// return means the row was resolved in the meantime.
    pub async fn refresh_alert(
        &self,
        id: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<bool> {
        let res = Entity::update_many()
            .col_expr(Column::AlertValue, Expr::value(value))
            .col_expr(Column::Timestamp, Expr::value(timestamp))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Promote NEW to ACTIVE once the open notification went out. The
    /// status guard makes concurrent promotions idempotent.
    pub async fn activate_alert(&self, id: &str) -> Result<bool> {
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Active.to_string()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(AlertStatus::New.to_string()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Close an open alert. Exactly one caller observes `true` for a
    /// given row; that caller owns sending the resolution notification.
    pub async fn resolve_alert(&self, id: &str, resolved_at: DateTime<Utc>) -> Result<bool> {
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Resolved.to_string()))
            .col_expr(Column::ResolvedAt, Expr::value(Some(resolved_at)))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<AlertRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_row).transpose()
    }
}
