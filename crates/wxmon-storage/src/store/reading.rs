use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};
use wxmon_common::types::Reading;

use crate::entities::{station, weather_log};
use crate::error::Result;
use crate::store::WeatherStore;

impl WeatherStore {
    /// Persist a validated reading together with its station projection,
    /// in one transaction.
    ///
    /// The insert is keyed on (station_id, timestamp) with
    /// `ON CONFLICT DO NOTHING`, so redelivered messages collapse into
    /// the row written by the first delivery. Returns `true` when a new
    /// row was written, `false` for a duplicate.
    pub async fn insert_reading(&self, reading: &Reading) -> Result<bool> {
        let txn = self.db.begin().await?;
        let inserted = insert_log(&txn, reading).await?;
        upsert_station(&txn, reading).await?;
        txn.commit().await?;
        Ok(inserted)
    }
}

async fn insert_log<C: ConnectionTrait>(conn: &C, reading: &Reading) -> Result<bool> {
    let am = weather_log::ActiveModel {
        id: Set(wxmon_common::id::next_id()),
        station_id: Set(reading.station_id.clone()),
        timestamp: Set(reading.timestamp),
        temperature: Set(reading.temperature),
        humidity: Set(reading.humidity),
        pressure: Set(reading.pressure),
        wind_speed: Set(reading.wind_speed),
        wind_direction: Set(reading.wind_direction.clone()),
        precipitation: Set(reading.precipitation),
        solar_radiation: Set(reading.solar_radiation),
        battery_level: Set(reading.battery_level),
        status: Set(reading.status.to_string()),
        created_at: Set(Utc::now()),
    };
    let rows = weather_log::Entity::insert(am)
        .on_conflict(
            OnConflict::columns([
                weather_log::Column::StationId,
                weather_log::Column::Timestamp,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(rows > 0)
}

/// Keep the `stations` projection in step with incoming readings. The
/// guard on `last_reading_at` means an out-of-order (late) delivery never
/// rewinds a station's liveness clock.
async fn upsert_station<C: ConnectionTrait>(conn: &C, reading: &Reading) -> Result<()> {
    let now = Utc::now();
    let am = station::ActiveModel {
        station_id: Set(reading.station_id.clone()),
        status: Set(reading.status.to_string()),
        last_reading_at: Set(Some(reading.timestamp)),
        updated_at: Set(now),
        ..Default::default()
    };
    let rows = station::Entity::insert(am)
        .on_conflict(
            OnConflict::column(station::Column::StationId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    if rows == 0 {
        station::Entity::update_many()
            .col_expr(station::Column::Status, Expr::value(reading.status.to_string()))
            .col_expr(station::Column::LastReadingAt, Expr::value(reading.timestamp))
            .col_expr(station::Column::UpdatedAt, Expr::value(now))
            .filter(station::Column::StationId.eq(reading.station_id.as_str()))
            .filter(
                Condition::any()
                    .add(station::Column::LastReadingAt.is_null())
                    .add(station::Column::LastReadingAt.lte(reading.timestamp)),
            )
            .exec(conn)
            .await?;
    }
    Ok(())
}
