use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::station::{self, Column, Entity};
use crate::error::Result;
use crate::store::WeatherStore;

/// Station liveness/location projection (from the `stations` table).
/// Maintained as a side effect of reading ingestion; stations are never
/// created through any other path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRow {
    pub station_id: String,
    pub status: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: station::Model) -> StationRow {
    StationRow {
        station_id: m.station_id,
        status: m.status,
        latitude: m.latitude,
        longitude: m.longitude,
        elevation: m.elevation,
        last_reading_at: m.last_reading_at,
        updated_at: m.updated_at,
    }
}

impl WeatherStore {
    /// Every known station; the liveness monitor scans this each tick.
    pub async fn list_stations(&self) -> Result<Vec<StationRow>> {
        let rows = Entity::find()
            .order_by_asc(Column::StationId)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }
}
