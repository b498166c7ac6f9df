use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::alert_configuration::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::WeatherStore;

/// Alert configuration data row (from the `alert_configurations` table).
///
/// Operator and severity stay as stored strings here; the rule cache
/// parses them into typed form and skips rows it cannot interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfigRow {
    pub id: String,
    pub name: String,
    pub field_name: String,
    pub operator: String,
    pub threshold_value: f64,
    pub severity: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: alert_configuration::Model) -> AlertConfigRow {
    AlertConfigRow {
        id: m.id,
        name: m.name,
        field_name: m.field_name,
        operator: m.operator,
        threshold_value: m.threshold_value,
        severity: m.severity,
        enabled: m.enabled,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

impl WeatherStore {
    /// Enabled rules in insertion order. Severity ordering on top of
    /// this is applied by the rule cache after parsing.
    pub async fn list_enabled_alert_configurations(&self) -> Result<Vec<AlertConfigRow>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .order_by_asc(Column::CreatedAt)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_alert_configurations(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }

    pub async fn insert_alert_configuration(
        &self,
        name: &str,
        field_name: &str,
        operator: &str,
        threshold_value: f64,
        severity: &str,
        enabled: bool,
    ) -> Result<AlertConfigRow> {
        let id = wxmon_common::id::next_id();
        let now = Utc::now();
        let am = alert_configuration::ActiveModel {
            id: Set(id.clone()),
            name: Set(name.to_string()),
            field_name: Set(field_name.to_string()),
            operator: Set(operator.to_string()),
            threshold_value: Set(threshold_value),
            severity: Set(severity.to_string()),
            enabled: Set(enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Entity::insert(am).exec_without_returning(self.db()).await?;
        let model = Entity::find_by_id(id.as_str())
            .one(self.db())
            .await?
            .ok_or(StorageError::NotFound {
                entity: "alert_configuration",
                id,
            })?;
        Ok(to_row(model))
    }

    /// Administrative enable/disable toggle; the next cache refresh
    /// picks the change up.
    pub async fn set_alert_configuration_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(false);
        };
        let mut am: alert_configuration::ActiveModel = m.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(Utc::now());
        sea_orm::ActiveModelTrait::update(am, self.db()).await?;
        Ok(true)
    }
}
