use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WeatherLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WeatherLogs::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(WeatherLogs::StationId).string().not_null())
                    .col(
                        ColumnDef::new(WeatherLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WeatherLogs::Temperature).double())
                    .col(ColumnDef::new(WeatherLogs::Humidity).double())
                    .col(ColumnDef::new(WeatherLogs::Pressure).double())
                    .col(ColumnDef::new(WeatherLogs::WindSpeed).double())
                    .col(ColumnDef::new(WeatherLogs::WindDirection).string())
                    .col(ColumnDef::new(WeatherLogs::Precipitation).double())
                    .col(ColumnDef::new(WeatherLogs::SolarRadiation).double())
                    .col(ColumnDef::new(WeatherLogs::BatteryLevel).double())
                    .col(ColumnDef::new(WeatherLogs::Status).string().not_null())
                    .col(
                        ColumnDef::new(WeatherLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Redelivered messages hit this constraint instead of inserting twice.
        manager
            .create_index(
                Index::create()
                    .name("uq_weather_logs_station_ts")
                    .table(WeatherLogs::Table)
                    .col(WeatherLogs::StationId)
                    .col(WeatherLogs::Timestamp)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WeatherAlerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WeatherAlerts::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(WeatherAlerts::StationId).string().not_null())
                    .col(ColumnDef::new(WeatherAlerts::AlertType).string().not_null())
                    .col(ColumnDef::new(WeatherAlerts::AlertMessage).string().not_null())
                    .col(ColumnDef::new(WeatherAlerts::AlertValue).double().not_null())
                    .col(ColumnDef::new(WeatherAlerts::ThresholdValue).double().not_null())
                    .col(
                        ColumnDef::new(WeatherAlerts::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WeatherAlerts::Severity).string().not_null())
                    .col(ColumnDef::new(WeatherAlerts::Status).string().not_null())
                    .col(
                        ColumnDef::new(WeatherAlerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WeatherAlerts::ResolvedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_weather_alerts_station_status")
                    .table(WeatherAlerts::Table)
                    .col(WeatherAlerts::StationId)
                    .col(WeatherAlerts::Status)
                    .to_owned(),
            )
            .await?;

        // At most one open (NEW or ACTIVE) alert per (station, type). The
        // partial unique index is the authority that settles races between
        // concurrent workers; the same syntax works on Postgres and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX uq_weather_alerts_open \
                 ON weather_alerts (station_id, alert_type) \
                 WHERE status IN ('NEW', 'ACTIVE')",
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertConfigurations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertConfigurations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertConfigurations::Name).string().not_null())
                    .col(ColumnDef::new(AlertConfigurations::FieldName).string().not_null())
                    .col(ColumnDef::new(AlertConfigurations::Operator).string().not_null())
                    .col(
                        ColumnDef::new(AlertConfigurations::ThresholdValue)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertConfigurations::Severity).string().not_null())
                    .col(
                        ColumnDef::new(AlertConfigurations::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(AlertConfigurations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfigurations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_alert_configurations_rule")
                    .table(AlertConfigurations::Table)
                    .col(AlertConfigurations::FieldName)
                    .col(AlertConfigurations::Operator)
                    .col(AlertConfigurations::ThresholdValue)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Stations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Stations::StationId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Stations::Status).string().not_null())
                    .col(ColumnDef::new(Stations::Latitude).double())
                    .col(ColumnDef::new(Stations::Longitude).double())
                    .col(ColumnDef::new(Stations::Elevation).double())
                    .col(ColumnDef::new(Stations::LastReadingAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Stations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Stations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertConfigurations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WeatherAlerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WeatherLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum WeatherLogs {
    Table,
    Id,
    StationId,
    Timestamp,
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    WindDirection,
    Precipitation,
    SolarRadiation,
    BatteryLevel,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WeatherAlerts {
    Table,
    Id,
    StationId,
    AlertType,
    AlertMessage,
    AlertValue,
    ThresholdValue,
    Timestamp,
    Severity,
    Status,
    CreatedAt,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum AlertConfigurations {
    Table,
    Id,
    Name,
    FieldName,
    Operator,
    ThresholdValue,
    Severity,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Stations {
    Table,
    StationId,
    Status,
    Latitude,
    Longitude,
    Elevation,
    LastReadingAt,
    UpdatedAt,
}
