use wxmon_storage::WeatherStore;

/// Default alert rules installed on first boot, matching the thresholds
/// the station fleet ships with. Seeding only happens when the table is
/// empty so administrative edits are never overwritten.
const DEFAULT_RULES: &[(&str, &str, &str, f64, &str)] = &[
    ("high_temperature", "temperature", ">", 35.0, "WARNING"),
    ("extreme_temperature", "temperature", ">", 45.0, "CRITICAL"),
    ("deep_freeze", "temperature", "<", -40.0, "WARNING"),
    ("low_battery", "battery_level", "<", 20.0, "WARNING"),
    ("battery_critical", "battery_level", "<", 10.0, "CRITICAL"),
    ("storm_wind", "wind_speed", ">", 90.0, "WARNING"),
    ("low_pressure", "pressure", "<", 950.0, "WARNING"),
];

pub async fn init_default_rules(store: &WeatherStore) -> wxmon_storage::Result<()> {
    let existing = store.count_alert_configurations().await?;
    if existing > 0 {
        tracing::debug!(existing, "Alert configurations present, skipping seed");
        return Ok(());
    }

    let mut created = 0u32;
    for (name, field, operator, threshold, severity) in DEFAULT_RULES {
        match store
            .insert_alert_configuration(name, field, operator, *threshold, severity, true)
            .await
        {
            Ok(row) => {
                tracing::info!(name = %row.name, id = %row.id, "Alert rule created");
                created += 1;
            }
            Err(e) => {
                tracing::error!(name, error = %e, "Failed to create default alert rule");
            }
        }
    }
    tracing::info!(created, "Default alert rules seeded");
    Ok(())
}
