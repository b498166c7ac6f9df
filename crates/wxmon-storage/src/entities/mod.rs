pub mod alert_configuration;
pub mod station;
pub mod weather_alert;
pub mod weather_log;
