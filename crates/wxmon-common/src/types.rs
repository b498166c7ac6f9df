use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational status reported by a station alongside its sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationStatus {
    Active,
    Inactive,
    Maintenance,
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StationStatus::Active => write!(f, "ACTIVE"),
            StationStatus::Inactive => write!(f, "INACTIVE"),
            StationStatus::Maintenance => write!(f, "MAINTENANCE"),
        }
    }
}

impl std::str::FromStr for StationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(StationStatus::Active),
            "INACTIVE" => Ok(StationStatus::Inactive),
            "MAINTENANCE" => Ok(StationStatus::Maintenance),
            _ => Err(format!("unknown station status: {s}")),
        }
    }
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use wxmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert!(Severity::Critical > Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle state of a persisted alert row.
///
/// NEW and ACTIVE count as "open"; RESOLVED is terminal. A fresh breach
/// after resolution creates a new row rather than reopening the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    New,
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::New | AlertStatus::Active)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::New => write!(f, "NEW"),
            AlertStatus::Active => write!(f, "ACTIVE"),
            AlertStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(AlertStatus::New),
            "ACTIVE" => Ok(AlertStatus::Active),
            "RESOLVED" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// One normalized telemetry record from a station.
///
/// Produced by the ingestion validator; immutable once persisted. Every
/// present sensor value has already passed its physical range check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<String>,
    pub precipitation: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub battery_level: Option<f64>,
    pub status: StationStatus,
}

/// Alert type synthesized by the station liveness monitor; not derived
/// from any configured rule, so the evaluator never clears it.
pub const STATION_NOT_REPORTING: &str = "STATION_NOT_REPORTING";

/// Names of the numeric sensor fields a rule may watch, in wire order.
pub const SENSOR_FIELDS: &[&str] = &[
    "temperature",
    "humidity",
    "pressure",
    "wind_speed",
    "precipitation",
    "solar_radiation",
    "battery_level",
];

impl Reading {
    /// Resolve a sensor field by name. Returns `None` both for fields the
    /// reading did not report and for names that are not sensor fields;
    /// rule configurations are vetted against [`SENSOR_FIELDS`] upstream.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "temperature" => self.temperature,
            "humidity" => self.humidity,
            "pressure" => self.pressure,
            "wind_speed" => self.wind_speed,
            "precipitation" => self.precipitation,
            "solar_radiation" => self.solar_radiation,
            "battery_level" => self.battery_level,
            _ => None,
        }
    }
}

/// What the evaluator (or the liveness monitor) wants done to the alert
/// slot identified by (station_id, alert_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertAction {
    Trigger,
    Clear,
}

/// A single evaluation outcome handed to the alert lifecycle manager.
///
/// Events for different alert types on the same reading are independent;
/// the lifecycle manager owns all dedup and state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub station_id: String,
    pub alert_type: String,
    pub action: AlertAction,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
    /// Timestamp of the triggering reading (or of the liveness scan).
    pub timestamp: DateTime<Utc>,
}

/// Whether a notification announces a breach or its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPhase {
    Firing,
    Resolved,
}

impl std::fmt::Display for NotificationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationPhase::Firing => write!(f, "firing"),
            NotificationPhase::Resolved => write!(f, "resolved"),
        }
    }
}

/// The finalized payload published to every registered notifier after an
/// alert state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id: String,
    pub station_id: String,
    pub alert_type: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub phase: NotificationPhase,
    pub timestamp: DateTime<Utc>,
}
