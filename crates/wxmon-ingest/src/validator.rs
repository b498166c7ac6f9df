use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use wxmon_common::types::{Reading, StationStatus};

/// A telemetry record as it arrives off the wire, before any checking.
/// Unknown JSON keys are ignored; wrong value types fail the decode.
#[derive(Debug, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub solar_radiation: Option<f64>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Why a telemetry message was rejected. Rejection is a per-message
/// outcome, never a process failure; the consumer acks rejected
/// messages and counts them.
#[derive(Debug, thiserror::Error)]
pub enum RejectionReason {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("timestamp beyond clock-skew tolerance")]
    FutureTimestamp,
}

impl RejectionReason {
    /// Stable code used as a metrics label and in structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::MissingField(_) => "MISSING_FIELD",
            RejectionReason::OutOfRange { .. } => "OUT_OF_RANGE",
            RejectionReason::Malformed(_) => "MALFORMED",
            RejectionReason::FutureTimestamp => "FUTURE_TIMESTAMP",
        }
    }
}

/// Physical ranges for each sensor field, both bounds inclusive.
/// Values outside are rejected, never clamped.
const RANGES: [(&str, f64, f64); 7] = [
    ("temperature", -80.0, 60.0),
    ("humidity", 0.0, 100.0),
    ("pressure", 800.0, 1200.0),
    ("wind_speed", 0.0, 200.0),
    ("precipitation", 0.0, 500.0),
    ("solar_radiation", 0.0, 1500.0),
    ("battery_level", 0.0, 100.0),
];

fn sensor(raw: &RawReading, name: &str) -> Option<f64> {
    match name {
        "temperature" => raw.temperature,
        "humidity" => raw.humidity,
        "pressure" => raw.pressure,
        "wind_speed" => raw.wind_speed,
        "precipitation" => raw.precipitation,
        "solar_radiation" => raw.solar_radiation,
        "battery_level" => raw.battery_level,
        _ => None,
    }
}

/// Decode a raw payload into the wire schema. Only JSON that does not
/// parse into [`RawReading`] is malformed here; semantic checks live in
/// [`validate`].
pub fn decode(payload: &[u8]) -> Result<RawReading, RejectionReason> {
    serde_json::from_slice(payload).map_err(|e| RejectionReason::Malformed(e.to_string()))
}

/// Normalize a decoded record into a [`Reading`], or say precisely why
/// it is unacceptable. Pure: safe to call concurrently and repeatedly.
///
/// `clock_skew` is how far a timestamp may sit in the future before the
/// record is rejected as FUTURE_TIMESTAMP (producers with drifting
/// clocks are tolerated up to this bound).
pub fn validate(
    raw: RawReading,
    now: DateTime<Utc>,
    clock_skew: Duration,
) -> Result<Reading, RejectionReason> {
    let station_id = match raw.station_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => return Err(RejectionReason::MissingField("station_id")),
    };

    let Some(ts_raw) = raw.timestamp.as_deref() else {
        return Err(RejectionReason::MissingField("timestamp"));
    };
    let timestamp = DateTime::parse_from_rfc3339(ts_raw)
        .map_err(|_| RejectionReason::Malformed(format!("invalid timestamp: {ts_raw}")))?
        .with_timezone(&Utc);
    if timestamp > now + clock_skew {
        return Err(RejectionReason::FutureTimestamp);
    }

    let Some(status_raw) = raw.status.as_deref() else {
        return Err(RejectionReason::MissingField("status"));
    };
    let status: StationStatus = status_raw
        .parse()
        .map_err(|_| RejectionReason::Malformed(format!("invalid status: {status_raw}")))?;

    for (field, min, max) in RANGES {
        if let Some(value) = sensor(&raw, field) {
            if !value.is_finite() || value < min || value > max {
                return Err(RejectionReason::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
    }

    Ok(Reading {
        station_id,
        timestamp,
        temperature: raw.temperature,
        humidity: raw.humidity,
        pressure: raw.pressure,
        wind_speed: raw.wind_speed,
        wind_direction: raw.wind_direction,
        precipitation: raw.precipitation,
        solar_radiation: raw.solar_radiation,
        battery_level: raw.battery_level,
        status,
    })
}
