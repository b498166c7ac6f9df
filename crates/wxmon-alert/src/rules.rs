use std::str::FromStr;
use wxmon_common::types::{Severity, SENSOR_FIELDS};
use wxmon_storage::AlertConfigRow;

/// Comparison operator of a threshold rule, applied exactly as declared:
/// no epsilon, no hysteresis band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterEqual),
            "<=" => Ok(Self::LessEqual),
            "==" | "=" => Ok(Self::Equal),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, ">"),
            Self::LessThan => write!(f, "<"),
            Self::GreaterEqual => write!(f, ">="),
            Self::LessEqual => write!(f, "<="),
            Self::Equal => write!(f, "=="),
        }
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => value == threshold,
        }
    }

    /// Short token used when deriving an alert type name.
    pub fn short(&self) -> &'static str {
        match self {
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::GreaterEqual => "gte",
            Self::LessEqual => "lte",
            Self::Equal => "eq",
        }
    }
}

/// A parsed, evaluation-ready alert rule.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub id: String,
    pub name: String,
    pub field: String,
    pub op: CompareOp,
    pub threshold: f64,
    pub severity: Severity,
}

/// Why a persisted configuration row could not be turned into a rule.
#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    #[error("unknown field_name '{0}'")]
    UnknownField(String),
    #[error("invalid operator: {0}")]
    BadOperator(String),
    #[error("invalid severity: {0}")]
    BadSeverity(String),
}

impl RuleSpec {
    /// The alert slot this rule owns, e.g. `battery_level_lt_20`.
    /// Deterministic per (field, operator, threshold), the same tuple
    /// the configuration uniqueness constraint covers.
    pub fn alert_type(&self) -> String {
        format!("{}_{}_{}", self.field, self.op.short(), self.threshold)
    }

    /// Human-readable breach message for a concrete reading value.
    pub fn message(&self, station_id: &str, value: f64) -> String {
        format!(
            "{}: {} {} {} {} on {}",
            self.name, self.field, value, self.op, self.threshold, station_id
        )
    }
}

impl TryFrom<&AlertConfigRow> for RuleSpec {
    type Error = RuleParseError;

    fn try_from(row: &AlertConfigRow) -> Result<Self, Self::Error> {
        if !SENSOR_FIELDS.contains(&row.field_name.as_str()) {
            return Err(RuleParseError::UnknownField(row.field_name.clone()));
        }
        let op = row
            .operator
            .parse::<CompareOp>()
            .map_err(RuleParseError::BadOperator)?;
        let severity = row
            .severity
            .parse::<Severity>()
            .map_err(RuleParseError::BadSeverity)?;
        Ok(RuleSpec {
            id: row.id.clone(),
            name: row.name.clone(),
            field: row.field_name.clone(),
            op,
            threshold: row.threshold_value,
            severity,
        })
    }
}
