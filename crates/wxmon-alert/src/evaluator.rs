use crate::rules::RuleSpec;
use wxmon_common::types::{AlertAction, AlertEvent, Reading};

/// The slice of open-alert state the evaluator needs for dedup and
/// clear detection. The caller (the ingestion processor) loads it from
/// the store for the reading's station.
#[derive(Debug, Clone)]
pub struct OpenAlert {
    pub alert_type: String,
    pub threshold: f64,
}

/// Evaluate one reading against the active rule set.
///
/// Stateless: every piece of dedup state arrives through `open_alerts`,
/// so the function is safe to call concurrently from any worker. Per
/// rule whose watched field is present on the reading:
///
/// - breach, no open alert of the derived type → `Trigger`;
/// - breach, open alert with an unchanged threshold → nothing (the
///   lifecycle manager already holds the slot);
/// - no breach, open alert of the derived type → `Clear`.
///
/// Alert types no current rule derives (liveness alerts included) are
/// never touched here. Events for different alert types are independent.
pub fn evaluate(reading: &Reading, rules: &[RuleSpec], open_alerts: &[OpenAlert]) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    for rule in rules {
        let Some(value) = reading.field(&rule.field) else {
            continue;
        };
        let alert_type = rule.alert_type();
        let open = open_alerts.iter().find(|a| a.alert_type == alert_type);

        if rule.op.check(value, rule.threshold) {
            if let Some(open) = open {
                if open.threshold == rule.threshold {
                    // Breach is already represented by the open row.
                    continue;
                }
            }
            events.push(AlertEvent {
                station_id: reading.station_id.clone(),
                alert_type,
                action: AlertAction::Trigger,
                value,
                threshold: rule.threshold,
                severity: rule.severity,
                message: rule.message(&reading.station_id, value),
                timestamp: reading.timestamp,
            });
        } else if open.is_some() {
            events.push(AlertEvent {
                station_id: reading.station_id.clone(),
                alert_type,
                action: AlertAction::Clear,
                value,
                threshold: rule.threshold,
                severity: rule.severity,
                message: format!(
                    "{}: {} back within threshold ({} on {})",
                    rule.name, rule.field, value, reading.station_id
                ),
                timestamp: reading.timestamp,
            });
        }
    }

    events
}
