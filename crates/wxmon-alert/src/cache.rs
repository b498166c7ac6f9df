use crate::rules::RuleSpec;
use std::sync::{Arc, RwLock};
use wxmon_storage::{Result, WeatherStore};

/// Read-through cache over the persisted alert configurations.
///
/// Workers read a shared immutable snapshot (`Arc<Vec<RuleSpec>>`) that
/// is replaced wholesale on refresh, so readers never observe a
/// partially updated rule set. When a reload fails the previous snapshot keeps
/// serving (stale-but-available); the caller logs the failure as
/// non-fatal. A server timer drives `refresh` on a fixed cadence and
/// after administrative changes.
pub struct RuleCache {
    store: Arc<WeatherStore>,
    snapshot: RwLock<Arc<Vec<RuleSpec>>>,
}

impl RuleCache {
    pub fn new(store: Arc<WeatherStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The current rule snapshot, ordered ascending by severity then
    /// insertion, so evaluation visits the most severe rules on a field
    /// last and their events land freshest in the lifecycle manager.
    pub fn snapshot(&self) -> Arc<Vec<RuleSpec>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Reload enabled rules from the store and atomically swap the
    /// snapshot. Rows that fail to parse (unknown field, bad operator
    /// or severity) are skipped with a warning rather than poisoning
    /// the whole set. Returns the number of active rules.
    pub async fn refresh(&self) -> Result<usize> {
        let rows = self.store.list_enabled_alert_configurations().await?;

        let mut rules: Vec<(chrono::DateTime<chrono::Utc>, RuleSpec)> = Vec::new();
        for row in &rows {
            match RuleSpec::try_from(row) {
                Ok(spec) => rules.push((row.created_at, spec)),
                Err(e) => {
                    tracing::warn!(
                        rule = %row.name,
                        id = %row.id,
                        error = %e,
                        "Skipping unusable alert configuration"
                    );
                }
            }
        }
        rules.sort_by(|(a_ts, a), (b_ts, b)| {
            a.severity.cmp(&b.severity).then(a_ts.cmp(b_ts))
        });
        let rules: Vec<RuleSpec> = rules.into_iter().map(|(_, spec)| spec).collect();

        let count = rules.len();
        *self.snapshot.write().unwrap() = Arc::new(rules);
        Ok(count)
    }
}
