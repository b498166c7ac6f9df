mod alert;
mod reading;
mod rule;
mod station;

pub use alert::{AlertRow, NewAlert, OpenAlertInsert};
pub use rule::AlertConfigRow;
pub use station::StationRow;

use crate::error::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Handle to the relational persistence boundary.
///
/// Owns a single connection pool; cheap to clone behind an `Arc`. All
/// mutation of alert lifecycle state goes through the methods on this
/// type so the uniqueness constraints and conditional updates stay the
/// single source of truth.
pub struct WeatherStore {
    db: DatabaseConnection,
}

impl WeatherStore {
    /// Connect to the database at `url` (Postgres in production, SQLite
    /// in tests). Does not run migrations; callers apply
    /// `migration::Migrator` before first use.
    pub async fn connect(url: &str, connect_timeout_secs: u64) -> Result<Self> {
        let mut opts = ConnectOptions::new(url.to_string());
        opts.connect_timeout(Duration::from_secs(connect_timeout_secs))
            .sqlx_logging(false);
        let db = Database::connect(opts).await?;
        tracing::debug!("Database connection pool established");
        Ok(Self { db })
    }

    /// Wrap an already-established connection (used by tests).
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
