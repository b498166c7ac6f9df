/// Errors that can occur within the storage layer.
///
/// Unique-constraint races are deliberately *not* an error variant here:
/// the store methods that can race (open-alert insert, reading insert)
/// translate them into their return value, because a losing writer means
/// the database already reflects the same fact.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// A required record was not found.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A persisted column held a value the domain type cannot represent
    /// (e.g. an unknown status string written by a foreign tool).
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
