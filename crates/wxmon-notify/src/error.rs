/// Errors that can occur while delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// An HTTP request to an external endpoint failed at the transport
    /// level.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Notify: endpoint returned status={status}: {body}")]
    Api { status: u16, body: String },

    /// AMQP connection or publish failure.
    #[error("Notify: broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// Serializing the notification payload failed.
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic delivery error for cases not covered by other variants.
    #[error("Notify: {0}")]
    Other(String),
}

/// Convenience `Result` alias for notification delivery.
pub type Result<T> = std::result::Result<T, NotifyError>;
