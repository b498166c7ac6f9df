//! Notification delivery with pluggable sinks.
//!
//! The alert lifecycle manager publishes every finalized state change to
//! each registered [`Notifier`] through the [`dispatcher::Dispatcher`].
//! A failing sink is logged and isolated; it never affects alert state
//! or the other sinks. Built-in notifiers: structured log, webhook
//! (HTTP POST) and an AMQP publisher.

pub mod channels;
pub mod dispatcher;
pub mod error;


use async_trait::async_trait;
use wxmon_common::types::AlertNotification;

/// A delivery sink for alert notifications.
///
/// Implementations are constructed from configuration at startup (a
/// static name-to-constructor mapping, no runtime discovery) and invoked
/// after each alert state transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the notification through this sink.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after the sink's own retries
    /// (if applicable). The dispatcher treats the error as isolated to
    /// this sink.
    async fn notify(&self, notification: &AlertNotification) -> error::Result<()>;

    /// Returns the sink name used in logs and metrics labels.
    fn name(&self) -> &str;
}
