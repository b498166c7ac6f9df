use crate::config::{AmqpConfig, NotifyConfig};
use wxmon_notify::channels::amqp::AmqpNotifier;
use wxmon_notify::channels::log::LogNotifier;
use wxmon_notify::channels::webhook::WebhookNotifier;
use wxmon_notify::Notifier;

/// Build the notifier set from configuration. Plain static mapping,
/// resolved once at startup; adding a sink type means adding an arm
/// here.
pub fn build_notifiers(notify: &NotifyConfig, amqp: &AmqpConfig) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    if notify.log.enabled {
        notifiers.push(Box::new(LogNotifier));
    }
    if let Some(url) = notify.webhook.url.as_deref() {
        notifiers.push(Box::new(WebhookNotifier::new(url)));
    }
    if notify.amqp.enabled {
        notifiers.push(Box::new(AmqpNotifier::new(
            &amqp.url,
            &notify.amqp.exchange,
            &notify.amqp.routing_key,
        )));
    }

    tracing::info!(
        count = notifiers.len(),
        "Notification sinks configured"
    );
    notifiers
}
