use crate::error::Result;
use crate::Notifier;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use wxmon_common::types::AlertNotification;

/// AMQP publisher sink: serializes the notification and publishes it to
/// a topic exchange, so downstream services (pagers, chat bridges) can
/// bind their own queues. Publishes with confirms and persistent
/// delivery mode; reconnects lazily if the broker closed the connection.
pub struct AmqpNotifier {
    url: String,
    exchange: String,
    routing_key: String,
    state: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpNotifier {
    pub fn new(url: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            url: url.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            state: Mutex::new(None),
        }
    }

    async fn channel(&self) -> Result<Channel> {
        let mut state = self.state.lock().await;
        if let Some((_, channel)) = state.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
            tracing::warn!("AMQP notifier connection lost, reconnecting");
            *state = None;
        }

        let conn = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        *state = Some((conn, channel.clone()));
        Ok(channel)
    }
}

#[async_trait]
impl Notifier for AmqpNotifier {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        let channel = self.channel().await?;
        let payload = serde_json::to_vec(notification)?;
        channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "amqp"
    }
}
