use crate::processor::{ProcessOutcome, Processor};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Broker wiring for the ingestion side.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub url: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub prefetch: u16,
    pub workers: usize,
    pub max_delivery_attempts: u64,
}

impl ConsumerSettings {
    pub fn dead_letter_exchange(&self) -> String {
        format!("{}.dlx", self.exchange)
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dead", self.queue)
    }

    pub fn dead_letter_routing_key(&self) -> String {
        format!("{}.dead", self.routing_key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("Ingest: broker error: {0}")]
    Broker(#[from] lapin::Error),
}

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_SECS: u64 = 5;

/// Connect to the broker with bounded retries. Exhausting the budget is
/// an unrecoverable startup failure and bubbles up to `main`.
pub async fn connect(url: &str) -> Result<Connection, ConsumeError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conn) => {
                tracing::info!("Connected to broker");
                return Ok(conn);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                tracing::error!(
                    attempt,
                    error = %e,
                    "Broker connection failed, retrying in {CONNECT_RETRY_SECS}s"
                );
                tokio::time::sleep(std::time::Duration::from_secs(CONNECT_RETRY_SECS)).await;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Broker unreachable, giving up");
                return Err(e.into());
            }
        }
    }
}

/// Declare the durable topology: topic exchange and queue, plus the
/// dead-letter exchange/queue pair that receives messages nacked past
/// the redelivery budget.
pub async fn declare_topology(
    channel: &Channel,
    settings: &ConsumerSettings,
) -> Result<(), ConsumeError> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    channel
        .exchange_declare(
            &settings.exchange,
            ExchangeKind::Topic,
            durable,
            FieldTable::default(),
        )
        .await?;
    channel
        .exchange_declare(
            &settings.dead_letter_exchange(),
            ExchangeKind::Topic,
            durable,
            FieldTable::default(),
        )
        .await?;

    let mut queue_args = FieldTable::default();
    queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(settings.dead_letter_exchange().into()),
    );
    queue_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(settings.dead_letter_routing_key().into()),
    );
    channel
        .queue_declare(
            &settings.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            queue_args,
        )
        .await?;
    channel
        .queue_declare(
            &settings.dead_letter_queue(),
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            &settings.queue,
            &settings.exchange,
            &settings.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &settings.dead_letter_queue(),
            &settings.dead_letter_exchange(),
            &settings.dead_letter_routing_key(),
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// One consumer worker: its own channel, prefetch window and consumer
/// tag. Processes one message to completion (including ack/nack) before
/// taking the next; a shutdown signal is only observed between
/// messages, so the in-flight message always finishes.
pub async fn run_worker(
    worker: usize,
    channel: Channel,
    settings: ConsumerSettings,
    processor: Arc<Processor>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConsumeError> {
    channel
        .basic_qos(settings.prefetch, BasicQosOptions::default())
        .await?;
    let mut consumer = channel
        .basic_consume(
            &settings.queue,
            &format!("wxmon-worker-{worker}"),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!(worker, queue = %settings.queue, "Consumer worker started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(worker, "Consumer stream ended");
                    break;
                };
                let delivery = delivery?;
                handle_delivery(worker, &delivery, &processor, settings.max_delivery_attempts).await;
            }
        }
    }

    tracing::info!(worker, "Consumer worker stopped");
    Ok(())
}

async fn handle_delivery(
    worker: usize,
    delivery: &Delivery,
    processor: &Processor,
    max_attempts: u64,
) {
    let started = Instant::now();
    let outcome = processor.process(&delivery.data).await;
    histogram!("wxmon_processing_seconds").record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(ProcessOutcome::Stored { alerts }) => {
            counter!("wxmon_messages_processed_total").increment(1);
            if alerts > 0 {
                tracing::debug!(worker, alerts, "Reading stored with alert activity");
            }
            ack(delivery).await;
        }
        Ok(ProcessOutcome::Duplicate) => {
            counter!("wxmon_messages_processed_total").increment(1);
            tracing::debug!(worker, "Duplicate delivery collapsed");
            ack(delivery).await;
        }
        Ok(ProcessOutcome::Rejected(reason)) => {
            // A permanently malformed message must never block the
            // queue: ack it away and account for it.
            counter!("wxmon_messages_rejected_total", "reason" => reason.code()).increment(1);
            tracing::warn!(worker, code = reason.code(), error = %reason, "Rejected telemetry message");
            ack(delivery).await;
        }
        Err(e) => {
            counter!("wxmon_messages_failed_total").increment(1);
            let attempt = delivery_attempt(delivery);
            if attempt >= max_attempts {
                counter!("wxmon_messages_dead_lettered_total").increment(1);
                tracing::error!(
                    worker,
                    attempt,
                    error = %e,
                    "Redelivery budget exhausted, dead-lettering message"
                );
                nack(delivery, false).await;
            } else {
                tracing::warn!(worker, attempt, error = %e, "Transient failure, requeueing message");
                nack(delivery, true).await;
            }
        }
    }
}

/// Which attempt this delivery is. Quorum queues carry the count in the
/// `x-delivery-count` header; classic queues only expose the
/// `redelivered` flag, which caps the estimate at two.
fn delivery_attempt(delivery: &Delivery) -> u64 {
    let counted = delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|table| {
            table
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == "x-delivery-count")
        })
        .and_then(|(_, value)| match value {
            AMQPValue::LongLongInt(n) => Some(*n as u64),
            AMQPValue::LongInt(n) => Some(*n as u64),
            AMQPValue::LongUInt(n) => Some(u64::from(*n)),
            AMQPValue::ShortInt(n) => Some(*n as u64),
            AMQPValue::ShortUInt(n) => Some(u64::from(*n)),
            _ => None,
        });
    match counted {
        Some(count) => count + 1,
        None if delivery.redelivered => 2,
        None => 1,
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        tracing::error!(error = %e, "Failed to ack delivery");
    }
}

async fn nack(delivery: &Delivery, requeue: bool) {
    let opts = BasicNackOptions {
        requeue,
        ..Default::default()
    };
    if let Err(e) = delivery.nack(opts).await {
        tracing::error!(error = %e, "Failed to nack delivery");
    }
}

/// Periodically mirror the broker's queue depth into a gauge for the
/// dashboard stack. Read-only; uses a passive declare so a missing
/// queue is an error rather than a silent re-creation.
pub async fn poll_queue_depth(
    channel: Channel,
    queue: String,
    every_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(every_secs));
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                match channel
                    .queue_declare(
                        &queue,
                        QueueDeclareOptions { passive: true, ..Default::default() },
                        FieldTable::default(),
                    )
                    .await
                {
                    Ok(state) => {
                        gauge!("wxmon_queue_depth").set(f64::from(state.message_count()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read queue depth");
                    }
                }
            }
        }
    }
}
