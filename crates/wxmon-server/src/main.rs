use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use migration::{Migrator, MigratorTrait};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::interval;
use tracing_subscriber::EnvFilter;
use wxmon_alert::cache::RuleCache;
use wxmon_alert::lifecycle::AlertLifecycleManager;
use wxmon_common::types::Severity;
use wxmon_ingest::consumer::{self, ConsumerSettings};
use wxmon_ingest::processor::Processor;
use wxmon_notify::dispatcher::Dispatcher;
use wxmon_storage::WeatherStore;

use wxmon_server::config::{self, DatabaseConfig};
use wxmon_server::liveness::StationLivenessMonitor;
use wxmon_server::notifiers;
use wxmon_server::rule_seed;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  wxmon-server [config.toml]    Start the ingestion/alerting daemon");
}

#[tokio::main]
async fn main() -> Result<()> {
    wxmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wxmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        arg => {
            let config_path = arg.unwrap_or("config/wxmon.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        db = %config.database.redacted_url(),
        broker = %config.amqp.redacted_url(),
        queue = %config.amqp.queue,
        workers = config.amqp.workers,
        "wxmon-server starting"
    );

    // Prometheus exporter first, so boot-time counters are not lost.
    let metrics_addr: SocketAddr = config.metrics.listen.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;

    // Persistence: unreachable storage after the retry budget is one of
    // the few fatal conditions.
    let store = Arc::new(connect_store(&config.database).await?);
    Migrator::up(store.db(), None).await?;

    if config.rules.seed_defaults {
        if let Err(e) = rule_seed::init_default_rules(&store).await {
            tracing::error!(error = %e, "Failed to seed default alert rules");
        }
    }

    // Notification fan-out and the lifecycle manager it serves.
    let dispatcher = Arc::new(Dispatcher::new(
        notifiers::build_notifiers(&config.notify, &config.amqp),
        Duration::from_secs(config.notify.timeout_secs),
    ));
    let lifecycle = Arc::new(AlertLifecycleManager::new(store.clone(), dispatcher));

    // Rule snapshot: an initial load failure is non-fatal, the cache
    // serves an empty set until the refresh timer succeeds.
    let rules = Arc::new(RuleCache::new(store.clone()));
    match rules.refresh().await {
        Ok(count) => tracing::info!(count, "Alert rules loaded"),
        Err(e) => tracing::error!(error = %e, "Failed to load alert rules, starting with none"),
    }

    let processor = Arc::new(Processor::new(
        store.clone(),
        rules.clone(),
        lifecycle.clone(),
        config.ingest.clock_skew_secs,
        config.ingest.io_timeout_secs,
    ));

    // Broker: connect, declare topology once, then hand each worker its
    // own channel.
    let settings = ConsumerSettings {
        url: config.amqp.url.clone(),
        exchange: config.amqp.exchange.clone(),
        queue: config.amqp.queue.clone(),
        routing_key: config.amqp.routing_key.clone(),
        prefetch: config.amqp.prefetch,
        workers: config.amqp.workers,
        max_delivery_attempts: config.amqp.max_delivery_attempts,
    };
    let conn = consumer::connect(&settings.url).await?;
    {
        let channel = conn.create_channel().await?;
        consumer::declare_topology(&channel, &settings).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker_handles = Vec::with_capacity(settings.workers);
    for worker in 0..settings.workers {
        let channel = conn.create_channel().await?;
        worker_handles.push(tokio::spawn(consumer::run_worker(
            worker,
            channel,
            settings.clone(),
            processor.clone(),
            shutdown_rx.clone(),
        )));
    }

    let depth_channel = conn.create_channel().await?;
    let depth_handle = tokio::spawn(consumer::poll_queue_depth(
        depth_channel,
        settings.queue.clone(),
        config.amqp.queue_depth_poll_secs,
        shutdown_rx.clone(),
    ));

    let refresh_handle = tokio::spawn(refresh_rules_loop(
        rules.clone(),
        config.rules.refresh_secs,
        shutdown_rx.clone(),
    ));

    let liveness_severity: Severity = match config.liveness.severity.parse() {
        Ok(severity) => severity,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid liveness severity, defaulting to CRITICAL");
            Severity::Critical
        }
    };
    let monitor = StationLivenessMonitor::new(
        store.clone(),
        lifecycle.clone(),
        config.liveness.tick_secs,
        config.liveness.staleness_secs,
        liveness_severity,
    );
    let liveness_handle = tokio::spawn(monitor.run(shutdown_rx.clone()));

    tracing::info!(metrics = %metrics_addr, "wxmon-server started");

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    shutdown_tx.send(true).ok();

    // Workers finish their in-flight message before observing the
    // signal; join them so nothing is persisted without its ack.
    for handle in worker_handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Consumer worker ended with error"),
            Err(e) => tracing::error!(error = %e, "Consumer worker panicked"),
        }
    }
    let _ = liveness_handle.await;
    let _ = refresh_handle.await;
    let _ = depth_handle.await;

    tracing::info!("Server stopped");
    Ok(())
}

const STORE_CONNECT_ATTEMPTS: u32 = 10;
const STORE_CONNECT_RETRY_SECS: u64 = 5;

async fn connect_store(config: &DatabaseConfig) -> Result<WeatherStore> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match WeatherStore::connect(&config.url, config.connect_timeout_secs).await {
            Ok(store) => {
                tracing::info!("Connected to database");
                return Ok(store);
            }
            Err(e) if attempt < STORE_CONNECT_ATTEMPTS => {
                tracing::error!(
                    attempt,
                    error = %e,
                    "Database connection failed, retrying in {STORE_CONNECT_RETRY_SECS}s"
                );
                tokio::time::sleep(Duration::from_secs(STORE_CONNECT_RETRY_SECS)).await;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Database unreachable, giving up");
                return Err(e.into());
            }
        }
    }
}

/// Periodic rule snapshot refresh. A failed reload is logged and the
/// previous snapshot keeps serving.
async fn refresh_rules_loop(
    rules: Arc<RuleCache>,
    refresh_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_secs(refresh_secs));
    // The first tick fires immediately and the boot path already loaded.
    tick.tick().await;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                match rules.refresh().await {
                    Ok(count) => tracing::debug!(count, "Alert rules refreshed"),
                    Err(e) => tracing::warn!(error = %e, "Rule refresh failed, serving stale snapshot"),
                }
            }
        }
    }
}
