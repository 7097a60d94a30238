use std::sync::Arc;

use activity_aggregator::aggregation::Trigger;
use activity_aggregator::config::Config;
use activity_aggregator::logging::{init_tracing, LogConfig};
use activity_aggregator::services::{HeartbeatSummarizer, StoreBackend};
use activity_aggregator::store::Store;
use activity_aggregator::workers::AggregationScheduler;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting activity-aggregator");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let backend = Arc::new(StoreBackend::new(store.clone()));
    let summarizer = Arc::new(HeartbeatSummarizer::new(
        store.clone(),
        config.aggregation.heartbeat_timeout(),
    ));
    let trigger = Trigger::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        chrono::Local,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let scheduler = AggregationScheduler::new(
        trigger,
        summarizer,
        backend,
        shutdown_tx.subscribe(),
        &config.aggregation,
    );

    let scheduler_handle = tokio::spawn(scheduler.start());
    tokio::spawn(shutdown_signal(shutdown_tx));

    match scheduler_handle.await {
        Ok(Ok(stats)) => tracing::info!(
            persisted = stats.persisted,
            "Aggregation scheduler exited normally"
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Aggregation scheduler failed to start");
            std::process::exit(1);
        }
        Err(e) => tracing::error!(error = %e, "Aggregation scheduler task panicked"),
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
