use std::time::Duration;

use tracing_subscriber::EnvFilter;

use txsentinel::health::UpstreamHealth;
use txsentinel::{Config, MonitorHandle, WsConnector, spawn_monitor};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("txsentinel=info".parse().expect("static log directive")),
        )
        .init();

    tracing::info!("🛡️ TxSentinel starting...");

    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let config = Config::load(&config_path);
    tracing::info!("Config: {:?}", config);

    if config.health.enabled {
        probe_upstream(&config).await;
    }

    let status_every = Duration::from_secs(config.report.status_interval_secs.max(1));
    let connect_on_start = config.stream.connect_on_start;

    let (handle, monitor_task) = spawn_monitor(config, Box::new(WsConnector));
    tracing::info!("Monitor started");

    if connect_on_start {
        if let Err(e) = handle.request_connect() {
            tracing::error!("Could not request connect: {e}");
        }
    }

    let mut ticker = tokio::time::interval(status_every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => log_status(&handle),
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::warn!("Ctrl-C handler failed: {e}");
                }
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    if handle.shutdown().is_ok() {
        if let Err(e) = monitor_task.await {
            tracing::warn!("Monitor task ended abnormally: {e}");
        }
    }
    log_status(&handle);
}

async fn probe_upstream(config: &Config) {
    let health = match UpstreamHealth::from_config(&config.health, &config.stream.url) {
        Ok(health) => health,
        Err(e) => {
            tracing::warn!("Skipping upstream health check: {e}");
            return;
        }
    };
    match health.check().await {
        Ok(status) if status.model_loaded => {
            tracing::info!(url = %health.url(), "Upstream {}: scoring model loaded", status.status)
        }
        Ok(status) => tracing::warn!(
            url = %health.url(),
            "Upstream {} but scoring model not loaded, expect fallback scores",
            status.status
        ),
        Err(e) => tracing::warn!(url = %health.url(), "Upstream health check failed: {e}"),
    }
}

fn log_status(handle: &MonitorHandle) {
    let view = handle.view();
    let s = &view.summary;
    tracing::info!(
        "[{:?}] {} | total {} | blocked {} | saved ${:.2} | critical {} | accuracy {:.1}% | decode failures {}",
        view.connection.status,
        view.connection.message,
        s.total,
        s.blocked,
        s.saved,
        s.critical,
        s.accuracy,
        view.decode_failures
    );
    if let Some(latest) = view.anomalies.first() {
        tracing::info!(
            "Latest anomaly {} {}: ${:.2} at {} ({})",
            latest.effective_threat().emoji(),
            latest.short_id(),
            latest.amount,
            latest.location,
            latest.timestamp.format("%H:%M:%S")
        );
    }
}
