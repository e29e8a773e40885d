//! Process entry point: loads configuration, wires the core components, and
//! runs until a shutdown signal arrives.

use rtt_echo_relay::config::Config;
use rtt_echo_relay::control::rest::AriControlClient;
use rtt_echo_relay::lifecycle::LifecycleManager;
use rtt_echo_relay::metrics::MetricsStore;
use rtt_echo_relay::port_pool::PortPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ZOMBIE_SCRUB_INTERVAL: Duration = rtt_echo_relay::constants::ZOMBIE_SCRUB_INTERVAL;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        },
    };

    let engine_peer_ip = match engine_host_ip(&config.engine_url) {
        Ok(ip) => ip,
        Err(e) => {
            eprintln!("configuration error: ENGINE_URL: {e}");
            std::process::exit(1);
        },
    };

    let control = match AriControlClient::new(&config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("failed to build engine control client: {e}");
            std::process::exit(1);
        },
    };

    let port_pool = Arc::new(PortPool::new(config.port_range.0, config.port_range.1));
    let metrics = Arc::new(MetricsStore::new());
    let service_port = config.service_port;
    let bind_ip = config.bind_ip;
    let metrics_interval = Duration::from_secs(config.metrics_interval_sec);

    let manager = Arc::new(LifecycleManager::new(
        control,
        Arc::clone(&port_pool),
        Arc::clone(&metrics),
        config,
        engine_peer_ip,
    ));

    let event_loop = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_event_loop().await })
    };

    let scrubber = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_scrubber(ZOMBIE_SCRUB_INTERVAL).await })
    };

    let status_server = {
        let metrics = Arc::clone(&metrics);
        let port_pool = Arc::clone(&port_pool);
        let addr = SocketAddr::new(bind_ip, service_port);
        tokio::spawn(async move {
            if let Err(e) = rtt_echo_relay::status::serve(addr, metrics, port_pool).await {
                error!(error = %e, "status endpoint exited");
            }
        })
    };

    let metrics_ticker = {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move { run_metrics_ticker(metrics, metrics_interval).await })
    };

    info!("rtt-echo-relay running");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining active channels");

    event_loop.abort();
    scrubber.abort();
    status_server.abort();
    metrics_ticker.abort();

    manager.shutdown().await;
}

/// Logs a metrics rollup every `interval`, independent of the final SLA
/// report `LifecycleManager::shutdown` emits on the way out.
async fn run_metrics_ticker(metrics: Arc<MetricsStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it.
    loop {
        ticker.tick().await;
        let snapshot = metrics.snapshot();
        info!(
            total_channels = snapshot.total_channels,
            active_channels = snapshot.active_channels,
            total_latencies = snapshot.total_latencies,
            p50_ms = snapshot.latency.p50_ms,
            p95_ms = snapshot.latency.p95_ms,
            p99_ms = snapshot.latency.p99_ms,
            max_ms = snapshot.latency.max_ms,
            late_ratio = snapshot.late_ratio,
            loss_ratio = snapshot.loss_ratio,
            "metrics rollup",
        );
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn engine_host_ip(engine_url: &str) -> Result<std::net::IpAddr, String> {
    let host = engine_url.split(':').next().unwrap_or(engine_url);
    host.parse().map_err(|_| format!("{host:?} is not an IP address"))
}
