use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleetgc_collector::FleetCollector;
use fleetgc_core::{parse_duration, EventRegistry};
use fleetgc_kubehub::{
    fleet_autoscaler_informer, fleet_informer, Broadcaster, BroadcasterConfig, KubeFleetCache, KubeRemoteStore,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleetgc", version, about = "Delete Agones Fleets once their octops.io/ttl has elapsed")]
struct Cli {
    /// Debug mode.
    #[arg(long, env = "FLEETGC_DEBUG")]
    debug: bool,

    /// Path for the kubeconfig file. Only required for development.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Resync interval, e.g. 15s, 1m, 2h.
    #[arg(long = "sync-period", env = "FLEETGC_SYNC_PERIOD", default_value = "15s", value_parser = parse_period)]
    sync_period: Duration,

    /// Maximum number of concurrent reconciles.
    #[arg(long = "max-concurrent", env = "FLEETGC_MAX_CONCURRENT", default_value_t = 5)]
    max_concurrent: usize,

    /// Prometheus exporter bind address.
    #[arg(long = "metrics-addr", env = "FLEETGC_METRICS_ADDR", default_value = "0.0.0.0:8095")]
    metrics_addr: SocketAddr,

    /// Only watch this namespace (default: all namespaces).
    #[arg(long = "namespace", env = "FLEETGC_NAMESPACE")]
    namespace: Option<String>,

    /// Capacity of the event queue between informers and reconcilers.
    #[arg(long = "queue-capacity", env = "FLEETGC_QUEUE_CAPACITY", default_value_t = 1024)]
    queue_capacity: usize,
}

fn parse_period(s: &str) -> Result<Duration, String> {
    let d = parse_duration(s).map_err(|e| e.to_string())?;
    if d.is_zero() {
        return Err("sync period must be greater than zero".into());
    }
    Ok(d)
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let env = std::env::var("FLEETGC_LOG").unwrap_or_else(|_| default.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    match builder.with_http_listener(addr).install() {
        Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
        Err(e) => warn!(error = %e, "failed to install metrics exporter"),
    }
}

async fn kube_client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?
        }
        None => kube::Config::infer().await.context("inferring kube config")?,
    };
    kube::Client::try_from(config).context("building kube client")
}

async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    token.cancel();
}

async fn run(cli: Cli) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "fleetgc");
    init_metrics(cli.metrics_addr);

    let token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(token.clone()));

    let client = kube_client(cli.kubeconfig.as_deref()).await?;
    let ns = cli.namespace.as_deref();
    let fleets = fleet_informer(client.clone(), ns);
    let autoscalers = fleet_autoscaler_informer(client.clone(), ns);

    let collector = Arc::new(FleetCollector::new(
        KubeFleetCache::new(fleets.store()),
        KubeRemoteStore::new(client),
    ));

    let config = BroadcasterConfig {
        sync_period: cli.sync_period,
        max_concurrent_reconcile: cli.max_concurrent,
        queue_capacity: cli.queue_capacity,
    };
    let broadcaster = Broadcaster::new(Arc::clone(&collector), Arc::new(EventRegistry::standard()), config, token)
        .with_informer(fleets)
        .with_informer(autoscalers);

    info!("starting fleet garbage collector");
    broadcaster
        .start_after(collector.has_synced())
        .await
        .context("Agones failed to sync cache")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    if let Err(e) = run(cli).await {
        error!(error = ?e, "fleetgc failed");
        std::process::exit(1);
    }
}
