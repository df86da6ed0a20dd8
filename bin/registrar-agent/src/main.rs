use anyhow::Result;
use clap::Parser;
use registrar_core::Snapshot;
use registrar_sources::{
    ClusterSource, HttpRegistryClient, LocalFileSource, LogOnlyRegistryClient, Poller,
    RegistryClient, RegistrySource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::fmt::init as tracing_init;

mod aggregator;
mod shutdown;

use aggregator::Aggregator;
use shutdown::ShutdownCoordinator;

/// Reconciles service registrations from the cluster, local backend files
/// and the remote registry, and writes the merged state back to the
/// registry when it changes.
#[derive(Parser, Debug)]
#[command(name = "registrar-agent", version)]
struct Args {
    /// Polling and reconciliation interval in seconds
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Do not poll cluster pods
    #[arg(long)]
    no_cluster: bool,

    /// Do not poll local backend files
    #[arg(long)]
    no_local: bool,

    /// Do not poll the remote registry
    #[arg(long)]
    no_registry: bool,

    /// Directory tree holding local backend definitions
    #[arg(long, default_value = "/etc/registrar/backends")]
    backend_dir: PathBuf,

    /// Remote registry base URL; without it, writes are logged only
    #[arg(long)]
    registry_url: Option<String>,

    /// Restrict pod polling to one namespace (default: all namespaces)
    #[arg(long)]
    kube_namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let args = Args::parse();
    let interval = Duration::from_secs(args.interval_secs);

    info!("Starting registrar-agent...");

    let shutdown = ShutdownCoordinator::new();
    let cancel = shutdown.subscribe();

    let (cluster_tx, cluster_rx) = watch::channel(Snapshot::new());
    let (local_tx, local_rx) = watch::channel(Snapshot::new());
    let (registry_tx, registry_rx) = watch::channel(Snapshot::new());

    let registry_client: Arc<dyn RegistryClient> = match &args.registry_url {
        Some(url) => Arc::new(HttpRegistryClient::new(url)?),
        None => {
            info!("No registry URL configured, writes will be logged only");
            Arc::new(LogOnlyRegistryClient)
        }
    };

    let mut workers = JoinSet::new();

    if args.no_cluster {
        drop(cluster_tx);
    } else {
        let client = kube::Client::try_default().await?;
        let source = ClusterSource::new(client, args.kube_namespace.clone());
        workers.spawn(Poller::new(source, cluster_tx).run(interval, shutdown.subscribe()));
    }

    if args.no_local {
        drop(local_tx);
    } else {
        let source = LocalFileSource::new(args.backend_dir.clone());
        workers.spawn(Poller::new(source, local_tx).run(interval, shutdown.subscribe()));
    }

    if args.no_registry {
        drop(registry_tx);
    } else {
        let source = RegistrySource::new(registry_client.clone());
        workers.spawn(Poller::new(source, registry_tx).run(interval, shutdown.subscribe()));
    }

    let aggregator = Aggregator::new(cluster_rx, local_rx, registry_rx, registry_client);
    workers.spawn(aggregator.run(interval, cancel));

    tokio::spawn(shutdown.listen());

    // Every poller and the aggregator must observe cancellation and return
    // before the process exits.
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            error!("Worker task failed: {}", e);
        }
    }

    info!("All tasks stopped, exiting");
    Ok(())
}
