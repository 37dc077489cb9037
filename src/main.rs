use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use time_sync_status::config::{self, ConfigDocument, DEBUG_ENV};
use time_sync_status::controller::{KubeNodePatcher, NodeReconciler, StatusPoller, DEFAULT_INTERVAL};
use time_sync_status::rest_api::{self, ApiState};
use time_sync_status::sources::{ChronySource, GpsdSource, DEFAULT_CHRONYC};
use time_sync_status::status::StatusStore;

#[derive(Parser, Debug)]
#[command(name = "time-sync-status")]
#[command(about = "Publish chrony and gpsd time synchronization status for a Kubernetes node")]
#[command(version)]
struct Args {
    /// Path of the rendered config document
    #[arg(default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// REST API listen port
    #[arg(short, long, default_value_t = rest_api::DEFAULT_PORT)]
    port: u16,

    /// Seconds between chrony polls
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL.as_secs())]
    interval: u64,

    /// chronyc executable
    #[arg(long, default_value = DEFAULT_CHRONYC)]
    chronyc: String,
}

fn init_tracing() {
    let default_level = if config::debug_enabled(std::env::var(DEBUG_ENV).ok().as_deref()) {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = ConfigDocument::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let node_name = config::node_name_from_env()?;
    info!("Starting time-sync-status for node {}", node_name);

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let store = Arc::new(StatusStore::new());
    let config = Arc::new(config);

    let api_state = Arc::new(ApiState::new(store.clone(), Some(config.clone())));
    let api_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let _api_thread = rest_api::spawn_server_thread(api_state, api_addr)
        .context("failed to start REST API thread")?;

    let gpsd = if config.gps_enabled() {
        Some(GpsdSource::new(config.gps_endpoint(), store.clone()).spawn())
    } else {
        info!("GPS disabled, not connecting to gpsd");
        None
    };

    let reconciler = NodeReconciler::new(Arc::new(KubeNodePatcher::new(client)), node_name);
    let poller = StatusPoller::new(
        ChronySource::new(args.chronyc),
        store,
        reconciler,
        Duration::from_secs(args.interval.max(1)),
    );

    tokio::select! {
        _ = poller.run() => {
            warn!("Status poller exited");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    if let Some(gpsd) = gpsd {
        gpsd.stop().await;
    }

    Ok(())
}
