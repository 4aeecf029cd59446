//! telemetry-qa binary entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry_qa::{
    broker::{register_all, BrokerClient},
    config::{write_sample_config, ConfigLoader},
    http_server::NotificationServer,
    ingest::{DocumentBuilder, Orchestrator},
    logging,
    monitoring::{CadenceMonitor, LastSeenRegistry},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "telemetry-qa")]
#[command(about = "Streaming data-quality service for NGSI-LD sensor telemetry")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "QA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the notification endpoint bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Write a sample configuration to PATH and exit
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "telemetry-qa.toml")]
    generate_config: Option<PathBuf>,

    /// Do not register broker subscriptions at start-up
    #[arg(long)]
    no_subscribe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = args.generate_config {
        write_sample_config(&path)?;
        println!("Sample configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = ConfigLoader::new()
        .load_from_file(args.config.as_ref())
        .load_from_env()
        .build()
        .context("failed to load configuration")?;

    if let Some(bind) = args.bind {
        config.server.bind_addr = bind.to_string();
    }
    if args.no_subscribe {
        config.broker.register_subscriptions = false;
    }

    let _log_guard = logging::init(&config.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        analyses = config.analysis.len(),
        "telemetry-qa starting"
    );

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_addr))?;

    let config = Arc::new(config);
    let broker = Arc::new(
        BrokerClient::new(config.broker.clone()).context("failed to build broker client")?,
    );

    if config.broker.register_subscriptions {
        register_all(broker.as_ref(), &config.analysis, &config.server.public_url).await;
    }

    let last_seen = Arc::new(LastSeenRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        broker.clone(),
        broker.clone(),
        last_seen.clone(),
    ));

    let cancel = CancellationToken::new();
    let monitor = Arc::new(CadenceMonitor::new(
        config.cadence.clone(),
        last_seen,
        broker.clone(),
        DocumentBuilder::new(&config.broker),
    ));
    let monitor_handle = monitor.spawn(cancel.clone());

    let server = NotificationServer::new(orchestrator);
    let result = server.serve(addr, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = monitor_handle.await {
        error!(error = %e, "cadence monitor task failed");
    }

    result.context("notification endpoint failed")?;
    info!("telemetry-qa stopped");
    Ok(())
}
