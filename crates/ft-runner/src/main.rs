//! # ft-runner
//!
//! Main entry point for the futures trading engine.
//!
//! Loads a JSON configuration file, connects the market-data bus, the
//! brokerage gateway and the snapshot service, and serves client sessions
//! until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! ft-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ft_md::bus_feed::BusFeed;
use ft_md::snapshot::RestSnapshots;
use ft_td::rest::RestGateway;
use ft_trader::hours::TradingHours;
use ft_trader::{SessionDeps, TradeServer};
use tokio::sync::watch;
use tracing::{error, info};

/// Futures order execution and assist-trading server.
#[derive(Parser)]
#[command(name = "ft-runner", about = "Futures order execution and assist-trading server")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `meta.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = ft_core::config::load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // 2. Initialize logging
    let module_name = config.meta.module_name.as_deref().unwrap_or("ft-runner");
    let log_dir = cli.log_dir.as_deref().or(config.meta.log_path.as_deref());
    ft_core::logging::init_logging(&cli.log_level, log_dir, module_name, cli.json_logs);

    info!(
        "ft-runner starting: config={}, instrument={}, listen={}",
        cli.config.display(),
        config.trade.instrument_code,
        config.server.listen_addr
    );

    // 3. Connect external services
    let hours = TradingHours::from_config(&config.trade.trading_hours)?;
    let gateway = Arc::new(RestGateway::new(&config.gateway)?);
    let feed = Arc::new(BusFeed::connect(&config.feed)?);
    let snapshot_url = if config.feed.snapshot_url.is_empty() {
        config.gateway.base_url.as_str()
    } else {
        config.feed.snapshot_url.as_str()
    };
    let snapshots = Arc::new(RestSnapshots::new(
        snapshot_url,
        Duration::from_millis(config.gateway.timeout_ms),
    )?);

    let deps = SessionDeps {
        gateway,
        feed: feed.clone(),
        snapshots,
        trade: config.trade.clone(),
        hours,
    };

    // 4. Serve clients until Ctrl+C
    let server = TradeServer::bind(&config.server.listen_addr, deps).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 5. Stop sessions, then the bus connection
    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Err(e)) => error!("server stopped with error: {e:#}"),
        Err(e) => error!("server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    feed.stop().await;

    info!("ft-runner stopped");
    Ok(())
}
