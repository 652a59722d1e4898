//! Order book depth engine entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depthbook::api::{create_router, AppState};
use depthbook::config::Config;
use depthbook::feed;
use depthbook::metrics;
use depthbook::orderbook::Registry;
use depthbook::utils::shutdown_signal;

/// Order book depth engine.
#[derive(Parser, Debug)]
#[command(name = "depthbook")]
#[command(about = "Snapshot/delta order book engine with a read-only HTTP surface")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default).
    Serve {
        /// HTTP server port, overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,

        /// JSON-lines feed to load before reporting ready, overrides REPLAY_PATH.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Replay a JSON-lines feed and print the resulting books.
    Replay {
        /// Feed file.
        file: PathBuf,

        /// Abort on the first malformed line.
        #[arg(long)]
        strict: bool,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("depthbook=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    if args.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Replay { file, strict }) => cmd_replay(file, strict).await,
        Some(Command::Serve { port, replay }) => cmd_serve(port, replay).await,
        None => cmd_serve(None, None).await,
    }
}

/// Load and validate configuration, logging failures.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DEPTHBOOK - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Buffer Limit: {} updates", config.depth_buffer_limit);
    println!("  Pool Retention: {}ms", config.pool_retention_ms);
    println!("  Checksum Levels: {}", config.checksum_levels);
    println!("  Verify Books: {}", config.verify_orderbook);
    println!(
        "  Sequencing: {}",
        if config.strict_sequencing { "Strict" } else { "Unsequenced" }
    );
    match &config.replay_path {
        Some(path) => println!("  Replay: {}", path.display()),
        None => println!("  Replay: Disabled"),
    }
    println!("  Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

async fn cmd_replay(file: PathBuf, strict: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    metrics::init_metrics();

    let registry = Registry::from_config(&config);
    let summary = feed::replay_file(&registry, &file, strict).await?;

    println!("======================================================================");
    println!("REPLAY: {}", file.display());
    println!("======================================================================");
    println!(
        "  Lines: {}  Applied: {}  Buffered: {}  Discarded: {}",
        summary.lines, summary.applied, summary.buffered, summary.discarded
    );
    println!(
        "  Synced: {}  Resyncs: {}  Rejected: {}",
        summary.synced, summary.resyncs, summary.rejected
    );
    println!("----------------------------------------------------------------------");

    let mut statuses = registry.statuses();
    statuses.sort_by_key(|s| s.key.to_string());
    for status in statuses {
        println!(
            "  {:<32} {:<10} id={:<10} bids={:<5} asks={:<5}",
            status.key.to_string(),
            status.state.to_string(),
            status.last_update_id,
            status.bid_levels,
            status.ask_levels
        );
        if let Ok(book) = registry.get(&status.key) {
            println!(
                "    best bid: {}  best ask: {}",
                book.best_bid().map_or("-".to_string(), |p| p.to_string()),
                book.best_ask().map_or("-".to_string(), |p| p.to_string())
            );
        }
    }

    let pool = registry.pool().stats();
    println!("----------------------------------------------------------------------");
    println!(
        "  Pool: allocated={} reused={} purged={} resident={}",
        pool.allocated, pool.reused, pool.purged, pool.resident
    );
    println!("======================================================================");

    Ok(())
}

async fn cmd_serve(port: Option<u16>, replay: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = load_config()?;

    // Override with CLI args if provided
    if let Some(port) = port {
        config.port = port;
    }
    if replay.is_some() {
        config.replay_path = replay;
    }

    info!("Configuration loaded successfully");
    info!(
        buffer_limit = config.depth_buffer_limit,
        retention_ms = config.pool_retention_ms,
        verify = config.verify_orderbook,
        strict = config.strict_sequencing,
        "Depth engine configured"
    );

    // Install Prometheus recorder before describing metrics
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {} (continuing without metrics)", e);
            None
        }
    };
    metrics::init_metrics();

    let registry = Arc::new(Registry::from_config(&config));
    let mut app_state = AppState::new(Arc::clone(&registry));
    if let Some(handle) = prometheus {
        app_state = app_state.with_metrics(handle);
    }

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    if let Some(path) = &config.replay_path {
        info!("Replaying {}", path.display());
        if let Err(e) = feed::replay_file(&registry, path, false).await {
            error!("Replay failed: {}", e);
        }
    }

    app_state.set_ready(true);
    info!(books = registry.len(), "Depth engine ready");

    server_handle.await??;
    info!("Server stopped");

    Ok(())
}
