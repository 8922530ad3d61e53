//! Demo HTTP server guarded by the Tor exit blocker.

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tor_exit_block::{Config, TorBlock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "guarded-server")]
#[command(about = "Serve a hello-world page that refuses Tor exit relays")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => Config::default(),
    };

    if args.validate {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    let guard = TorBlock::new(config)?;
    let scheduler = guard.run();

    let app = Router::new()
        .route("/", get(|| async { "Hello from a Tor-free zone\n" }))
        .layer(guard.layer());

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(
        listen = %args.listen,
        source = %guard.config().exit_address_url,
        refresh_secs = guard.config().refresh_interval_seconds,
        "Starting guarded server"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    scheduler.shutdown().await;
    info!("Server stopped");

    Ok(())
}
