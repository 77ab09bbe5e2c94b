mod migrations;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cctv_core::{
    bootstrap::{init_database, load_config},
    logging,
    repository::Repositories,
    CameraCatalog,
};
use cctv_live::{build_detector, FfmpegSourceFactory, LiveHub};

use server::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "cctv-relay")]
#[command(about = "CCTV relay: HLS proxy, MJPEG feed and live detection", long_about = None)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, short, env = "CCTV_CONFIG_PATH")]
    config: Option<String>,

    /// HTTP listen host, overrides `server.host`
    #[arg(long, env = "CCTV_HOST")]
    host: Option<String>,

    /// HTTP listen port, overrides `server.port`
    #[arg(long, env = "CCTV_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 2. Initialize logging
    let _log_guard = logging::init_logging(&config.logging)?;
    info!("CCTV relay starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize database and run migrations
    let pool = init_database(&config).await?;
    if let Some(pool) = &pool {
        migrations::run_migrations(pool).await?;
    }
    let repositories = Repositories::from_pool(pool);

    // 4. Load the camera catalog
    let catalog = Arc::new(CameraCatalog::from_file(&config.catalog.path)?);
    info!("Camera catalog loaded: {} device(s)", catalog.len());

    // 5. Start the primary capture
    let factory = Arc::new(FfmpegSourceFactory::new(config.capture.clone()));
    let hub = Arc::new(LiveHub::start(&config.capture, factory));

    // 6. Select the detector
    let detector = build_detector(&config.detection)?;
    info!("Detector: {}", detector.name());

    // 7. Serve
    let state = cctv_api::AppState::new(
        Arc::new(config),
        catalog,
        repositories,
        hub,
        detector,
    )?;
    RelayServer::new(state).start().await
}
