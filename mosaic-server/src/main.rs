//! Mosaic server - main entry point
//!
//! Hosts grid snapshot persistence, media blob storage, the ffmpeg
//! composition pipeline, and the HTTP/SSE surface consumed by
//! contributing and viewing sessions.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mosaic_common::config::MosaicConfig;
use mosaic_common::events::EventBus;
use mosaic_server::api::{self, AppContext};
use mosaic_server::config::{PipelineConfig, ServerConfig};
use mosaic_server::notify::{MailerClient, NullNotifier, Notifier};
use mosaic_server::pipeline::{ffmpeg::FfmpegClient, CompositionPipeline};
use mosaic_server::storage::MediaStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mosaic-server
#[derive(Parser, Debug)]
#[command(name = "mosaic-server")]
#[command(about = "Composition and grid state server for the mosaic video wall")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5750", env = "MOSAIC_PORT")]
    port: u16,

    /// SQLite database path
    #[arg(long, default_value = "mosaic.db", env = "MOSAIC_DATABASE")]
    database: PathBuf,

    /// Root folder for media blobs and pipeline scratch space
    #[arg(short, long, default_value = "media", env = "MOSAIC_MEDIA_ROOT")]
    media_root: PathBuf,

    /// Public base URL media keys resolve under
    #[arg(long, default_value = "http://localhost:5750", env = "MOSAIC_PUBLIC_URL")]
    public_base_url: String,

    /// ffmpeg binary name or path
    #[arg(long, default_value = "ffmpeg", env = "MOSAIC_FFMPEG")]
    ffmpeg: String,

    /// Mail API endpoint for distribution notifications
    #[arg(long, env = "MOSAIC_MAIL_ENDPOINT")]
    mail_endpoint: Option<String>,

    /// Optional TOML config file for shared settings
    #[arg(long, env = "MOSAIC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let shared = MosaicConfig::resolve(args.config.as_deref(), "MOSAIC_CONFIG")
        .context("Failed to load configuration")?;
    let config = ServerConfig {
        port: args.port,
        database: args.database,
        media_root: args.media_root,
        public_base_url: args.public_base_url,
        ffmpeg_binary: args.ffmpeg,
        mail_endpoint: args.mail_endpoint,
        pipeline: PipelineConfig::default(),
        shared,
    };

    info!("Starting mosaic server on port {}", config.port);
    info!("Media root: {}", config.media_root.display());

    let db_pool = mosaic_server::db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    let media = Arc::new(
        MediaStore::new(&config.media_root, config.public_base_url.clone())
            .context("Failed to open media store")?,
    );
    let ffmpeg =
        FfmpegClient::new(&config.ffmpeg_binary).context("Failed to locate ffmpeg binary")?;
    let notifier: Arc<dyn Notifier> = match &config.mail_endpoint {
        Some(endpoint) => {
            Arc::new(MailerClient::new(endpoint.clone()).context("Failed to build mail client")?)
        }
        None => Arc::new(NullNotifier),
    };

    let bus = EventBus::new(100);
    let pipeline = Arc::new(
        CompositionPipeline::new(
            ffmpeg,
            Arc::clone(&media),
            notifier,
            bus.clone(),
            config.pipeline.clone(),
            config.shared.attachment_ceiling_bytes,
        )
        .context("Failed to build composition pipeline")?,
    );

    let ctx = AppContext {
        db_pool,
        media,
        pipeline,
        bus,
        grid_version: Arc::new(AtomicU64::new(0)),
    };

    tokio::select! {
        result = api::server::run(ctx, config.port) => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }
    Ok(())
}
