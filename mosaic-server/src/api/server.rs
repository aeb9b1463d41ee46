//! HTTP server setup and routing

use crate::pipeline::CompositionPipeline;
use crate::storage::MediaStore;
use axum::{
    routing::{get, post, put},
    Router,
};
use mosaic_common::events::EventBus;
use mosaic_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: Pool<Sqlite>,
    pub media: Arc<MediaStore>,
    pub pipeline: Arc<CompositionPipeline>,
    pub bus: EventBus,
    /// Bumped on every accepted grid replace; carried in change events
    pub grid_version: Arc<AtomicU64>,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Grid snapshots
        .route("/grid", get(super::handlers::get_current_grid))
        .route("/grid", put(super::handlers::replace_grid))
        .route("/grid/:generation", get(super::handlers::get_grid))
        // Media blobs
        .route("/media", post(super::handlers::upload_media))
        .route("/media/:key/url", get(super::handlers::resolve_media))
        .route("/media/:key/raw", get(super::handlers::fetch_media))
        // Composition
        .route("/compose/merge", post(super::handlers::merge_takes))
        .route("/compose/finalize", post(super::handlers::finalize))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        // Enable CORS for browser sessions
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until shutdown
pub async fn run(ctx: AppContext, port: u16) -> Result<()> {
    let app = build_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Http(format!("Server error: {e}")))?;
    Ok(())
}
