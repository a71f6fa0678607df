//! HTTP server for range streaming and host maintenance commands
//!
//! Torrents are registered programmatically with their layout and reader;
//! the server only serves what has been registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use piecemeal_core::{InfoHash, PiecemealConfig, StreamReader, TorrentLayout};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::commands::MaintenanceService;
use crate::handlers::{
    api_stats, api_torrent_files, api_torrents, cmd_clear_cache, cmd_clear_cache_key,
    cmd_clear_database, cmd_clear_metadata, cmd_open_path, cmd_reset_path, cmd_reset_paths,
    cmd_set_view_mode, stream_file,
};

/// Layout and reader of one registered torrent.
#[derive(Clone)]
pub struct TorrentStream {
    pub layout: Arc<TorrentLayout>,
    pub reader: Arc<StreamReader>,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub torrents: Arc<RwLock<HashMap<InfoHash, TorrentStream>>>,
    pub maintenance: Arc<MaintenanceService>,
    pub read_timeout: Duration,
    pub max_range_bytes: u64,
    /// Cancelled on shutdown; every in-flight read listens on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &PiecemealConfig, maintenance: Arc<MaintenanceService>) -> Self {
        Self {
            torrents: Arc::new(RwLock::new(HashMap::new())),
            maintenance,
            read_timeout: config.streaming.read_timeout,
            max_range_bytes: config.server.max_range_bytes,
            shutdown: CancellationToken::new(),
        }
    }

    /// Makes a torrent streamable, replacing any earlier registration.
    pub async fn register_torrent(
        &self,
        info_hash: InfoHash,
        layout: Arc<TorrentLayout>,
        reader: Arc<StreamReader>,
    ) {
        info!(
            "Registered torrent {} ({} files, {} pieces)",
            info_hash,
            layout.files().len(),
            layout.piece_count()
        );
        self.torrents
            .write()
            .await
            .insert(info_hash, TorrentStream { layout, reader });
    }

    pub async fn torrent(&self, info_hash: &InfoHash) -> Option<TorrentStream> {
        self.torrents.read().await.get(info_hash).cloned()
    }
}

/// Builds the router with every streaming, catalog and command route.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Streaming
        .route("/stream/{info_hash}/{file_index}", get(stream_file))
        // Catalog and statistics
        .route("/torrents", get(api_torrents))
        .route("/torrents/{info_hash}/files", get(api_torrent_files))
        .route("/stats", get(api_stats))
        // Maintenance commands
        .route("/cmd/cache/clear", post(cmd_clear_cache))
        .route("/cmd/cache/clear/{key}", post(cmd_clear_cache_key))
        .route("/cmd/cache/metadata/{source}", post(cmd_clear_metadata))
        .route("/cmd/paths/reset", post(cmd_reset_paths))
        .route("/cmd/paths/{name}/reset", post(cmd_reset_path))
        .route("/cmd/paths/{name}/open", post(cmd_open_path))
        .route("/cmd/viewmode/{content_type}", post(cmd_set_view_mode))
        .route("/cmd/database/{target}/clear", post(cmd_clear_database))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `state` on the configured address until its shutdown token fires.
///
/// # Errors
/// Returns the I/O error if binding or serving fails
pub async fn run_server(config: &PiecemealConfig, state: AppState) -> Result<(), std::io::Error> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address).await?;
    info!(
        "Piecemeal server running on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Piecemeal server stopped");
    Ok(())
}
