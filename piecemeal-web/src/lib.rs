//! Piecemeal Web - HTTP range streaming and host maintenance commands
//!
//! Serves byte ranges of registered torrent files through the core stream
//! reader and dispatches maintenance commands to injected host services.

pub mod commands;
pub mod handlers;
pub mod server;

// Re-export main types
pub use commands::MaintenanceService;
pub use server::{AppState, TorrentStream, build_router, run_server};
