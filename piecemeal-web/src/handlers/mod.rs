//! HTTP request handlers organized by functionality

pub mod api;
pub mod commands;
pub mod range;
pub mod streaming;

// Re-export handler functions
pub use api::{Stats, TorrentStats, TorrentSummary, api_stats, api_torrent_files, api_torrents};
pub use commands::{
    cmd_clear_cache, cmd_clear_cache_key, cmd_clear_database, cmd_clear_metadata, cmd_open_path,
    cmd_reset_path, cmd_reset_paths, cmd_set_view_mode,
};
pub use range::{ByteRange, parse_range_header};
pub use streaming::{StreamingHttpError, stream_file};
