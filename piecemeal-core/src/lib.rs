//! Piecemeal Core - byte-range streaming over multi-file torrents
//!
//! Maps logical files onto a torrent's flat piece space, translates file
//! byte ranges into piece ranges, and serves those ranges through a stream
//! reader that prioritizes and waits for the pieces it needs.

pub mod config;
pub mod layout;
pub mod streaming;
pub mod torrent;
pub mod tracing_setup;
pub mod translate;

// Re-export main types for convenient access
pub use config::{LibraryPaths, PiecemealConfig, ServerConfig, StreamingConfig};
pub use layout::{FileEntry, LayoutError, TorrentFile, TorrentLayout};
pub use streaming::{
    AvailabilityTracker, PieceStore, PriorityTier, StoreError, StreamError, StreamReader,
};
pub use torrent::{InfoHash, PieceIndex};
pub use translate::{PieceSpan, RangeError, distinct_piece_count, translate};

/// Errors that can bubble up from any Piecemeal core subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PiecemealError {
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PiecemealError {
    /// Checks if this error is due to caller input rather than runtime state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PiecemealError::Layout(_)
                | PiecemealError::Range(_)
                | PiecemealError::Configuration { .. }
                | PiecemealError::Streaming(StreamError::Range(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, PiecemealError>;
