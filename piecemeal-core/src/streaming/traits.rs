//! Collaborator interfaces consumed by the stream reader.
//!
//! Implementations live outside the core (download engine, disk storage) or
//! in [`super::memory`] for tests and demos. Both must be safe for concurrent
//! use by many readers at once.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::priority::PriorityTier;
use crate::torrent::PieceIndex;

/// Result of waiting for a single piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceWait {
    Available,
    TimedOut,
}

/// Reports downloaded pieces and accepts priority hints.
#[async_trait]
pub trait AvailabilityTracker: Send + Sync {
    /// Checks whether piece is downloaded and verified.
    fn has_piece(&self, piece: PieceIndex) -> bool;

    /// Resolves once the piece is available or `timeout` elapses.
    ///
    /// Dropping the returned future must release any wait registration.
    async fn wait_for_piece(&self, piece: PieceIndex, timeout: Duration) -> PieceWait;

    /// Sets the download priority of a piece.
    ///
    /// Called with the effective tier after every change, including the
    /// drop back to [`PriorityTier::Background`] when boosts are released.
    fn set_priority(&self, piece: PieceIndex, tier: PriorityTier);
}

/// Failure to read bytes of an available piece.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Piece is not present in the store.
    #[error("Piece {piece} not found in store")]
    PieceMissing { piece: PieceIndex },

    /// Requested bytes fall outside the stored piece.
    #[error("Read of {length} bytes at {offset} exceeds piece {piece} of {piece_size} bytes")]
    OutOfBounds {
        piece: PieceIndex,
        offset: u32,
        length: u32,
        piece_size: usize,
    },

    /// Store returned fewer bytes than requested.
    #[error("Short read from piece {piece}: expected {expected}, got {actual}")]
    ShortRead {
        piece: PieceIndex,
        expected: u32,
        actual: usize,
    },

    /// Piece data failed an integrity check.
    #[error("Piece {piece} is corrupt: {reason}")]
    Corrupt { piece: PieceIndex, reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Returns raw bytes for available pieces.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Reads `length` bytes starting at `offset` within `piece`.
    ///
    /// # Errors
    ///
    /// - `StoreError::PieceMissing` - If the piece is not stored
    /// - `StoreError::OutOfBounds` - If the slice exceeds the piece
    /// - `StoreError::Io` - If storage access failed
    async fn read_piece_bytes(
        &self,
        piece: PieceIndex,
        offset: u32,
        length: u32,
    ) -> Result<Bytes, StoreError>;
}
