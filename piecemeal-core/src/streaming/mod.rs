//! Streaming reads over partially downloaded torrents.
//!
//! The [`StreamReader`] turns a file byte range into prioritized piece waits
//! and assembled bytes, talking to the download side only through the
//! [`AvailabilityTracker`] and [`PieceStore`] traits.

pub mod memory;
pub mod priority;
pub mod reader;
pub mod traits;

pub use memory::{InMemoryPieceStore, PieceAvailability};
pub use priority::{BoostGuard, BoostLedger, PieceBoost, PriorityTier, ReadaheadPlan};
pub use reader::{
    ReadRequest, ReadSession, ReadState, StreamError, StreamReader, StreamReaderStats,
};
pub use traits::{AvailabilityTracker, PieceStore, PieceWait, StoreError};
