//! In-memory availability tracker and piece store.
//!
//! Backs tests, the CLI demo server and anything else that needs the
//! collaborator traits without a download engine behind them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::priority::PriorityTier;
use super::traits::{AvailabilityTracker, PieceStore, PieceWait, StoreError};
use crate::torrent::PieceIndex;

/// Availability tracker whose pieces are marked complete by hand.
#[derive(Default)]
pub struct PieceAvailability {
    available: RwLock<HashSet<PieceIndex>>,
    priorities: Mutex<HashMap<PieceIndex, PriorityTier>>,
    priority_log: Mutex<Vec<(PieceIndex, PriorityTier)>>,
    piece_added: Notify,
    active_waits: AtomicUsize,
}

impl PieceAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that already holds `pieces`.
    pub fn with_pieces(pieces: impl IntoIterator<Item = u32>) -> Self {
        let tracker = Self::new();
        tracker
            .available
            .write()
            .extend(pieces.into_iter().map(PieceIndex::new));
        tracker
    }

    /// Marks a piece downloaded and wakes every waiter.
    pub fn mark_available(&self, piece: PieceIndex) {
        let inserted = self.available.write().insert(piece);
        if inserted {
            self.piece_added.notify_waiters();
        }
    }

    /// Current priority of a piece; `Background` if never boosted.
    pub fn priority(&self, piece: PieceIndex) -> PriorityTier {
        self.priorities
            .lock()
            .get(&piece)
            .copied()
            .unwrap_or(PriorityTier::Background)
    }

    /// Every `set_priority` call in the order it was received.
    pub fn priority_log(&self) -> Vec<(PieceIndex, PriorityTier)> {
        self.priority_log.lock().clone()
    }

    /// Pieces currently above `Background`.
    pub fn boosted_pieces(&self) -> Vec<PieceIndex> {
        let mut boosted: Vec<PieceIndex> = self
            .priorities
            .lock()
            .iter()
            .filter(|(_, tier)| **tier > PriorityTier::Background)
            .map(|(piece, _)| *piece)
            .collect();
        boosted.sort();
        boosted
    }

    /// Number of `wait_for_piece` futures still alive.
    pub fn active_waits(&self) -> usize {
        self.active_waits.load(Ordering::SeqCst)
    }
}

struct WaitRegistration<'a>(&'a AtomicUsize);

impl<'a> WaitRegistration<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AvailabilityTracker for PieceAvailability {
    fn has_piece(&self, piece: PieceIndex) -> bool {
        self.available.read().contains(&piece)
    }

    async fn wait_for_piece(&self, piece: PieceIndex, timeout: Duration) -> PieceWait {
        let _registration = WaitRegistration::register(&self.active_waits);
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = self.piece_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.has_piece(piece) {
                return PieceWait::Available;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return if self.has_piece(piece) {
                            PieceWait::Available
                        } else {
                            PieceWait::TimedOut
                        };
                    }
                }
                None => notified.await,
            }
        }
    }

    fn set_priority(&self, piece: PieceIndex, tier: PriorityTier) {
        {
            let mut priorities = self.priorities.lock();
            if tier == PriorityTier::Background {
                priorities.remove(&piece);
            } else {
                priorities.insert(piece, tier);
            }
        }
        self.priority_log.lock().push((piece, tier));
    }
}

/// Piece store holding whole pieces in memory.
#[derive(Default)]
pub struct InMemoryPieceStore {
    pieces: RwLock<HashMap<PieceIndex, Bytes>>,
    corrupt: RwLock<HashSet<PieceIndex>>,
    reads: AtomicU64,
}

impl InMemoryPieceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cuts a flat content buffer into pieces of `piece_length` bytes.
    ///
    /// The final piece holds the remainder.
    pub fn from_content(content: impl Into<Bytes>, piece_length: u32) -> Self {
        let content: Bytes = content.into();
        let store = Self::new();
        let piece_length = piece_length.max(1) as usize;
        {
            let mut pieces = store.pieces.write();
            for (index, start) in (0..content.len()).step_by(piece_length).enumerate() {
                let end = (start + piece_length).min(content.len());
                pieces.insert(PieceIndex::new(index as u32), content.slice(start..end));
            }
        }
        store
    }

    pub fn insert(&self, piece: PieceIndex, data: impl Into<Bytes>) {
        self.pieces.write().insert(piece, data.into());
    }

    /// Makes every subsequent read of `piece` fail as corrupt.
    pub fn mark_corrupt(&self, piece: PieceIndex) {
        self.corrupt.write().insert(piece);
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.read().len()
    }

    /// Number of `read_piece_bytes` calls served, successful or not.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PieceStore for InMemoryPieceStore {
    async fn read_piece_bytes(
        &self,
        piece: PieceIndex,
        offset: u32,
        length: u32,
    ) -> Result<Bytes, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if self.corrupt.read().contains(&piece) {
            return Err(StoreError::Corrupt {
                piece,
                reason: "marked corrupt".to_string(),
            });
        }

        let data = self
            .pieces
            .read()
            .get(&piece)
            .cloned()
            .ok_or(StoreError::PieceMissing { piece })?;

        let start = offset as usize;
        let end = start + length as usize;
        if end > data.len() {
            return Err(StoreError::OutOfBounds {
                piece,
                offset,
                length,
                piece_size: data.len(),
            });
        }

        Ok(data.slice(start..end))
    }
}
