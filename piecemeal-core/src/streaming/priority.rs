//! Readahead-window prioritization and scoped priority boosts.
//!
//! A read raises the pieces it blocks on to [`PriorityTier::Urgent`] and the
//! next `K` pieces of the same file to [`PriorityTier::Readahead`]. Boosts are
//! counted per piece in a shared [`BoostLedger`], so overlapping reads only
//! ever raise a piece to at least their tier and a release never lowers a
//! piece another read still needs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use super::traits::AvailabilityTracker;
use crate::torrent::PieceIndex;
use crate::translate::PieceSpan;

/// Download priority signalled to the availability tracker.
///
/// Ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PriorityTier {
    /// No stream is asking for the piece.
    Background = 0,
    /// Upcoming data for sequential playback.
    Readahead = 1,
    /// A read is blocked on the piece.
    Urgent = 2,
}

/// One priority request in a [`ReadaheadPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceBoost {
    pub piece: PieceIndex,
    pub tier: PriorityTier,
    /// Distance in pieces from the anchor of its tier.
    pub distance: u32,
}

/// Ordered priority requests for one read.
///
/// Urgent boosts come first, closest to the read position first; readahead
/// boosts follow, closest to the end of the range first. Equal distances are
/// ordered by piece index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadaheadPlan {
    boosts: Vec<PieceBoost>,
}

impl ReadaheadPlan {
    /// Plans boosts for the missing pieces of `span` plus up to `lookahead`
    /// missing pieces after it, never past `last_piece`.
    ///
    /// The stream reader passes the file's last piece, so the readahead window
    /// is shorter than `lookahead` near the end of a file and never reaches
    /// into pieces that only hold the next file.
    pub fn for_span(
        span: &PieceSpan,
        lookahead: u32,
        last_piece: PieceIndex,
        has_piece: impl Fn(PieceIndex) -> bool,
    ) -> Self {
        let mut urgent: Vec<PieceBoost> = span
            .pieces()
            .filter(|&piece| !has_piece(piece))
            .map(|piece| PieceBoost {
                piece,
                tier: PriorityTier::Urgent,
                distance: span.piece_start.distance_to(piece),
            })
            .collect();
        urgent.sort_by_key(|boost| (boost.distance, boost.piece));

        let window_start = span.piece_end.as_u32().saturating_add(1);
        let window_end = span
            .piece_end
            .as_u32()
            .saturating_add(lookahead)
            .min(last_piece.as_u32());
        let mut readahead: Vec<PieceBoost> = (window_start..=window_end)
            .map(PieceIndex::new)
            .filter(|&piece| !has_piece(piece))
            .map(|piece| PieceBoost {
                piece,
                tier: PriorityTier::Readahead,
                distance: span.piece_end.distance_to(piece),
            })
            .collect();
        readahead.sort_by_key(|boost| (boost.distance, boost.piece));

        urgent.extend(readahead);
        Self { boosts: urgent }
    }

    pub fn boosts(&self) -> &[PieceBoost] {
        &self.boosts
    }

    /// Pieces the read must wait for.
    pub fn blocking_pieces(&self) -> impl Iterator<Item = PieceIndex> + '_ {
        self.boosts
            .iter()
            .filter(|boost| boost.tier == PriorityTier::Urgent)
            .map(|boost| boost.piece)
    }

    pub fn is_empty(&self) -> bool {
        self.boosts.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TierCounts {
    urgent: usize,
    readahead: usize,
}

impl TierCounts {
    fn effective(self) -> PriorityTier {
        if self.urgent > 0 {
            PriorityTier::Urgent
        } else if self.readahead > 0 {
            PriorityTier::Readahead
        } else {
            PriorityTier::Background
        }
    }

    fn slot(&mut self, tier: PriorityTier) -> Option<&mut usize> {
        match tier {
            PriorityTier::Urgent => Some(&mut self.urgent),
            PriorityTier::Readahead => Some(&mut self.readahead),
            PriorityTier::Background => None,
        }
    }
}

/// Reference-counted priority boosts for one tracker.
///
/// Every reader over the same tracker must share one ledger, otherwise a
/// reader releasing its boosts lowers pieces another reader still waits on.
/// See [`StreamReader::with_ledger`](super::StreamReader::with_ledger).
pub struct BoostLedger {
    tracker: Arc<dyn AvailabilityTracker>,
    counts: Mutex<HashMap<PieceIndex, TierCounts>>,
}

impl BoostLedger {
    pub fn new(tracker: Arc<dyn AvailabilityTracker>) -> Self {
        Self {
            tracker,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker receiving the priority changes.
    pub fn tracker(&self) -> &Arc<dyn AvailabilityTracker> {
        &self.tracker
    }

    /// Registers every boost of `plan` and returns the guard releasing them.
    ///
    /// The tracker is told about a piece only when its effective tier rises.
    pub fn acquire(self: &Arc<Self>, plan: &ReadaheadPlan) -> BoostGuard {
        let mut held = Vec::with_capacity(plan.boosts().len());
        let mut counts = self.counts.lock();

        for boost in plan.boosts() {
            let entry = counts.entry(boost.piece).or_default();
            let before = entry.effective();
            if let Some(slot) = entry.slot(boost.tier) {
                *slot += 1;
                held.push((boost.piece, boost.tier));
            }
            let after = entry.effective();
            if after != before {
                trace!(piece = %boost.piece, ?after, "Raising piece priority");
                self.tracker.set_priority(boost.piece, after);
            }
        }

        BoostGuard {
            ledger: Arc::clone(self),
            held,
        }
    }

    fn release(&self, held: &[(PieceIndex, PriorityTier)]) {
        let mut counts = self.counts.lock();

        for &(piece, tier) in held {
            let Some(entry) = counts.get_mut(&piece) else {
                continue;
            };
            let before = entry.effective();
            if let Some(slot) = entry.slot(tier) {
                *slot = slot.saturating_sub(1);
            }
            let after = entry.effective();
            if after == PriorityTier::Background {
                counts.remove(&piece);
            }
            if after != before {
                trace!(piece = %piece, ?after, "Lowering piece priority");
                self.tracker.set_priority(piece, after);
            }
        }
    }

    /// Effective tier currently requested for `piece`.
    pub fn tier_of(&self, piece: PieceIndex) -> PriorityTier {
        self.counts
            .lock()
            .get(&piece)
            .map(|counts| counts.effective())
            .unwrap_or(PriorityTier::Background)
    }

    /// Number of pieces with at least one live boost.
    pub fn boosted_pieces(&self) -> usize {
        self.counts.lock().len()
    }
}

/// Live boosts of one read, released on drop.
///
/// Dropping covers every exit path of a read: success, stall, cancellation,
/// store failure, and the read future itself being dropped.
#[must_use = "boosts are released as soon as the guard is dropped"]
pub struct BoostGuard {
    ledger: Arc<BoostLedger>,
    held: Vec<(PieceIndex, PriorityTier)>,
}

impl BoostGuard {
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for BoostGuard {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            self.ledger.release(&self.held);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::streaming::memory::PieceAvailability;

    fn span(start: u32, end: u32) -> PieceSpan {
        PieceSpan {
            piece_start: PieceIndex::new(start),
            piece_end: PieceIndex::new(end),
            first_piece_offset: 0,
            last_piece_offset: 0,
        }
    }

    fn pieces_of(plan: &ReadaheadPlan, tier: PriorityTier) -> Vec<u32> {
        plan.boosts()
            .iter()
            .filter(|boost| boost.tier == tier)
            .map(|boost| boost.piece.as_u32())
            .collect()
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PriorityTier::Background < PriorityTier::Readahead);
        assert!(PriorityTier::Readahead < PriorityTier::Urgent);
    }

    #[test]
    fn test_plan_orders_urgent_then_readahead_by_distance() {
        let plan = ReadaheadPlan::for_span(&span(4, 6), 3, PieceIndex::new(100), |_| false);

        assert_eq!(pieces_of(&plan, PriorityTier::Urgent), vec![4, 5, 6]);
        assert_eq!(pieces_of(&plan, PriorityTier::Readahead), vec![7, 8, 9]);
        assert_eq!(plan.boosts()[0].distance, 0);
        assert_eq!(plan.boosts()[3].tier, PriorityTier::Readahead);
        assert_eq!(plan.boosts()[3].distance, 1);
    }

    #[test]
    fn test_plan_skips_available_pieces_and_clamps_window() {
        let have: HashSet<u32> = [4, 8].into_iter().collect();
        let plan = ReadaheadPlan::for_span(&span(4, 6), 5, PieceIndex::new(9), |piece| {
            have.contains(&piece.as_u32())
        });

        assert_eq!(pieces_of(&plan, PriorityTier::Urgent), vec![5, 6]);
        assert_eq!(pieces_of(&plan, PriorityTier::Readahead), vec![7, 9]);
        assert_eq!(plan.blocking_pieces().count(), 2);
    }

    #[test]
    fn test_plan_empty_when_everything_available() {
        let plan = ReadaheadPlan::for_span(&span(0, 3), 4, PieceIndex::new(3), |_| true);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_overlapping_guards_keep_highest_tier() {
        let tracker = Arc::new(PieceAvailability::new());
        let ledger = Arc::new(BoostLedger::new(tracker.clone()));

        let first = ledger.acquire(&ReadaheadPlan::for_span(
            &span(0, 1),
            2,
            PieceIndex::new(10),
            |_| false,
        ));
        let second = ledger.acquire(&ReadaheadPlan::for_span(
            &span(2, 3),
            0,
            PieceIndex::new(10),
            |_| false,
        ));

        // Piece 2 is readahead for the first read and urgent for the second.
        assert_eq!(tracker.priority(PieceIndex::new(2)), PriorityTier::Urgent);
        assert_eq!(ledger.boosted_pieces(), 4);

        drop(second);
        assert_eq!(tracker.priority(PieceIndex::new(2)), PriorityTier::Readahead);
        assert_eq!(tracker.priority(PieceIndex::new(3)), PriorityTier::Readahead);
        assert_eq!(ledger.tier_of(PieceIndex::new(0)), PriorityTier::Urgent);

        drop(first);
        assert_eq!(ledger.boosted_pieces(), 0);
        for index in 0..4 {
            assert_eq!(
                tracker.priority(PieceIndex::new(index)),
                PriorityTier::Background
            );
        }
    }
}
