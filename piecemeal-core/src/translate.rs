//! Translation of file-relative byte ranges into piece coordinates.

use serde::Serialize;

use crate::layout::TorrentFile;
use crate::torrent::PieceIndex;

/// Requested byte range cannot be served from the file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Range start position is greater than or equal to end position.
    #[error("Invalid range: start {start} >= end {end}")]
    Empty {
        /// Starting byte position of the invalid range.
        start: u64,
        /// Ending byte position of the invalid range.
        end: u64,
    },

    /// Requested range extends beyond the actual file size.
    #[error("Range {start}-{end} exceeds file size {file_size}")]
    ExceedsFile {
        /// Starting byte position of the range.
        start: u64,
        /// Ending byte position of the range.
        end: u64,
        /// Actual size of the file in bytes.
        file_size: u64,
    },

    /// Piece geometry with zero-length pieces.
    #[error("Piece length must be greater than zero")]
    ZeroPieceLength,

    /// Piece length differs from the one the file was laid out with.
    #[error("Piece length {actual} does not match layout piece length {expected}")]
    PieceLengthMismatch { expected: u32, actual: u32 },

    /// Absolute offset falls in a piece whose index does not fit in `u32`.
    #[error("Offset {offset} is beyond the last addressable piece")]
    PieceIndexOverflow { offset: u64 },
}

/// Piece coordinates of a byte range.
///
/// Both piece indices and both offsets are inclusive: the range starts at
/// byte `first_piece_offset` of `piece_start` and ends at byte
/// `last_piece_offset` of `piece_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PieceSpan {
    pub piece_start: PieceIndex,
    pub piece_end: PieceIndex,
    pub first_piece_offset: u32,
    pub last_piece_offset: u32,
}

impl PieceSpan {
    /// Pieces touched by the range, ascending.
    pub fn pieces(&self) -> impl DoubleEndedIterator<Item = PieceIndex> + use<> {
        (self.piece_start.as_u32()..=self.piece_end.as_u32()).map(PieceIndex::new)
    }

    /// Number of pieces touched.
    pub fn len(&self) -> u32 {
        self.piece_end.as_u32() - self.piece_start.as_u32() + 1
    }

    /// Always false; a span touches at least one piece.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, piece: PieceIndex) -> bool {
        self.piece_start <= piece && piece <= self.piece_end
    }

    /// Bytes of `piece` that belong to the range, as `(offset, length)`.
    ///
    /// The first piece is read from `first_piece_offset`, the last piece up to
    /// `last_piece_offset` inclusive, and pieces in between in full.
    pub fn piece_slice(&self, piece: PieceIndex, piece_length: u32) -> Option<(u32, u32)> {
        if !self.contains(piece) {
            return None;
        }
        let from = if piece == self.piece_start {
            self.first_piece_offset
        } else {
            0
        };
        let to = if piece == self.piece_end {
            self.last_piece_offset + 1
        } else {
            piece_length
        };
        Some((from, to - from))
    }
}

/// Maps `[start, end)` of `file` onto the pieces holding those bytes.
///
/// # Errors
///
/// - `RangeError::Empty` - If `start >= end`
/// - `RangeError::ExceedsFile` - If `end` is past the file size
/// - `RangeError::ZeroPieceLength` - If `piece_length` is zero
/// - `RangeError::PieceLengthMismatch` - If `piece_length` is not the file's layout piece length
/// - `RangeError::PieceIndexOverflow` - If a piece index would not fit in `u32`
pub fn translate(
    file: &TorrentFile,
    piece_length: u32,
    start: u64,
    end: u64,
) -> Result<PieceSpan, RangeError> {
    if piece_length == 0 {
        return Err(RangeError::ZeroPieceLength);
    }
    if piece_length != file.piece_length() {
        return Err(RangeError::PieceLengthMismatch {
            expected: file.piece_length(),
            actual: piece_length,
        });
    }
    if start >= end {
        return Err(RangeError::Empty { start, end });
    }
    if end > file.size() {
        return Err(RangeError::ExceedsFile {
            start,
            end,
            file_size: file.size(),
        });
    }

    let piece_length = u64::from(piece_length);
    let absolute_start = file.offset() + start;
    let absolute_end = file.offset() + end - 1;

    Ok(PieceSpan {
        piece_start: piece_containing(absolute_start, piece_length)?,
        piece_end: piece_containing(absolute_end, piece_length)?,
        // Remainders are below a u32 piece length.
        first_piece_offset: (absolute_start % piece_length) as u32,
        last_piece_offset: (absolute_end % piece_length) as u32,
    })
}

fn piece_containing(offset: u64, piece_length: u64) -> Result<PieceIndex, RangeError> {
    u32::try_from(offset / piece_length)
        .map(PieceIndex::new)
        .map_err(|_| RangeError::PieceIndexOverflow { offset })
}

/// Number of distinct pieces covered by a set of spans.
///
/// A boundary piece shared by spans of neighbouring files counts once.
pub fn distinct_piece_count(spans: &[PieceSpan]) -> u64 {
    let mut intervals: Vec<(u32, u32)> = spans
        .iter()
        .map(|span| (span.piece_start.as_u32(), span.piece_end.as_u32()))
        .collect();
    intervals.sort_unstable();

    let mut total = 0u64;
    let mut current: Option<(u32, u32)> = None;
    for (start, end) in intervals {
        current = match current {
            Some((open_start, open_end)) if start <= open_end.saturating_add(1) => {
                Some((open_start, open_end.max(end)))
            }
            Some((open_start, open_end)) => {
                total += u64::from(open_end - open_start) + 1;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((open_start, open_end)) = current {
        total += u64::from(open_end - open_start) + 1;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TorrentLayout;

    fn sample_layout() -> TorrentLayout {
        TorrentLayout::from_sizes(&[10, 20, 5], 16).unwrap()
    }

    #[test]
    fn test_translate_middle_file_range() {
        let layout = sample_layout();
        let span = translate(&layout.files()[1], 16, 5, 15).unwrap();

        assert_eq!(span.piece_start, PieceIndex::new(0));
        assert_eq!(span.piece_end, PieceIndex::new(1));
        assert_eq!(span.first_piece_offset, 15);
        assert_eq!(span.last_piece_offset, 8);
        assert_eq!(span.len(), 2);
    }

    #[test]
    fn test_full_range_matches_file_pieces() {
        let layout = sample_layout();
        for file in layout.files() {
            let span = translate(file, 16, 0, file.size()).unwrap();
            assert_eq!(span.piece_start, file.piece_start());
            assert_eq!(span.piece_end, file.piece_end());
        }
    }

    #[test]
    fn test_translate_rejects_bad_ranges() {
        let layout = sample_layout();
        let file = &layout.files()[0];

        assert_eq!(
            translate(file, 16, 4, 4),
            Err(RangeError::Empty { start: 4, end: 4 })
        );
        assert_eq!(
            translate(file, 16, 0, 11),
            Err(RangeError::ExceedsFile {
                start: 0,
                end: 11,
                file_size: 10
            })
        );
        assert_eq!(translate(file, 0, 0, 1), Err(RangeError::ZeroPieceLength));
    }

    #[test]
    fn test_translate_rejects_foreign_piece_length() {
        // Piece length 1 would put this byte at piece 4_300_000_000, past u32.
        let layout = TorrentLayout::from_sizes(&[5_000_000_000], 1 << 20).unwrap();
        let file = &layout.files()[0];

        assert_eq!(
            translate(file, 1, 4_300_000_000, 4_300_000_001),
            Err(RangeError::PieceLengthMismatch {
                expected: 1 << 20,
                actual: 1
            })
        );

        let span = translate(file, 1 << 20, 4_300_000_000, 4_300_000_001).unwrap();
        assert_eq!(span.piece_start, PieceIndex::new(4_100));
        assert_eq!(span.first_piece_offset, 838_400);
    }

    #[test]
    fn test_piece_index_overflow_is_an_error() {
        assert_eq!(
            piece_containing(u64::from(u32::MAX) + 1, 1),
            Err(RangeError::PieceIndexOverflow {
                offset: u64::from(u32::MAX) + 1
            })
        );
        assert_eq!(
            piece_containing(u64::from(u32::MAX), 1),
            Ok(PieceIndex::new(u32::MAX))
        );
    }

    #[test]
    fn test_zero_length_file_has_no_translatable_range() {
        let layout = TorrentLayout::from_sizes(&[8, 0, 8], 4).unwrap();
        assert!(translate(&layout.files()[1], 4, 0, 0).is_err());
    }

    #[test]
    fn test_translate_is_idempotent() {
        let layout = sample_layout();
        let file = &layout.files()[2];
        let first = translate(file, 16, 1, 4).unwrap();
        let second = translate(file, 16, 1, 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_piece_slices_cover_exact_range() {
        // Absolute bytes [5, 40) over 16-byte pieces: 11 + 16 + 8 bytes.
        let layout = TorrentLayout::from_sizes(&[64], 16).unwrap();
        let span = translate(&layout.files()[0], 16, 5, 40).unwrap();

        let slices: Vec<(u32, u32)> = span
            .pieces()
            .filter_map(|piece| span.piece_slice(piece, 16))
            .collect();
        assert_eq!(slices, vec![(5, 11), (0, 16), (0, 8)]);
        assert_eq!(span.piece_slice(PieceIndex::new(3), 16), None);

        let single = translate(&layout.files()[0], 16, 17, 20).unwrap();
        assert_eq!(single.piece_slice(PieceIndex::new(1), 16), Some((1, 3)));
    }

    #[test]
    fn test_distinct_piece_count_counts_shared_boundary_once() {
        let layout = sample_layout();
        let spans: Vec<PieceSpan> = layout
            .files()
            .iter()
            .map(|file| translate(file, 16, 0, file.size()).unwrap())
            .collect();

        // Pieces 0..=2, with 0 and 1 each shared between two files.
        assert_eq!(distinct_piece_count(&spans), 3);
        assert_eq!(distinct_piece_count(&[]), 0);

        let apart = [
            PieceSpan {
                piece_start: PieceIndex::new(0),
                piece_end: PieceIndex::new(1),
                first_piece_offset: 0,
                last_piece_offset: 0,
            },
            PieceSpan {
                piece_start: PieceIndex::new(5),
                piece_end: PieceIndex::new(5),
                first_piece_offset: 0,
                last_piece_offset: 0,
            },
        ];
        assert_eq!(distinct_piece_count(&apart), 3);
    }
}
