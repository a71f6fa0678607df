//! File-to-piece layout of a multi-file torrent.
//!
//! A torrent's content is one flat byte space cut into fixed-length pieces.
//! Files are laid end to end inside that space, so each file owns an absolute
//! byte offset and an inclusive range of pieces it overlaps. Neighbouring
//! files may share their boundary piece.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::torrent::PieceIndex;

/// Invalid input to [`TorrentLayout::build`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Piece length must be positive.
    #[error("Piece length must be greater than zero")]
    ZeroPieceLength,

    /// A torrent needs at least one file.
    #[error("Layout requires at least one file")]
    NoFiles,

    /// Summed file sizes do not fit the 64-bit content space.
    #[error("Total size overflows at file {index}")]
    SizeOverflow {
        /// File whose size pushed the running sum past `u64::MAX`.
        index: usize,
    },

    /// Content space needs more pieces than a piece index can address.
    #[error("Content of {total_size} bytes needs more than u32::MAX pieces of {piece_length} bytes")]
    TooManyPieces {
        /// Total content size in bytes.
        total_size: u64,
        /// Requested piece length in bytes.
        piece_length: u32,
    },
}

/// Input description of one file, in torrent order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
}

impl FileEntry {
    /// Creates an entry whose path equals its name.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            size,
        }
    }
}

/// Logical file mapped onto a contiguous byte range of the piece space.
///
/// Only [`TorrentLayout::build`] creates these; they are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentFile {
    index: usize,
    name: String,
    path: String,
    size: u64,
    offset: u64,
    piece_start: PieceIndex,
    piece_end: PieceIndex,
    #[serde(skip)]
    piece_length: u32,
}

impl TorrentFile {
    /// Position among sibling files.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Absolute offset of the first byte within the content space.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// First piece overlapping the file.
    pub fn piece_start(&self) -> PieceIndex {
        self.piece_start
    }

    /// Last piece overlapping the file, inclusive.
    pub fn piece_end(&self) -> PieceIndex {
        self.piece_end
    }

    /// Piece length of the layout the file was placed in.
    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Pieces that must be downloaded to hold the whole file.
    ///
    /// Zero-length files carry a boundary piece index but never oblige a
    /// download, so they return `None`.
    pub fn required_pieces(&self) -> Option<RangeInclusive<u32>> {
        if self.is_empty() {
            None
        } else {
            Some(self.piece_start.as_u32()..=self.piece_end.as_u32())
        }
    }

    /// Whether the file has bytes inside the given piece.
    pub fn overlaps_piece(&self, piece: PieceIndex) -> bool {
        self.required_pieces()
            .is_some_and(|pieces| pieces.contains(&piece.as_u32()))
    }

    /// Absolute end of the file, exclusive.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }
}

/// Ordered files of one torrent plus the piece geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentLayout {
    files: Vec<TorrentFile>,
    piece_length: u32,
    total_size: u64,
}

impl TorrentLayout {
    /// Lays files end to end and resolves the pieces each one overlaps.
    ///
    /// # Errors
    ///
    /// - `LayoutError::ZeroPieceLength` - If `piece_length` is zero
    /// - `LayoutError::NoFiles` - If `entries` is empty
    /// - `LayoutError::SizeOverflow` - If file sizes overflow `u64`
    /// - `LayoutError::TooManyPieces` - If a piece index would exceed `u32`
    pub fn build(entries: Vec<FileEntry>, piece_length: u32) -> Result<Self, LayoutError> {
        if piece_length == 0 {
            return Err(LayoutError::ZeroPieceLength);
        }
        if entries.is_empty() {
            return Err(LayoutError::NoFiles);
        }

        let mut total_size = 0u64;
        for (index, entry) in entries.iter().enumerate() {
            total_size = total_size
                .checked_add(entry.size)
                .ok_or(LayoutError::SizeOverflow { index })?;
        }

        let piece_len = u64::from(piece_length);
        if total_size.saturating_sub(1) / piece_len >= u64::from(u32::MAX) {
            return Err(LayoutError::TooManyPieces {
                total_size,
                piece_length,
            });
        }

        let mut files: Vec<TorrentFile> = Vec::with_capacity(entries.len());
        let mut offset = 0u64;

        for (index, entry) in entries.into_iter().enumerate() {
            let (piece_start, piece_end) = if entry.size > 0 {
                (
                    piece_of(offset, piece_len),
                    piece_of(offset + entry.size - 1, piece_len),
                )
            } else if offset < total_size {
                // Shares the start piece of the next non-empty file.
                let boundary = piece_of(offset, piece_len);
                (boundary, boundary)
            } else {
                // Trailing empty file sits on the preceding file's end piece.
                let boundary = files
                    .last()
                    .map(|previous| previous.piece_end)
                    .unwrap_or(PieceIndex::new(0));
                (boundary, boundary)
            };

            files.push(TorrentFile {
                index,
                name: entry.name,
                path: entry.path,
                size: entry.size,
                offset,
                piece_start,
                piece_end,
                piece_length,
            });
            offset += entry.size;
        }

        Ok(Self {
            files,
            piece_length,
            total_size,
        })
    }

    /// Builds a layout from bare sizes, naming files `file0`, `file1`, ...
    ///
    /// # Errors
    ///
    /// Same as [`TorrentLayout::build`].
    pub fn from_sizes(sizes: &[u64], piece_length: u32) -> Result<Self, LayoutError> {
        let entries = sizes
            .iter()
            .enumerate()
            .map(|(index, &size)| FileEntry::new(format!("file{index}"), size))
            .collect();
        Self::build(entries, piece_length)
    }

    pub fn files(&self) -> &[TorrentFile] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&TorrentFile> {
        self.files.get(index)
    }

    pub fn file_by_path(&self, path: &str) -> Option<&TorrentFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Non-empty file holding the byte at absolute `offset`.
    pub fn file_at_offset(&self, offset: u64) -> Option<&TorrentFile> {
        if offset >= self.total_size {
            return None;
        }
        let position = self.files.partition_point(|file| file.end_offset() <= offset);
        self.files[position..].iter().find(|file| !file.is_empty())
    }

    /// Files with bytes inside `piece`, in torrent order.
    pub fn files_for_piece(&self, piece: PieceIndex) -> impl Iterator<Item = &TorrentFile> {
        self.files
            .iter()
            .filter(move |file| file.overlaps_piece(piece))
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of pieces covering the content space.
    pub fn piece_count(&self) -> u32 {
        if self.total_size == 0 {
            0
        } else {
            piece_of(self.total_size - 1, u64::from(self.piece_length)).as_u32() + 1
        }
    }

    /// Byte length of `piece`; only the final piece may be short.
    pub fn piece_size(&self, piece: PieceIndex) -> Option<u32> {
        let count = self.piece_count();
        if piece.as_u32() >= count {
            return None;
        }
        if piece.as_u32() + 1 < count {
            return Some(self.piece_length);
        }
        let last_start = u64::from(piece.as_u32()) * u64::from(self.piece_length);
        Some((self.total_size - last_start) as u32)
    }
}

fn piece_of(offset: u64, piece_length: u64) -> PieceIndex {
    PieceIndex::new((offset / piece_length) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces(file: &TorrentFile) -> (u32, u32) {
        (file.piece_start().as_u32(), file.piece_end().as_u32())
    }

    #[test]
    fn test_shared_boundary_piece_layout() {
        let layout = TorrentLayout::from_sizes(&[10, 20, 5], 16).unwrap();

        let offsets: Vec<u64> = layout.files().iter().map(TorrentFile::offset).collect();
        assert_eq!(offsets, vec![0, 10, 30]);
        assert_eq!(pieces(&layout.files()[0]), (0, 0));
        assert_eq!(pieces(&layout.files()[1]), (0, 1));
        assert_eq!(pieces(&layout.files()[2]), (1, 2));
        assert_eq!(layout.total_size(), 35);
        assert_eq!(layout.piece_count(), 3);
    }

    #[test]
    fn test_build_rejects_invalid_input() {
        assert_eq!(
            TorrentLayout::from_sizes(&[10], 0),
            Err(LayoutError::ZeroPieceLength)
        );
        assert_eq!(
            TorrentLayout::from_sizes(&[], 16),
            Err(LayoutError::NoFiles)
        );
        assert_eq!(
            TorrentLayout::from_sizes(&[u64::MAX, 1], 16),
            Err(LayoutError::SizeOverflow { index: 1 })
        );
        assert!(matches!(
            TorrentLayout::from_sizes(&[u64::MAX], 1),
            Err(LayoutError::TooManyPieces { .. })
        ));
    }

    #[test]
    fn test_zero_length_file_takes_following_start_piece() {
        let layout = TorrentLayout::from_sizes(&[20, 0, 12], 16).unwrap();
        let empty = &layout.files()[1];

        assert_eq!(empty.offset(), 20);
        assert_eq!(pieces(empty), (1, 1));
        assert_eq!(empty.piece_start(), layout.files()[2].piece_start());
        assert_eq!(empty.required_pieces(), None);
    }

    #[test]
    fn test_trailing_zero_length_file_takes_preceding_end_piece() {
        let layout = TorrentLayout::from_sizes(&[16, 0, 0], 16).unwrap();

        assert_eq!(layout.piece_count(), 1);
        assert_eq!(pieces(&layout.files()[1]), (0, 0));
        assert_eq!(pieces(&layout.files()[2]), (0, 0));
    }

    #[test]
    fn test_all_files_empty() {
        let layout = TorrentLayout::from_sizes(&[0, 0], 16).unwrap();

        assert_eq!(layout.piece_count(), 0);
        assert!(layout.files().iter().all(|file| pieces(file) == (0, 0)));
        assert!(layout.files().iter().all(|f| f.required_pieces().is_none()));
    }

    #[test]
    fn test_piece_size_last_piece_short() {
        let layout = TorrentLayout::from_sizes(&[10, 20, 5], 16).unwrap();

        assert_eq!(layout.piece_size(PieceIndex::new(0)), Some(16));
        assert_eq!(layout.piece_size(PieceIndex::new(1)), Some(16));
        assert_eq!(layout.piece_size(PieceIndex::new(2)), Some(3));
        assert_eq!(layout.piece_size(PieceIndex::new(3)), None);
    }

    #[test]
    fn test_lookups() {
        let entries = vec![
            FileEntry {
                name: "movie.mkv".to_string(),
                path: "Movie/movie.mkv".to_string(),
                size: 40,
            },
            FileEntry::new("empty.nfo", 0),
            FileEntry::new("subs.srt", 8),
        ];
        let layout = TorrentLayout::build(entries, 16).unwrap();

        assert_eq!(
            layout.file_by_path("Movie/movie.mkv").map(TorrentFile::index),
            Some(0)
        );
        assert_eq!(layout.file(2).map(TorrentFile::name), Some("subs.srt"));
        assert_eq!(layout.file(3), None);

        assert_eq!(layout.file_at_offset(39).map(TorrentFile::index), Some(0));
        assert_eq!(layout.file_at_offset(40).map(TorrentFile::index), Some(2));
        assert_eq!(layout.file_at_offset(48), None);

        let sharing: Vec<usize> = layout
            .files_for_piece(PieceIndex::new(2))
            .map(TorrentFile::index)
            .collect();
        assert_eq!(sharing, vec![0, 2]);
    }
}
