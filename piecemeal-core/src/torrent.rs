//! Identifiers shared by every layer that talks about torrent content.

use std::fmt;

use serde::Serialize;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary. Used to key layouts and
/// streams; its derivation from metadata happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string.
    ///
    /// # Errors
    ///
    /// - `InvalidInfoHash` - If the input is not exactly 20 hex-encoded bytes
    pub fn from_hex(value: &str) -> Result<Self, InvalidInfoHash> {
        let bytes = hex::decode(value).map_err(|_| InvalidInfoHash {
            value: value.to_string(),
        })?;
        let hash: [u8; 20] = bytes.try_into().map_err(|_| InvalidInfoHash {
            value: value.to_string(),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Rejected hex representation of an info hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid info hash: {value}")]
pub struct InvalidInfoHash {
    pub value: String,
}

/// Zero-based index of a piece within a torrent's content space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Number of pieces between `self` and a later piece.
    pub fn distance_to(self, other: PieceIndex) -> u32 {
        other.0.abs_diff(self.0)
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        let info_hash = InfoHash::new(hash);
        assert_eq!(
            info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_info_hash_from_hex() {
        let parsed = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        assert_eq!(parsed.as_bytes()[0], 0x01);
        assert_eq!(parsed.as_bytes()[19], 0x67);

        assert!(InfoHash::from_hex("not-hex").is_err());
        assert!(InfoHash::from_hex("0123").is_err());
    }

    #[test]
    fn test_piece_index_ordering() {
        let piece1 = PieceIndex::new(5);
        let piece2 = PieceIndex::new(10);
        assert!(piece1 < piece2);
        assert_eq!(piece1.as_u32(), 5);
        assert_eq!(piece1.distance_to(piece2), 5);
        assert_eq!(piece2.distance_to(piece1), 5);
    }

    #[test]
    fn test_piece_index_display() {
        let piece = PieceIndex::new(42);
        assert_eq!(piece.to_string(), "42");
    }
}
