//! Centralized configuration for Piecemeal.
//!
//! All tunable parameters live here instead of being scattered as
//! hard-coded values. The stream reader only ever sees [`StreamingConfig`].

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Piecemeal components.
#[derive(Debug, Clone, Default)]
pub struct PiecemealConfig {
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub library: LibraryPaths,
}

/// Stream reader tuning.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Pieces past a requested range raised to readahead priority
    pub readahead_pieces: u32,
    /// How long a read waits for missing pieces
    pub read_timeout: Duration,
    /// Piece length used for demo content
    pub demo_piece_length: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            readahead_pieces: 8,
            read_timeout: Duration::from_secs(30),
            demo_piece_length: 262_144, // 256 KiB
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// Largest body served for one range response
    pub max_range_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000)),
            max_range_bytes: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

/// Host locations opened by the maintenance commands.
#[derive(Debug, Clone)]
pub struct LibraryPaths {
    pub library_path: PathBuf,
    pub torrents_path: PathBuf,
    pub download_path: PathBuf,
}

impl Default for LibraryPaths {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("special://temp/piecemeal_library/"),
            torrents_path: PathBuf::from("special://temp/piecemeal_torrents/"),
            download_path: PathBuf::new(),
        }
    }
}

impl PiecemealConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(pieces) = std::env::var("PIECEMEAL_READAHEAD_PIECES") {
            if let Ok(count) = pieces.parse::<u32>() {
                config.streaming.readahead_pieces = count;
            }
        }

        if let Ok(timeout) = std::env::var("PIECEMEAL_READ_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.streaming.read_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(address) = std::env::var("PIECEMEAL_BIND_ADDRESS") {
            if let Ok(address) = address.parse::<SocketAddr>() {
                config.server.bind_address = address;
            }
        }

        if let Ok(path) = std::env::var("PIECEMEAL_DOWNLOAD_PATH") {
            config.library.download_path = PathBuf::from(path);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            streaming: StreamingConfig {
                readahead_pieces: 2,
                read_timeout: Duration::from_millis(200),
                demo_piece_length: 16,
            },
            server: ServerConfig {
                bind_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
                max_range_bytes: 64,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = PiecemealConfig::default();

        assert_eq!(config.streaming.readahead_pieces, 8);
        assert_eq!(config.streaming.read_timeout, Duration::from_secs(30));
        assert_eq!(config.server.bind_address.port(), 3000);
        assert_eq!(config.library.download_path, PathBuf::new());
    }

    #[test]
    fn test_testing_preset() {
        let config = PiecemealConfig::for_testing();
        assert_eq!(config.streaming.readahead_pieces, 2);
        assert!(config.streaming.read_timeout < Duration::from_secs(1));
        assert_eq!(config.server.bind_address.port(), 0);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("PIECEMEAL_READAHEAD_PIECES", "16");
            std::env::set_var("PIECEMEAL_READ_TIMEOUT_SECS", "5");
            std::env::set_var("PIECEMEAL_BIND_ADDRESS", "0.0.0.0:8080");
            std::env::set_var("PIECEMEAL_DOWNLOAD_PATH", "/downloads");
        }

        let config = PiecemealConfig::from_env();

        assert_eq!(config.streaming.readahead_pieces, 16);
        assert_eq!(config.streaming.read_timeout, Duration::from_secs(5));
        assert_eq!(config.server.bind_address.port(), 8080);
        assert_eq!(config.library.download_path, PathBuf::from("/downloads"));

        // Cleanup
        unsafe {
            std::env::remove_var("PIECEMEAL_READAHEAD_PIECES");
            std::env::remove_var("PIECEMEAL_READ_TIMEOUT_SECS");
            std::env::remove_var("PIECEMEAL_BIND_ADDRESS");
            std::env::remove_var("PIECEMEAL_DOWNLOAD_PATH");
        }
    }
}
