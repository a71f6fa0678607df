//! Host maintenance commands
//!
//! Cache clearing, database resets, path settings and view modes requested
//! by the host player. Every side effect goes through an injected service;
//! nothing here touches the streaming core.

pub mod memory;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use piecemeal_core::LibraryPaths;
use serde::Serialize;
use tracing::{debug, info};

pub use memory::{HeadlessHost, InMemoryLibraryDatabase, InMemoryMediaCache};

/// Shown after any cache clear.
pub const CACHE_CLEARED_MESSAGE: &str = "Cache cleared";
/// Shown after any database clear.
pub const DATABASE_CLEARED_MESSAGE: &str = "Database cleared";
/// Asked before destructive bulk clears.
pub const CONFIRM_CLEAR_MESSAGE: &str = "This removes all stored entries. Continue?";

/// Failure reported by an injected host service.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("Host player error: {reason}")]
    Host { reason: String },

    #[error("Cache error: {reason}")]
    Cache { reason: String },

    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("Unknown maintenance target: {name}")]
    UnknownTarget { name: String },
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed,
    /// The user declined the confirmation dialog.
    Declined,
    /// Nothing to do for the given input.
    Skipped,
}

/// Metadata caches that can be dropped independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataSource {
    Tmdb,
    Trakt,
    Pages,
}

impl FromStr for MetadataSource {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tmdb" => Ok(MetadataSource::Tmdb),
            "trakt" => Ok(MetadataSource::Trakt),
            "pages" => Ok(MetadataSource::Pages),
            _ => Err(MaintenanceError::UnknownTarget {
                name: s.to_string(),
            }),
        }
    }
}

/// Library item kinds with soft-deleted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movies,
    Shows,
}

/// Tables of the library database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryTable {
    Items,
    TorrentHistory,
    TorrentAssignMetadata,
    TorrentAssignItems,
    QueryHistory,
}

impl LibraryTable {
    pub const ALL: [LibraryTable; 5] = [
        LibraryTable::Items,
        LibraryTable::TorrentHistory,
        LibraryTable::TorrentAssignMetadata,
        LibraryTable::TorrentAssignItems,
        LibraryTable::QueryHistory,
    ];
}

/// What a database clear removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseTarget {
    Movies,
    Shows,
    TorrentHistory,
    SearchHistory,
    All,
}

impl FromStr for DatabaseTarget {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(DatabaseTarget::Movies),
            "shows" => Ok(DatabaseTarget::Shows),
            "torrent-history" => Ok(DatabaseTarget::TorrentHistory),
            "search-history" => Ok(DatabaseTarget::SearchHistory),
            "all" => Ok(DatabaseTarget::All),
            _ => Err(MaintenanceError::UnknownTarget {
                name: s.to_string(),
            }),
        }
    }
}

/// Dialogs, notifications and settings of the host player.
#[async_trait]
pub trait HostPlayer: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), MaintenanceError>;

    /// Asks the user to confirm; `false` means declined.
    async fn confirm(&self, message: &str) -> Result<bool, MaintenanceError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), MaintenanceError>;

    async fn open_directory(&self, path: &str) -> Result<(), MaintenanceError>;

    /// Identifier of the active container view; `"0"` when unknown.
    async fn current_view_mode(&self) -> Result<String, MaintenanceError>;
}

/// Cached metadata and pages.
#[async_trait]
pub trait MediaCache: Send + Sync {
    async fn clear_key(&self, key: &str) -> Result<(), MaintenanceError>;

    async fn clear_all(&self) -> Result<(), MaintenanceError>;

    async fn clear_metadata(&self, source: MetadataSource) -> Result<(), MaintenanceError>;
}

/// Persistent library and history storage.
#[async_trait]
pub trait LibraryDatabase: Send + Sync {
    /// Removes items of `kind` already marked deleted.
    async fn purge_deleted(&self, kind: MediaKind) -> Result<(), MaintenanceError>;

    async fn drop_tables(&self, tables: &[LibraryTable]) -> Result<(), MaintenanceError>;
}

/// Runs maintenance commands against injected host services.
pub struct MaintenanceService {
    host: Arc<dyn HostPlayer>,
    cache: Arc<dyn MediaCache>,
    database: Arc<dyn LibraryDatabase>,
    paths: LibraryPaths,
}

impl MaintenanceService {
    pub fn new(
        host: Arc<dyn HostPlayer>,
        cache: Arc<dyn MediaCache>,
        database: Arc<dyn LibraryDatabase>,
        paths: LibraryPaths,
    ) -> Self {
        Self {
            host,
            cache,
            database,
            paths,
        }
    }

    /// Clears one cache key, or after confirmation the whole cache.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Host` - If the dialog or notification failed
    /// - `MaintenanceError::Cache` - If the cache refused the clear
    pub async fn clear_cache(&self, key: Option<&str>) -> Result<CommandOutcome, MaintenanceError> {
        match key.filter(|key| !key.is_empty()) {
            Some(key) => {
                debug!("Removing cache key {}", key);
                self.cache.clear_key(key).await?;
            }
            None => {
                if !self.host.confirm(CONFIRM_CLEAR_MESSAGE).await? {
                    return Ok(CommandOutcome::Declined);
                }
                debug!("Removing all the cache");
                self.cache.clear_all().await?;
            }
        }

        self.host.notify(CACHE_CLEARED_MESSAGE).await?;
        Ok(CommandOutcome::Completed)
    }

    /// Drops one metadata cache, announcing it when `announce` is set.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Cache` - If the cache refused the clear
    /// - `MaintenanceError::Host` - If the notification failed
    pub async fn clear_metadata_cache(
        &self,
        source: MetadataSource,
        announce: bool,
    ) -> Result<CommandOutcome, MaintenanceError> {
        debug!("Removing {:?} cache", source);
        self.cache.clear_metadata(source).await?;
        if announce {
            self.host.notify(CACHE_CLEARED_MESSAGE).await?;
        }
        Ok(CommandOutcome::Completed)
    }

    /// Restores the download, library and torrents paths to their defaults.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Host` - If a setting could not be written
    pub async fn reset_paths(&self) -> Result<CommandOutcome, MaintenanceError> {
        let defaults = LibraryPaths::default();
        self.host
            .set_setting("download_path", &defaults.download_path.to_string_lossy())
            .await?;
        self.host
            .set_setting("library_path", &defaults.library_path.to_string_lossy())
            .await?;
        self.host
            .set_setting("torrents_path", &defaults.torrents_path.to_string_lossy())
            .await?;
        Ok(CommandOutcome::Completed)
    }

    /// Points `<name>_path` at the filesystem root.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Host` - If the setting could not be written
    pub async fn reset_custom_path(&self, name: &str) -> Result<CommandOutcome, MaintenanceError> {
        if name.is_empty() {
            return Ok(CommandOutcome::Skipped);
        }
        self.host.set_setting(&format!("{name}_path"), "/").await?;
        Ok(CommandOutcome::Completed)
    }

    /// Opens the configured library, torrents or download directory.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Host` - If the host could not open the directory
    pub async fn open_custom_path(&self, name: &str) -> Result<CommandOutcome, MaintenanceError> {
        let location: Option<&PathBuf> = match name {
            "library" => Some(&self.paths.library_path),
            "torrents" => Some(&self.paths.torrents_path),
            "download" => Some(&self.paths.download_path),
            _ => None,
        };

        match location.filter(|path| !path.as_os_str().is_empty()) {
            Some(path) => {
                let path = path.to_string_lossy();
                debug!("Opening {} in host browser", path);
                self.host.open_directory(&path).await?;
                Ok(CommandOutcome::Completed)
            }
            None => Ok(CommandOutcome::Skipped),
        }
    }

    /// Remembers the host's current view mode for `content_type`.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Host` - If the view mode could not be read or stored
    pub async fn store_view_mode(
        &self,
        content_type: &str,
    ) -> Result<CommandOutcome, MaintenanceError> {
        let view_mode = self.host.current_view_mode().await?;
        info!("ViewMode for {}: {}", content_type, view_mode);
        if view_mode == "0" {
            return Ok(CommandOutcome::Skipped);
        }
        self.host
            .set_setting(&format!("viewmode_{content_type}"), &view_mode)
            .await?;
        Ok(CommandOutcome::Completed)
    }

    /// Clears part or all of the library database.
    ///
    /// Clearing everything asks for confirmation first.
    ///
    /// # Errors
    ///
    /// - `MaintenanceError::Database` - If the database refused the change
    /// - `MaintenanceError::Host` - If the dialog or notification failed
    pub async fn clear_database(
        &self,
        target: DatabaseTarget,
    ) -> Result<CommandOutcome, MaintenanceError> {
        debug!("Clearing database target {:?}", target);
        match target {
            DatabaseTarget::Movies => self.database.purge_deleted(MediaKind::Movies).await?,
            DatabaseTarget::Shows => self.database.purge_deleted(MediaKind::Shows).await?,
            DatabaseTarget::TorrentHistory => {
                self.database
                    .drop_tables(&[
                        LibraryTable::TorrentAssignItems,
                        LibraryTable::TorrentAssignMetadata,
                    ])
                    .await?
            }
            DatabaseTarget::SearchHistory => {
                self.database
                    .drop_tables(&[LibraryTable::QueryHistory])
                    .await?
            }
            DatabaseTarget::All => {
                if !self.host.confirm(CONFIRM_CLEAR_MESSAGE).await? {
                    return Ok(CommandOutcome::Declined);
                }
                self.database.drop_tables(&LibraryTable::ALL).await?
            }
        }

        self.host.notify(DATABASE_CLEARED_MESSAGE).await?;
        Ok(CommandOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        host: Arc<HeadlessHost>,
        cache: Arc<InMemoryMediaCache>,
        database: Arc<InMemoryLibraryDatabase>,
        service: MaintenanceService,
    }

    fn fixture(confirm: bool) -> Fixture {
        let host = Arc::new(HeadlessHost::new(confirm));
        let cache = Arc::new(InMemoryMediaCache::new());
        let database = Arc::new(InMemoryLibraryDatabase::new());
        let paths = LibraryPaths {
            library_path: PathBuf::from("/media/library"),
            torrents_path: PathBuf::from("/media/torrents"),
            download_path: PathBuf::new(),
        };
        let service = MaintenanceService::new(host.clone(), cache.clone(), database.clone(), paths);
        Fixture {
            host,
            cache,
            database,
            service,
        }
    }

    #[tokio::test]
    async fn test_clear_cache_key_skips_confirmation() {
        let f = fixture(false);
        f.cache.insert("movies:popular", "[]");
        f.cache.insert("shows:popular", "[]");

        let outcome = f.service.clear_cache(Some("movies:popular")).await.unwrap();

        assert_eq!(outcome, CommandOutcome::Completed);
        assert_eq!(f.cache.keys(), vec!["shows:popular".to_string()]);
        assert!(f.host.confirmations().is_empty());
        assert_eq!(f.host.notifications(), vec![CACHE_CLEARED_MESSAGE.to_string()]);
    }

    #[tokio::test]
    async fn test_clear_all_cache_declined() {
        let f = fixture(false);
        f.cache.insert("movies:popular", "[]");

        let outcome = f.service.clear_cache(None).await.unwrap();

        assert_eq!(outcome, CommandOutcome::Declined);
        assert_eq!(f.cache.keys().len(), 1);
        assert!(f.host.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_cache_confirmed() {
        let f = fixture(true);
        f.cache.insert("movies:popular", "[]");

        let outcome = f.service.clear_cache(Some("")).await.unwrap();

        assert_eq!(outcome, CommandOutcome::Completed);
        assert!(f.cache.keys().is_empty());
        assert_eq!(f.host.confirmations().len(), 1);
    }

    #[tokio::test]
    async fn test_page_cache_cleared_silently() {
        let f = fixture(true);
        f.service
            .clear_metadata_cache(MetadataSource::Pages, false)
            .await
            .unwrap();
        f.service
            .clear_metadata_cache(MetadataSource::Tmdb, true)
            .await
            .unwrap();

        assert_eq!(
            f.cache.cleared_sources(),
            vec![MetadataSource::Pages, MetadataSource::Tmdb]
        );
        assert_eq!(f.host.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_path_settings() {
        let f = fixture(true);

        f.service.reset_paths().await.unwrap();
        assert_eq!(f.host.setting("download_path").as_deref(), Some(""));
        assert_eq!(
            f.host.setting("library_path").as_deref(),
            Some("special://temp/piecemeal_library/")
        );

        assert_eq!(
            f.service.reset_custom_path("library").await.unwrap(),
            CommandOutcome::Completed
        );
        assert_eq!(f.host.setting("library_path").as_deref(), Some("/"));
        assert_eq!(
            f.service.reset_custom_path("").await.unwrap(),
            CommandOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_open_custom_path() {
        let f = fixture(true);

        assert_eq!(
            f.service.open_custom_path("torrents").await.unwrap(),
            CommandOutcome::Completed
        );
        // Empty download path and unknown names open nothing.
        assert_eq!(
            f.service.open_custom_path("download").await.unwrap(),
            CommandOutcome::Skipped
        );
        assert_eq!(
            f.service.open_custom_path("elsewhere").await.unwrap(),
            CommandOutcome::Skipped
        );
        assert_eq!(f.host.opened_directories(), vec!["/media/torrents".to_string()]);
    }

    #[tokio::test]
    async fn test_store_view_mode() {
        let f = fixture(true);

        assert_eq!(
            f.service.store_view_mode("movies").await.unwrap(),
            CommandOutcome::Skipped
        );
        assert_eq!(f.host.setting("viewmode_movies"), None);

        f.host.set_view_mode("54");
        f.service.store_view_mode("movies").await.unwrap();
        assert_eq!(f.host.setting("viewmode_movies").as_deref(), Some("54"));
    }

    #[tokio::test]
    async fn test_clear_database_targets() {
        let f = fixture(true);

        f.service
            .clear_database(DatabaseTarget::Movies)
            .await
            .unwrap();
        f.service
            .clear_database(DatabaseTarget::TorrentHistory)
            .await
            .unwrap();

        assert_eq!(f.database.purged(), vec![MediaKind::Movies]);
        assert!(!f.database.has_table(LibraryTable::TorrentAssignItems));
        assert!(!f.database.has_table(LibraryTable::TorrentAssignMetadata));
        assert!(f.database.has_table(LibraryTable::QueryHistory));
        assert_eq!(f.host.notifications().len(), 2);
        assert!(f.host.confirmations().is_empty());
    }

    #[tokio::test]
    async fn test_clear_whole_database_requires_confirmation() {
        let declined = fixture(false);
        assert_eq!(
            declined
                .service
                .clear_database(DatabaseTarget::All)
                .await
                .unwrap(),
            CommandOutcome::Declined
        );
        assert!(declined.database.has_table(LibraryTable::Items));

        let confirmed = fixture(true);
        confirmed
            .service
            .clear_database(DatabaseTarget::All)
            .await
            .unwrap();
        assert!(LibraryTable::ALL
            .iter()
            .all(|table| !confirmed.database.has_table(*table)));
    }

    #[test]
    fn test_database_target_parsing() {
        assert_eq!(
            "search-history".parse::<DatabaseTarget>().unwrap(),
            DatabaseTarget::SearchHistory
        );
        assert!(matches!(
            "everything".parse::<DatabaseTarget>(),
            Err(MaintenanceError::UnknownTarget { .. })
        ));
    }
}
