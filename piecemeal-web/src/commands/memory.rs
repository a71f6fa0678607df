//! In-process host services for headless runs and tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    HostPlayer, LibraryDatabase, LibraryTable, MaintenanceError, MediaCache, MediaKind,
    MetadataSource,
};

/// Host without a UI: confirmations get a fixed answer and every call is recorded.
#[derive(Debug)]
pub struct HeadlessHost {
    confirm_answer: bool,
    view_mode: Mutex<String>,
    settings: Mutex<BTreeMap<String, String>>,
    notifications: Mutex<Vec<String>>,
    confirmations: Mutex<Vec<String>>,
    opened: Mutex<Vec<String>>,
}

impl HeadlessHost {
    pub fn new(confirm_answer: bool) -> Self {
        Self {
            confirm_answer,
            view_mode: Mutex::new("0".to_string()),
            settings: Mutex::new(BTreeMap::new()),
            notifications: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn set_view_mode(&self, mode: impl Into<String>) {
        *self.view_mode.lock() = mode.into();
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.lock().get(key).cloned()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn confirmations(&self) -> Vec<String> {
        self.confirmations.lock().clone()
    }

    pub fn opened_directories(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl HostPlayer for HeadlessHost {
    async fn notify(&self, message: &str) -> Result<(), MaintenanceError> {
        self.notifications.lock().push(message.to_string());
        Ok(())
    }

    async fn confirm(&self, message: &str) -> Result<bool, MaintenanceError> {
        self.confirmations.lock().push(message.to_string());
        Ok(self.confirm_answer)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), MaintenanceError> {
        self.settings
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn open_directory(&self, path: &str) -> Result<(), MaintenanceError> {
        self.opened.lock().push(path.to_string());
        Ok(())
    }

    async fn current_view_mode(&self) -> Result<String, MaintenanceError> {
        Ok(self.view_mode.lock().clone())
    }
}

/// Key-value cache held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMediaCache {
    entries: Mutex<BTreeMap<String, String>>,
    cleared_sources: Mutex<Vec<MetadataSource>>,
}

impl InMemoryMediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(key.into(), value.into());
    }

    /// Remaining keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn cleared_sources(&self) -> Vec<MetadataSource> {
        self.cleared_sources.lock().clone()
    }
}

#[async_trait]
impl MediaCache for InMemoryMediaCache {
    async fn clear_key(&self, key: &str) -> Result<(), MaintenanceError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), MaintenanceError> {
        self.entries.lock().clear();
        Ok(())
    }

    async fn clear_metadata(&self, source: MetadataSource) -> Result<(), MaintenanceError> {
        self.cleared_sources.lock().push(source);
        Ok(())
    }
}

/// Library database tracking which tables exist and which purges ran.
#[derive(Debug)]
pub struct InMemoryLibraryDatabase {
    tables: Mutex<HashSet<LibraryTable>>,
    purged: Mutex<Vec<MediaKind>>,
}

impl InMemoryLibraryDatabase {
    /// Starts with every table present.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(LibraryTable::ALL.into_iter().collect()),
            purged: Mutex::new(Vec::new()),
        }
    }

    pub fn has_table(&self, table: LibraryTable) -> bool {
        self.tables.lock().contains(&table)
    }

    pub fn purged(&self) -> Vec<MediaKind> {
        self.purged.lock().clone()
    }
}

impl Default for InMemoryLibraryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryDatabase for InMemoryLibraryDatabase {
    async fn purge_deleted(&self, kind: MediaKind) -> Result<(), MaintenanceError> {
        self.purged.lock().push(kind);
        Ok(())
    }

    async fn drop_tables(&self, tables: &[LibraryTable]) -> Result<(), MaintenanceError> {
        let mut present = self.tables.lock();
        for table in tables {
            present.remove(table);
        }
        Ok(())
    }
}
