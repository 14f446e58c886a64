//! Durable storage of the metadata catalog tables.
//!
//! The [`MetadataStorage`](super::MetadataStorage) keeps a working copy of
//! [`CatalogTables`] and hands the whole snapshot to a [`CatalogStore`] on
//! every commit, so a store only ever sees committed states.

use super::types::{ClusterRow, HostRow, InstanceDefinition, ReplicaSetRow};
use crate::core::{AdminError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Catalog Tables
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogTables {
    pub version: u32,
    pub clusters: BTreeMap<u64, ClusterRow>,
    pub replicasets: BTreeMap<u64, ReplicaSetRow>,
    pub hosts: BTreeMap<u32, HostRow>,
    pub instances: BTreeMap<u64, InstanceDefinition>,
    pub next_cluster_id: u64,
    pub next_replicaset_id: u64,
    pub next_host_id: u32,
    pub next_instance_id: u64,
    pub saved_at: Option<DateTime<Utc>>,
}

impl CatalogTables {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            next_cluster_id: 1,
            next_replicaset_id: 1,
            next_host_id: 1,
            next_instance_id: 1,
            ..Default::default()
        }
    }

    pub fn instance_by_endpoint(&self, endpoint: &str) -> Option<&InstanceDefinition> {
        self.instances.values().find(|i| i.endpoint == endpoint)
    }

    pub fn replicaset_instances(&self, rs_id: u64) -> Vec<InstanceDefinition> {
        self.instances
            .values()
            .filter(|i| i.replicaset_id == rs_id)
            .cloned()
            .collect()
    }

    /// Deletes a host row no instance refers to anymore.
    pub fn prune_host(&mut self, host_id: u32) {
        if self.instances.values().any(|i| i.host_id == host_id) {
            return;
        }
        if self.hosts.remove(&host_id).is_some() {
            self.next_host_id = self.hosts.keys().next_back().map_or(1, |id| id + 1);
        }
    }

    /// Winds the id counters back past rows deleted from the top.
    pub fn reclaim_instance_ids(&mut self) {
        self.next_instance_id = self.instances.keys().next_back().map_or(1, |id| id + 1);
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Backend that persists committed catalog snapshots.
pub trait CatalogStore: Send + Sync {
    /// Loads the last committed snapshot, or an empty catalog.
    fn load(&self) -> Result<CatalogTables>;

    /// Replaces the stored snapshot.
    fn save(&self, tables: &CatalogTables) -> Result<()>;
}

/// Catalog kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: Mutex<Option<CatalogTables>>,
    reject_writes: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail, as an unreachable catalog server would.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Copy of the last committed snapshot.
    pub fn committed(&self) -> Result<CatalogTables> {
        self.load()
    }
}

impl CatalogStore for InMemoryCatalog {
    fn load(&self) -> Result<CatalogTables> {
        let guard = self.tables.lock()?;
        Ok(guard.clone().unwrap_or_else(CatalogTables::new))
    }

    fn save(&self, tables: &CatalogTables) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(AdminError::metadata("the catalog is read-only"));
        }
        *self.tables.lock()? = Some(tables.clone());
        Ok(())
    }
}

/// Catalog persisted as a JSON document.
///
/// Writes go to a temporary file in the same directory which is then
/// atomically renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogStore for JsonFileCatalog {
    fn load(&self) -> Result<CatalogTables> {
        if !self.path.exists() {
            return Ok(CatalogTables::new());
        }
        let bytes = std::fs::read(&self.path)
            .map_err(|e| AdminError::metadata(format!("read catalog snapshot: {}", e)))?;
        let tables: CatalogTables = serde_json::from_slice(&bytes)
            .map_err(|e| AdminError::metadata(format!("parse catalog snapshot: {}", e)))?;
        if tables.version != CatalogTables::VERSION {
            return Err(AdminError::metadata(format!(
                "Unsupported catalog snapshot version {}",
                tables.version
            )));
        }
        Ok(tables)
    }

    fn save(&self, tables: &CatalogTables) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let json = serde_json::to_vec_pretty(tables)
            .map_err(|e| AdminError::metadata(format!("serialize catalog snapshot: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| AdminError::metadata(format!("create catalog snapshot: {}", e)))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AdminError::metadata(format!("write catalog snapshot: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| AdminError::metadata(format!("persist catalog snapshot: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::TopologyType;

    fn sample_tables() -> CatalogTables {
        let mut tables = CatalogTables::new();
        tables.replicasets.insert(
            1,
            ReplicaSetRow {
                id: 1,
                cluster_id: 1,
                name: "default".into(),
                topology_type: TopologyType::SinglePrimary,
                group_name: "8a94f5f4-0000-0000-0000-000000000000".into(),
                active: true,
                adopted: false,
            },
        );
        tables.next_replicaset_id = 2;
        tables
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryCatalog::new();
        assert!(store.load().unwrap().replicasets.is_empty());

        store.save(&sample_tables()).unwrap();
        assert_eq!(store.load().unwrap().replicasets.len(), 1);
    }

    #[test]
    fn test_in_memory_rejects_writes() {
        let store = InMemoryCatalog::new();
        store.set_reject_writes(true);
        assert!(store.save(&sample_tables()).is_err());
        assert!(store.load().unwrap().replicasets.is_empty());
    }

    #[test]
    fn test_json_file_persists_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCatalog::new(dir.path().join("catalog.json"));

        assert_eq!(store.load().unwrap(), CatalogTables::new());

        let tables = sample_tables();
        store.save(&tables).unwrap();

        let reopened = JsonFileCatalog::new(store.path());
        assert_eq!(reopened.load().unwrap(), tables);
    }

    #[test]
    fn test_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileCatalog::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Metadata);
    }
}
