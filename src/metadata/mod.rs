//! Transactional metadata catalog.
//!
//! The catalog records clusters, replicasets, hosts and instances. It is
//! read freely, but every mutation goes through a [`Transaction`] guard
//! that restores the pre-transaction state unless it is committed.

pub mod catalog;
pub mod types;

pub use catalog::{CatalogStore, CatalogTables, InMemoryCatalog, JsonFileCatalog};
pub use types::{ClusterRow, HostRow, InstanceDefinition, ReplicaSetRow, TopologyType};

use crate::connection::{Session, quote_literal};
use crate::core::{AdminError, Result};
use crate::group::{self, MemberState};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, RwLock};

/// Working copy of the catalog plus the snapshot taken at `begin`.
#[derive(Debug)]
struct CatalogState {
    tables: CatalogTables,
    snapshot: Option<CatalogTables>,
}

/// Instance row paired with the state the live group reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceWithState {
    pub definition: InstanceDefinition,
    /// `None` when the live group does not list the instance
    pub state: Option<MemberState>,
}

impl InstanceWithState {
    pub fn is_online(&self) -> bool {
        self.state == Some(MemberState::Online)
    }
}

/// Handle to the metadata catalog and the session used to reach it.
pub struct MetadataStorage {
    session: RwLock<Option<Arc<dyn Session>>>,
    store: Arc<dyn CatalogStore>,
    state: Mutex<CatalogState>,
}

impl MetadataStorage {
    /// Opens the catalog held by `store`, reached through `session`.
    pub fn new(session: Arc<dyn Session>, store: Arc<dyn CatalogStore>) -> Result<Self> {
        let tables = store.load()?;
        debug!(
            "Loaded metadata catalog: {} cluster(s), {} instance(s)",
            tables.clusters.len(),
            tables.instances.len()
        );
        Ok(Self {
            session: RwLock::new(Some(session)),
            store,
            state: Mutex::new(CatalogState {
                tables,
                snapshot: None,
            }),
        })
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Session to the instance holding the catalog.
    pub fn session(&self) -> Result<Arc<dyn Session>> {
        let guard = self.session.read()?;
        match guard.as_ref() {
            Some(session) if session.is_open() => Ok(Arc::clone(session)),
            _ => Err(AdminError::metadata(
                "The Metadata is inaccessible: the metadata session is closed",
            )),
        }
    }

    /// Fails unless the metadata session is usable.
    pub fn ensure_available(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_ok()
    }

    /// Closes the metadata session. Further catalog calls fail.
    pub fn disconnect(&self) -> Result<()> {
        if let Some(session) = self.session.write()?.take() {
            info!(
                "Closing metadata session to {}",
                session.connection_options().address()
            );
            session.close();
        }
        Ok(())
    }

    /// Reloads the committed catalog, discarding the working copy.
    pub fn refresh(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.snapshot.is_some() {
            return Err(AdminError::metadata(
                "Cannot refresh the Metadata while a transaction is active",
            ));
        }
        state.tables = self.store.load()?;
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Starts a transaction. Only one may be open at a time.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.ensure_available()?;
        let mut state = self.state.lock()?;
        if state.snapshot.is_some() {
            return Err(AdminError::metadata("Transaction already active"));
        }
        state.snapshot = Some(state.tables.clone());
        debug!("Metadata transaction started");
        Ok(Transaction {
            storage: self,
            finished: false,
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().map(|s| s.snapshot.is_some()).unwrap_or(false)
    }

    fn commit_working_copy(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        state.tables.saved_at = Some(Utc::now());
        match self.store.save(&state.tables) {
            Ok(()) => {
                state.snapshot = None;
                debug!("Metadata transaction committed");
                Ok(())
            }
            Err(err) => {
                if let Some(snapshot) = state.snapshot.take() {
                    state.tables = snapshot;
                }
                warn!("Metadata commit failed, changes rolled back: {}", err);
                Err(AdminError::metadata(format!(
                    "Metadata update failed: {}",
                    err.message()
                )))
            }
        }
    }

    fn rollback_working_copy(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if let Some(snapshot) = state.snapshot.take() {
            state.tables = snapshot;
            debug!("Metadata transaction rolled back");
        }
        Ok(())
    }

    fn read<R>(&self, f: impl FnOnce(&CatalogTables) -> R) -> Result<R> {
        self.ensure_available()?;
        let state = self.state.lock()?;
        Ok(f(&state.tables))
    }

    fn write<R>(&self, f: impl FnOnce(&mut CatalogTables) -> Result<R>) -> Result<R> {
        self.ensure_available()?;
        let mut state = self.state.lock()?;
        if state.snapshot.is_none() {
            return Err(AdminError::metadata("No active Metadata transaction"));
        }
        f(&mut state.tables)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn cluster_exists(&self, name: &str) -> Result<bool> {
        self.read(|t| t.clusters.values().any(|c| c.name == name))
    }

    pub fn get_cluster(&self, name: &str) -> Result<ClusterRow> {
        self.read(|t| t.clusters.values().find(|c| c.name == name).cloned())?
            .ok_or_else(|| {
                AdminError::metadata(format!("The cluster with the name '{}' does not exist.", name))
            })
    }

    /// The single cluster registered in the catalog, if any.
    pub fn get_default_cluster(&self) -> Result<Option<ClusterRow>> {
        self.read(|t| t.clusters.values().next().cloned())
    }

    pub fn get_replicaset(&self, rs_id: u64) -> Result<ReplicaSetRow> {
        self.read(|t| t.replicasets.get(&rs_id).cloned())?
            .ok_or_else(|| {
                AdminError::metadata(format!("ReplicaSet with id {} does not exist", rs_id))
            })
    }

    pub fn is_replicaset_active(&self, rs_id: u64) -> Result<bool> {
        Ok(self.get_replicaset(rs_id)?.active)
    }

    pub fn is_replicaset_empty(&self, rs_id: u64) -> Result<bool> {
        self.read(|t| !t.instances.values().any(|i| i.replicaset_id == rs_id))
    }

    /// Number of instances registered in a replicaset.
    pub fn get_replicaset_count(&self, rs_id: u64) -> Result<usize> {
        self.read(|t| t.instances.values().filter(|i| i.replicaset_id == rs_id).count())
    }

    pub fn is_instance_on_replicaset(&self, rs_id: u64, address: &str) -> Result<bool> {
        self.read(|t| {
            t.instance_by_endpoint(address)
                .is_some_and(|i| i.replicaset_id == rs_id)
        })
    }

    pub fn get_instance(&self, address: &str) -> Result<InstanceDefinition> {
        self.read(|t| t.instance_by_endpoint(address).cloned())?
            .ok_or_else(|| {
                AdminError::metadata(format!(
                    "The instance '{}' does not belong to the cluster.",
                    address
                ))
            })
    }

    pub fn get_host(&self, host_id: u32) -> Result<Option<HostRow>> {
        self.read(|t| t.hosts.get(&host_id).cloned())
    }

    pub fn get_replicaset_instances(&self, rs_id: u64) -> Result<Vec<InstanceDefinition>> {
        self.read(|t| t.replicaset_instances(rs_id))
    }

    /// Catalog rows joined with the membership view of the metadata session.
    pub fn get_replicaset_instances_with_state(&self, rs_id: u64) -> Result<Vec<InstanceWithState>> {
        let session = self.session()?;
        self.get_replicaset_instances_seen_by(rs_id, session.as_ref())
    }

    /// Catalog rows joined with the membership view of another member.
    pub fn get_replicaset_instances_seen_by(
        &self,
        rs_id: u64,
        observer: &dyn Session,
    ) -> Result<Vec<InstanceWithState>> {
        let members = group::get_group_members(observer)?;
        let instances = self.get_replicaset_instances(rs_id)?;
        Ok(instances
            .into_iter()
            .map(|definition| {
                let state = members
                    .iter()
                    .find(|m| m.uuid == definition.uuid)
                    .map(|m| m.state);
                InstanceWithState { definition, state }
            })
            .collect())
    }

    /// Instances the live group reports as ONLINE.
    pub fn get_replicaset_online_instances(&self, rs_id: u64) -> Result<Vec<InstanceDefinition>> {
        Ok(self
            .get_replicaset_instances_with_state(rs_id)?
            .into_iter()
            .filter(InstanceWithState::is_online)
            .map(|i| i.definition)
            .collect())
    }

    /// Creates a replication account on the metadata instance and returns
    /// `(user, password)`.
    pub fn create_repl_account(&self, prefix: &str) -> Result<(String, String)> {
        let session = self.session()?;
        let suffix = uuid::Uuid::new_v4().as_u128() % 10_000_000_000;
        let user = format!("{}{:010}", prefix, suffix);
        let password = uuid::Uuid::new_v4().simple().to_string();
        let account = format!("{}@'%'", quote_literal(&user));

        session.execute(&format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED BY {}",
            account,
            quote_literal(&password)
        ))?;
        session.execute(&format!("GRANT REPLICATION SLAVE ON *.* TO {}", account))?;
        info!("Created replication account {}", user);
        Ok((user, password))
    }
}

impl std::fmt::Debug for MetadataStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStorage")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Open catalog transaction.
///
/// Dropping the guard without calling [`commit`](Transaction::commit)
/// rolls every change back, including when an error is propagated with `?`
/// out of the scope holding it.
#[must_use = "a transaction is rolled back when dropped"]
pub struct Transaction<'a> {
    storage: &'a MetadataStorage,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.storage.commit_working_copy()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.storage.rollback_working_copy()
    }

    pub fn insert_cluster(&self, name: &str, description: &str) -> Result<u64> {
        self.storage.write(|t| {
            if t.clusters.values().any(|c| c.name == name) {
                return Err(AdminError::metadata(format!(
                    "A Cluster with the name '{}' already exists.",
                    name
                )));
            }
            let id = t.next_cluster_id;
            t.next_cluster_id += 1;
            t.clusters.insert(
                id,
                ClusterRow {
                    id,
                    name: name.to_string(),
                    description: description.to_string(),
                    default_replicaset: None,
                },
            );
            Ok(id)
        })
    }

    pub fn set_cluster_default_replicaset(&self, cluster_id: u64, rs_id: Option<u64>) -> Result<()> {
        self.storage.write(|t| {
            let cluster = t.clusters.get_mut(&cluster_id).ok_or_else(|| {
                AdminError::metadata(format!("Cluster with id {} does not exist", cluster_id))
            })?;
            cluster.default_replicaset = rs_id;
            Ok(())
        })
    }

    /// Deletes a cluster that no longer owns any replicaset.
    pub fn drop_cluster(&self, name: &str) -> Result<()> {
        self.storage.write(|t| {
            let id = t
                .clusters
                .values()
                .find(|c| c.name == name)
                .map(|c| c.id)
                .ok_or_else(|| {
                    AdminError::metadata(format!(
                        "The cluster with the name '{}' does not exist.",
                        name
                    ))
                })?;
            if t.replicasets.values().any(|r| r.cluster_id == id) {
                return Err(AdminError::logic(format!(
                    "The cluster '{}' is not empty.",
                    name
                )));
            }
            t.clusters.remove(&id);
            Ok(())
        })
    }

    pub fn insert_replicaset(
        &self,
        cluster_id: u64,
        name: &str,
        topology_type: TopologyType,
        group_name: &str,
        adopted: bool,
    ) -> Result<u64> {
        self.storage.write(|t| {
            if !t.clusters.contains_key(&cluster_id) {
                return Err(AdminError::metadata(format!(
                    "Cluster with id {} does not exist",
                    cluster_id
                )));
            }
            let id = t.next_replicaset_id;
            t.next_replicaset_id += 1;
            t.replicasets.insert(
                id,
                ReplicaSetRow {
                    id,
                    cluster_id,
                    name: name.to_string(),
                    topology_type,
                    group_name: group_name.to_string(),
                    active: true,
                    adopted,
                },
            );
            Ok(id)
        })
    }

    pub fn set_replicaset_group_name(&self, rs_id: u64, group_name: &str) -> Result<()> {
        self.with_replicaset(rs_id, |rs| rs.group_name = group_name.to_string())
    }

    /// Marks the replicaset inactive, keeping its row.
    pub fn disable_replicaset(&self, rs_id: u64) -> Result<()> {
        self.with_replicaset(rs_id, |rs| rs.active = false)
    }

    /// Deletes the replicaset, its instance rows and the host rows left
    /// unused, returning the instance rows removed.
    pub fn drop_replicaset(&self, rs_id: u64) -> Result<Vec<InstanceDefinition>> {
        self.storage.write(|t| {
            let rs = t.replicasets.remove(&rs_id).ok_or_else(|| {
                AdminError::metadata(format!("ReplicaSet with id {} does not exist", rs_id))
            })?;
            let removed = t.replicaset_instances(rs_id);
            t.instances.retain(|_, i| i.replicaset_id != rs_id);
            for instance in &removed {
                t.prune_host(instance.host_id);
            }
            t.reclaim_instance_ids();
            if let Some(cluster) = t.clusters.get_mut(&rs.cluster_id) {
                if cluster.default_replicaset == Some(rs_id) {
                    cluster.default_replicaset = None;
                }
            }
            Ok(removed)
        })
    }

    /// Registers a host, reusing an existing row with the same name.
    pub fn insert_host(&self, host_name: &str, ip_address: &str, location: &str) -> Result<u32> {
        self.storage.write(|t| {
            if let Some(host) = t.hosts.values().find(|h| h.host_name == host_name) {
                return Ok(host.id);
            }
            let id = t.next_host_id;
            t.next_host_id += 1;
            t.hosts.insert(
                id,
                HostRow {
                    id,
                    host_name: host_name.to_string(),
                    ip_address: ip_address.to_string(),
                    location: location.to_string(),
                },
            );
            Ok(id)
        })
    }

    /// Inserts an instance row. A zero `id` gets a fresh one; a non-zero id
    /// is kept, which is how a deleted row is restored.
    pub fn insert_instance(&self, mut definition: InstanceDefinition) -> Result<u64> {
        self.storage.write(|t| {
            if t.instance_by_endpoint(&definition.endpoint).is_some() {
                return Err(AdminError::metadata(format!(
                    "The instance '{}' is already registered in the Metadata.",
                    definition.endpoint
                )));
            }
            if !t.replicasets.contains_key(&definition.replicaset_id) {
                return Err(AdminError::metadata(format!(
                    "ReplicaSet with id {} does not exist",
                    definition.replicaset_id
                )));
            }
            if definition.id == 0 || t.instances.contains_key(&definition.id) {
                definition.id = t.next_instance_id;
                t.next_instance_id += 1;
            } else {
                t.next_instance_id = t.next_instance_id.max(definition.id + 1);
            }
            let id = definition.id;
            t.instances.insert(id, definition);
            Ok(id)
        })
    }

    /// Deletes the row registered under `address`, returning it. The host
    /// row goes with it when no other instance runs on that host.
    pub fn remove_instance(&self, address: &str) -> Result<InstanceDefinition> {
        self.storage.write(|t| {
            let id = t
                .instance_by_endpoint(address)
                .map(|i| i.id)
                .ok_or_else(|| {
                    AdminError::metadata(format!(
                        "The instance '{}' does not belong to the cluster.",
                        address
                    ))
                })?;
            let removed = t.instances.remove(&id).ok_or_else(|| {
                AdminError::metadata(format!("Instance row {} vanished", id))
            })?;
            t.prune_host(removed.host_id);
            t.reclaim_instance_ids();
            Ok(removed)
        })
    }

    pub fn set_instance_label(&self, address: &str, label: &str) -> Result<()> {
        self.storage.write(|t| {
            let instance = t
                .instances
                .values_mut()
                .find(|i| i.endpoint == address)
                .ok_or_else(|| {
                    AdminError::metadata(format!(
                        "The instance '{}' does not belong to the cluster.",
                        address
                    ))
                })?;
            instance.label = label.to_string();
            Ok(())
        })
    }

    fn with_replicaset(&self, rs_id: u64, f: impl FnOnce(&mut ReplicaSetRow)) -> Result<()> {
        self.storage.write(|t| {
            let rs = t.replicasets.get_mut(&rs_id).ok_or_else(|| {
                AdminError::metadata(format!("ReplicaSet with id {} does not exist", rs_id))
            })?;
            f(rs);
            Ok(())
        })
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.storage.rollback_working_copy() {
                warn!("Metadata rollback on drop failed: {}", err);
            }
        }
    }
}
