//! Public cluster handle.
//!
//! Every operation except `disconnect` first checks that the handle is
//! still usable and that the group, as seen through the group session,
//! accepts the operation. Errors leave prefixed with the operation name.

use super::AdminContext;
use super::options::{
    AddInstanceOptions, CheckStateOptions, CreateClusterOptions, DissolveOptions,
    ForceQuorumOptions, OperationOptions, RejoinInstanceOptions, RemoveInstanceOptions,
};
use super::preconditions::{Operation, check_preconditions};
use super::prompt::{self, Outcome};
use super::replicaset::ReplicaSet;
use super::status::{ClusterDescription, ClusterRescanReport, ClusterStatus, InstanceStateReport};
use super::validations;
use crate::connection::{ConnectionOptions, Session, open_scoped_session};
use crate::core::{AdminError, Result};
use crate::group::{self, GrInstanceType, ReplicationGroupState};
use crate::metadata::{CatalogStore, MetadataStorage, TopologyType};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

pub struct Cluster {
    name: String,
    group_session: RwLock<Option<Arc<dyn Session>>>,
    metadata: Arc<MetadataStorage>,
    default_replica_set: RwLock<Option<Arc<ReplicaSet>>>,
    dissolved: AtomicBool,
    context: AdminContext,
}

impl Cluster {
    /// Creates a cluster whose seed is the instance behind `session`.
    ///
    /// With `adopt_from_gr` the group the instance belongs to is registered
    /// as is; otherwise a new group is bootstrapped on it. When the seed
    /// cannot be added the catalog rows written so far are removed again.
    pub fn create(
        context: AdminContext,
        session: Arc<dyn Session>,
        store: Arc<dyn CatalogStore>,
        name: &str,
        options: CreateClusterOptions,
    ) -> Result<Self> {
        Self::create_inner(context, session, store, name, options)
            .map_err(|e| e.in_function("Dba.createCluster"))
    }

    fn create_inner(
        context: AdminContext,
        session: Arc<dyn Session>,
        store: Arc<dyn CatalogStore>,
        name: &str,
        mut options: CreateClusterOptions,
    ) -> Result<Self> {
        validations::validate_cluster_name(name)?;
        options.validate()?;

        let metadata = Arc::new(MetadataStorage::new(Arc::clone(&session), store)?);
        if metadata.cluster_exists(name)? {
            return Err(AdminError::argument(format!(
                "A Cluster with the name '{}' already exists.",
                name
            )));
        }

        let instance_type = group::get_gr_instance_type(session.as_ref())?;
        let address = session.connection_options().address();
        let (topology_type, group_name) = if options.adopt_from_gr {
            if instance_type == GrInstanceType::Standalone {
                return Err(AdminError::runtime(format!(
                    "The adoptFromGR option is set to true, but the instance '{}' is not part of \
                     a replication group.",
                    address
                )));
            }
            (
                group::get_topology_type(session.as_ref())?,
                group::get_group_name(session.as_ref())?.unwrap_or_default(),
            )
        } else {
            if instance_type != GrInstanceType::Standalone {
                return Err(AdminError::runtime(format!(
                    "Creating a cluster on an unmanaged replication group requires adoptFromGR \
                     option to be true. The instance '{}' is already part of a group.",
                    address
                )));
            }
            (TopologyType::from_multi_primary(options.multi_primary), String::new())
        };

        let tx = metadata.begin()?;
        let cluster_id = tx.insert_cluster(name, options.description.as_deref().unwrap_or(""))?;
        let rs_id = tx.insert_replicaset(
            cluster_id,
            ReplicaSet::DEFAULT_NAME,
            topology_type,
            &group_name,
            options.adopt_from_gr,
        )?;
        tx.set_cluster_default_replicaset(cluster_id, Some(rs_id))?;
        tx.commit()?;

        let row = metadata.get_replicaset(rs_id)?;
        let replica_set = ReplicaSet::new(&row, name, Arc::clone(&metadata), context.clone());

        let seeded = if options.adopt_from_gr {
            replica_set.adopt_from_gr().map(|adopted| {
                info!("Adopted {} instance(s) into cluster '{}'", adopted.len(), name);
            })
        } else {
            replica_set
                .add_seed_instance(
                    session.connection_options(),
                    &options.seed_options(),
                    &group::generate_group_name(),
                )
                .map(|message| info!("{}", message))
        };

        if let Err(err) = seeded {
            let undone = metadata.begin().and_then(|tx| {
                tx.drop_replicaset(rs_id)?;
                tx.drop_cluster(name)?;
                tx.commit()
            });
            match undone {
                Ok(()) => info!("Removed the Metadata of cluster '{}' after the failed creation", name),
                Err(undo) => error!("Could not remove the Metadata of cluster '{}': {}", name, undo),
            }
            return Err(err);
        }

        info!("Cluster '{}' created with seed instance '{}'", name, address);
        Ok(Self::from_parts(name, session, metadata, replica_set, context))
    }

    /// Loads a cluster registered in the catalog held by `store`. Without a
    /// name the single registered cluster is returned.
    pub fn get(
        context: AdminContext,
        session: Arc<dyn Session>,
        store: Arc<dyn CatalogStore>,
        name: Option<&str>,
    ) -> Result<Self> {
        let load = || -> Result<Self> {
            let metadata = Arc::new(MetadataStorage::new(Arc::clone(&session), store)?);
            let row = match name {
                Some(name) => metadata.get_cluster(name)?,
                None => metadata
                    .get_default_cluster()?
                    .ok_or_else(|| AdminError::metadata("No default cluster is configured."))?,
            };
            let rs_id = row.default_replicaset.ok_or_else(|| {
                AdminError::metadata(format!(
                    "The cluster '{}' has no default ReplicaSet.",
                    row.name
                ))
            })?;
            let rs_row = metadata.get_replicaset(rs_id)?;
            let replica_set = ReplicaSet::new(&rs_row, &row.name, Arc::clone(&metadata), context.clone());
            Ok(Self::from_parts(&row.name, session, metadata, replica_set, context))
        };
        load().map_err(|e| e.in_function("Dba.getCluster"))
    }

    fn from_parts(
        name: &str,
        session: Arc<dyn Session>,
        metadata: Arc<MetadataStorage>,
        replica_set: ReplicaSet,
        context: AdminContext,
    ) -> Self {
        Self {
            name: name.to_string(),
            group_session: RwLock::new(Some(session)),
            metadata,
            default_replica_set: RwLock::new(Some(Arc::new(replica_set))),
            dissolved: AtomicBool::new(false),
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Arc<MetadataStorage> {
        &self.metadata
    }

    pub fn is_dissolved(&self) -> bool {
        self.dissolved.load(Ordering::SeqCst)
    }

    pub fn default_replica_set(&self) -> Result<Arc<ReplicaSet>> {
        self.default_replica_set
            .read()?
            .clone()
            .ok_or_else(|| AdminError::logic("ReplicaSet not initialized."))
    }

    /// Reads group state through `session` instead of the metadata session.
    pub fn set_group_session(&self, session: Arc<dyn Session>) -> Result<()> {
        *self.group_session.write()? = Some(session);
        Ok(())
    }

    fn group_session(&self) -> Result<Arc<dyn Session>> {
        match self.group_session.read()?.as_ref() {
            Some(session) if session.is_open() => Ok(Arc::clone(session)),
            _ => Err(disconnected_error()),
        }
    }

    fn assert_valid(&self, operation: Operation) -> Result<()> {
        if self.is_dissolved() {
            return Err(AdminError::runtime(format!(
                "Can't call function '{}' on a dissolved cluster",
                operation.name()
            )));
        }
        if !self.metadata.is_connected() {
            return Err(disconnected_error());
        }
        self.group_session().map(|_| ())
    }

    /// Runs `f` after the handle and group checks, prefixing any error
    /// with the operation name. The catalog is reloaded first so changes
    /// committed through other handles are seen.
    fn run<T>(
        &self,
        operation: Operation,
        f: impl FnOnce(&ReplicationGroupState) -> Result<T>,
    ) -> Result<T> {
        let checked = || -> Result<T> {
            self.assert_valid(operation)?;
            self.metadata.refresh()?;
            let session = self.group_session()?;
            let state = check_preconditions(operation, session.as_ref())?;
            f(&state)
        };
        checked().map_err(|e| e.in_function(&operation.qualified_name()))
    }

    fn confirm(&self, interactive: Option<bool>, message: &str) -> bool {
        !interactive.unwrap_or(self.context.config.wizards) || self.context.prompt.confirm(message)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub fn add_instance(
        &self,
        instance: &ConnectionOptions,
        mut options: AddInstanceOptions,
    ) -> Result<String> {
        self.run(Operation::AddInstance, |_| {
            options.validate()?;
            self.default_replica_set()?.add_instance(instance, &options)
        })
    }

    pub fn rejoin_instance(
        &self,
        instance: &ConnectionOptions,
        mut options: RejoinInstanceOptions,
    ) -> Result<String> {
        self.run(Operation::RejoinInstance, |_| {
            options.validate()?;
            self.default_replica_set()?.rejoin_instance(instance, &options)
        })
    }

    pub fn remove_instance(
        &self,
        instance: &ConnectionOptions,
        mut options: RemoveInstanceOptions,
    ) -> Result<Outcome> {
        self.run(Operation::RemoveInstance, |_| {
            options.validate()?;
            let warning = prompt::remove_instance_warning(&instance.address(), options.force);
            if !self.confirm(options.interactive, &warning) {
                info!("Removal of '{}' cancelled", instance.address());
                return Ok(Outcome::Cancelled);
            }
            self.default_replica_set()?
                .remove_instance(instance, &options)
                .map(Outcome::Done)
        })
    }

    /// Removes every instance from the group and the cluster from the
    /// catalog. The handle is unusable afterwards.
    pub fn dissolve(&self, mut options: DissolveOptions) -> Result<Outcome> {
        self.run(Operation::Dissolve, |_| {
            options.validate()?;
            let warning = prompt::dissolve_warning(&self.name, options.force);
            if !self.confirm(options.interactive, &warning) {
                info!("Dissolve of cluster '{}' cancelled", self.name);
                return Ok(Outcome::Cancelled);
            }

            self.default_replica_set()?.dissolve(options.force)?;

            let tx = self.metadata.begin()?;
            tx.drop_cluster(&self.name)?;
            tx.commit()?;

            *self.default_replica_set.write()? = None;
            self.dissolved.store(true, Ordering::SeqCst);
            info!("Cluster '{}' dissolved", self.name);
            Ok(Outcome::Done(
                "The cluster was successfully dissolved.\nReplication was disabled but user data \
                 was left intact."
                    .to_string(),
            ))
        })
    }

    /// Makes every instance leave the group, keeping the catalog.
    pub fn disable(&self) -> Result<()> {
        self.run(Operation::Disable, |_| self.default_replica_set()?.disable())
    }

    pub fn rescan(&self) -> Result<ClusterRescanReport> {
        self.run(Operation::Rescan, |_| {
            Ok(ClusterRescanReport {
                default_replica_set: self.default_replica_set()?.rescan()?,
            })
        })
    }

    /// Registers every member of the live group missing from the catalog.
    pub fn adopt_from_gr(&self) -> Result<Vec<String>> {
        self.run(Operation::AdoptFromGr, |_| {
            self.default_replica_set()?.adopt_from_gr()
        })
    }

    /// Restores quorum from the partition `instance` belongs to. Always
    /// asks for confirmation.
    pub fn force_quorum_using_partition_of(
        &self,
        instance: &ConnectionOptions,
        mut options: ForceQuorumOptions,
    ) -> Result<Outcome> {
        self.run(Operation::ForceQuorumUsingPartitionOf, |_| {
            options.validate()?;
            let warning = prompt::force_quorum_warning(&instance.address());
            if !self.context.prompt.confirm(&warning) {
                info!("Quorum restore from '{}' cancelled", instance.address());
                return Ok(Outcome::Cancelled);
            }
            self.default_replica_set()?
                .force_quorum_using_partition_of(instance, options.password.as_deref())
                .map(Outcome::Done)
        })
    }

    pub fn check_instance_state(
        &self,
        instance: &ConnectionOptions,
        mut options: CheckStateOptions,
    ) -> Result<InstanceStateReport> {
        self.run(Operation::CheckInstanceState, |_| {
            options.validate()?;
            self.default_replica_set()?
                .retrieve_instance_state(instance, options.password.as_deref())
        })
    }

    pub fn describe(&self) -> Result<ClusterDescription> {
        self.run(Operation::Describe, |state| {
            if !self.metadata.cluster_exists(&self.name)? {
                return Err(AdminError::argument(format!(
                    "The cluster '{}' no longer exists.",
                    self.name
                )));
            }
            let warning = (!state.source_state.is_online()).then(|| {
                format!(
                    "The instance description may be outdated since was generated from an \
                     instance in {} state",
                    state.source_state.describe()
                )
            });
            Ok(ClusterDescription {
                cluster_name: self.name.clone(),
                default_replica_set: Some(self.default_replica_set()?.get_description()?),
                warning,
            })
        })
    }

    pub fn status(&self) -> Result<ClusterStatus> {
        self.run(Operation::Status, |state| {
            let group_session = self.group_session()?;
            let group_address = group_session.connection_options().address();
            let md_address = self.metadata.session()?.connection_options().address();

            let warning = (!state.source_state.is_online()).then(|| {
                format!(
                    "The instance status may be inaccurate as it was generated from an instance \
                     in {} state",
                    state.source_state.describe()
                )
            });
            Ok(ClusterStatus {
                cluster_name: self.name.clone(),
                default_replica_set: Some(self.default_replica_set()?.get_status(state)?),
                group_information_source_member: format!(
                    "mysql://{}",
                    group_session.connection_options().to_uri()
                ),
                metadata_server: (md_address != group_address).then_some(md_address),
                warning,
            })
        })
    }

    /// Waits until `instance` has applied every transaction the group has
    /// executed, polling at the configured interval.
    pub fn sync_transactions(&self, instance: &ConnectionOptions) -> Result<()> {
        self.run(Operation::SyncTransactions, |_| {
            let replica_set = self.default_replica_set()?;
            let options = replica_set.target_options(instance, None)?;
            let address = options.address();
            let target = open_scoped_session(self.context.connector.as_ref(), &options, "target")?;

            let required = replica_set.group_gtid_executed()?;
            let deadline = Instant::now() + self.context.config.gtid_wait_timeout;
            loop {
                let executed = group::get_gtid_executed(target.session())?;
                if required.is_subset_of(&executed) {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(AdminError::runtime(format!(
                        "Timeout reached waiting for cluster transactions to be applied on \
                         instance '{}'",
                        address
                    )));
                }
                std::thread::sleep(self.context.config.gtid_poll_interval);
            }
        })
    }

    /// Closes the group and metadata sessions. Later calls fail.
    pub fn disconnect(&self) -> Result<()> {
        if let Some(session) = self.group_session.write()?.take() {
            if session.is_open() {
                session.close();
            }
        }
        self.metadata.disconnect()
    }
}

fn disconnected_error() -> AdminError {
    AdminError::runtime(
        "The cluster object is disconnected. Please call getCluster() to obtain a fresh cluster \
         handle.",
    )
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("dissolved", &self.is_dissolved())
            .finish_non_exhaustive()
    }
}
