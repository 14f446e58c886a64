//! Orchestration of the membership of one replication group.
//!
//! Every operation combines three sources that change independently: the
//! metadata catalog, the live group as seen through a member session, and
//! the outcome of the provisioning tool. The catalog is only written once
//! the live state agrees with it, or compensated when a later step fails.

use super::AdminContext;
use super::options::{AddInstanceOptions, RejoinInstanceOptions, RemoveInstanceOptions};
use super::status::{
    InstanceDescription, InstanceStateReport, InstanceStatus, NewInstance, ReplicaSetDescription,
    ReplicaSetStatusReport, RescanReport, UnavailableInstance,
};
use super::validations;
use crate::connection::{
    ConnectionOptions, Session, get_server_variable, open_scoped_session, require_server_variable,
};
use crate::core::{AdminError, Result, Value};
use crate::group::{
    self, GrInstanceType, GroupHealth, GtidConsistency, GtidSet, ManagedInstanceState, MemberState,
    ReplicationGroupState, sql,
};
use crate::metadata::{HostRow, InstanceDefinition, MetadataStorage, ReplicaSetRow, TopologyType};
use crate::provision::{GroupSettings, ProvisionCredentials};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A replication group registered in the catalog.
///
/// Refers to its cluster by name only; the cluster owns the replicaset.
pub struct ReplicaSet {
    id: u64,
    name: String,
    topology_type: TopologyType,
    cluster_name: String,
    metadata: Arc<MetadataStorage>,
    context: AdminContext,
}

impl ReplicaSet {
    pub const DEFAULT_NAME: &'static str = "default";

    pub(crate) fn new(
        row: &ReplicaSetRow,
        cluster_name: &str,
        metadata: Arc<MetadataStorage>,
        context: AdminContext,
    ) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            topology_type: row.topology_type,
            cluster_name: cluster_name.to_string(),
            metadata,
            context,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology_type(&self) -> TopologyType {
        self.topology_type
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Group name recorded in the catalog.
    pub fn group_name(&self) -> Result<String> {
        Ok(self.metadata.get_replicaset(self.id)?.group_name)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolves the options used to reach a target: the password option
    /// wins, the port defaults to the configured one and missing
    /// credentials come from the metadata session.
    pub(crate) fn target_options(
        &self,
        instance: &ConnectionOptions,
        password: Option<&str>,
    ) -> Result<ConnectionOptions> {
        instance.validate()?;
        let mut options = instance.clone();
        if let Some(password) = password {
            options.password = Some(password.to_string());
        }
        if options.port.is_none() {
            options.port = Some(self.context.config.default_port);
        }
        let md_session = self.metadata.session()?;
        options.inherit_credentials(md_session.connection_options());
        options.resolve_credentials(&self.context.config.default_user);
        Ok(options)
    }

    /// Options to reach a registered endpoint with the credentials of
    /// `credentials`.
    fn endpoint_options(endpoint: &str, credentials: &ConnectionOptions) -> Result<ConnectionOptions> {
        let mut options = ConnectionOptions::from_uri(endpoint)?;
        options.user = credentials.user.clone();
        options.password = credentials.password.clone();
        options.ssl = credentials.ssl.clone();
        Ok(options)
    }

    fn not_member_error(&self, address: &str) -> AdminError {
        AdminError::runtime(format!(
            "The instance '{}' does not belong to the ReplicaSet: '{}'.",
            address, self.name
        ))
    }

    fn ensure_member(&self, address: &str) -> Result<()> {
        if !self.metadata.is_instance_on_replicaset(self.id, address)? {
            return Err(self.not_member_error(address));
        }
        Ok(())
    }

    /// Registers the instance behind `session` in the catalog. When
    /// `group_name` is given it is recorded in the replicaset row in the
    /// same transaction.
    fn register_instance(
        &self,
        session: &dyn Session,
        instance: &ConnectionOptions,
        label: Option<&str>,
        group_name: Option<&str>,
    ) -> Result<()> {
        let uuid = group::get_server_uuid(session)?;
        let endpoint = instance.address();
        let xport = session
            .global_variable(sql::VAR_MYSQLX_PORT)?
            .as_i64()
            .unwrap_or_else(|| i64::from(instance.port_or_default()) * 10);
        let grendpoint = get_server_variable(session, sql::VAR_LOCAL_ADDRESS)?.unwrap_or_default();

        let tx = self.metadata.begin()?;
        let host_id = tx.insert_host(&instance.host, "", "")?;
        tx.insert_instance(InstanceDefinition {
            id: 0,
            uuid,
            endpoint: endpoint.clone(),
            xendpoint: format!("{}:{}", instance.host, xport),
            grendpoint,
            role: InstanceDefinition::ROLE_HA.to_string(),
            label: label.unwrap_or(endpoint.as_str()).to_string(),
            host_id,
            replicaset_id: self.id,
        })?;
        if let Some(group_name) = group_name {
            tx.set_replicaset_group_name(self.id, group_name)?;
        }
        tx.commit()?;
        debug!("Registered '{}' in ReplicaSet '{}'", endpoint, self.name);
        Ok(())
    }

    /// Puts a row deleted by a failed removal back. Failures are logged only.
    fn restore_instance(&self, definition: &InstanceDefinition, host: Option<&HostRow>) {
        let restored = self.metadata.begin().and_then(|tx| {
            let mut definition = definition.clone();
            if let Some(host) = host {
                definition.host_id =
                    tx.insert_host(&host.host_name, &host.ip_address, &host.location)?;
            }
            tx.insert_instance(definition)?;
            tx.commit()
        });
        match restored {
            Ok(()) => info!(
                "Restored the Metadata of instance '{}' after the failed removal",
                definition.endpoint
            ),
            Err(err) => error!(
                "Could not restore the Metadata of instance '{}': {}",
                definition.endpoint, err
            ),
        }
    }

    /// Executed GTID set of the member the group writes through.
    pub(crate) fn group_gtid_executed(&self) -> Result<GtidSet> {
        let md_session = self.metadata.session()?;
        let peer = self.get_peer_instance()?;
        if peer == md_session.connection_options().address() {
            return group::get_gtid_executed(md_session.as_ref());
        }
        let options = Self::endpoint_options(&peer, md_session.connection_options())?;
        let session = open_scoped_session(self.context.connector.as_ref(), &options, "primary")?;
        group::get_gtid_executed(session.session())
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Adds an instance, bootstrapping the group when the replicaset has
    /// no instance yet.
    pub fn add_instance(
        &self,
        instance: &ConnectionOptions,
        options: &AddInstanceOptions,
    ) -> Result<String> {
        let seed_group_name = if self.metadata.is_replicaset_empty(self.id)? {
            Some(group::generate_group_name())
        } else {
            None
        };
        self.add_instance_with(instance, options, seed_group_name.as_deref())
    }

    /// Bootstraps the group on `instance` under `group_name`.
    pub(crate) fn add_seed_instance(
        &self,
        instance: &ConnectionOptions,
        options: &AddInstanceOptions,
        group_name: &str,
    ) -> Result<String> {
        self.add_instance_with(instance, options, Some(group_name))
    }

    fn add_instance_with(
        &self,
        instance: &ConnectionOptions,
        options: &AddInstanceOptions,
        seed_group_name: Option<&str>,
    ) -> Result<String> {
        let seed = seed_group_name.is_some();
        let instance_def = self.target_options(instance, options.password.as_deref())?;
        let address = instance_def.address();

        let target = open_scoped_session(self.context.connector.as_ref(), &instance_def, "target")?;
        let session = target.session();

        validations::validate_instance_address(
            session,
            &instance_def.host,
            &self.context.config.sandbox_datadir_suffix,
        )?;
        validations::validate_replication_filters(session)?;

        let instance_type = group::get_gr_instance_type(session)?;
        if instance_type != GrInstanceType::Standalone {
            let uuid = group::get_server_uuid(session)?;
            let md_session = self.metadata.session()?;
            if group::is_server_on_replication_group(md_session.as_ref(), &uuid)? {
                if self.metadata.is_instance_on_replicaset(self.id, &address)? {
                    return Err(AdminError::runtime(format!(
                        "The instance '{}' is already part of this InnoDB cluster",
                        address
                    )));
                }
                info!(
                    "The instance '{}' is already a member of the group, registering it in the Metadata",
                    address
                );
                self.register_instance(session, &instance_def, options.label.as_deref(), None)?;
                return Ok(format!(
                    "The instance '{}' was successfully added to the MySQL Cluster.",
                    address
                ));
            }
            let owner = match instance_type {
                GrInstanceType::InnoDbCluster => "InnoDB cluster",
                _ => "Replication Group",
            };
            return Err(AdminError::runtime(format!(
                "The instance '{}' is already part of another {}",
                address, owner
            )));
        }

        let ssl_mode = if seed {
            validations::resolve_cluster_ssl_mode(session, options.member_ssl_mode)?
        } else {
            let md_session = self.metadata.session()?;
            validations::resolve_instance_ssl_mode(session, md_session.as_ref(), options.member_ssl_mode)?
        };
        if ssl_mode != options.member_ssl_mode {
            warn!(
                "SSL mode used to configure the {}: '{}'",
                if seed { "cluster" } else { "instance" },
                ssl_mode
            );
        }

        let (replication_user, replication_password) = self
            .metadata
            .create_repl_account(&self.context.config.replication_user_prefix)?;
        let credentials = ProvisionCredentials {
            super_user_password: instance_def.password.clone().unwrap_or_default(),
            replication_user,
            replication_password,
        };
        let settings = GroupSettings {
            multi_primary: !self.topology_type.is_single_primary(),
            ssl_mode,
            ip_whitelist: options.ip_whitelist.clone(),
            group_name: seed_group_name.map(str::to_string),
            local_address: options.local_address.as_deref().map(|value| {
                validations::resolve_local_address(
                    value,
                    &instance_def.host,
                    instance_def.port_or_default(),
                )
            }),
            group_seeds: options.group_seeds.clone(),
            exit_state_action: options.exit_state_action,
            member_weight: options.member_weight.and_then(|w| u8::try_from(w).ok()),
        };

        let provisioned = if seed {
            self.context
                .gateway
                .start_group(&instance_def, &credentials, &settings)
        } else {
            let peer_address = self.get_peer_instance()?;
            let md_session = self.metadata.session()?;
            let mut peer = ConnectionOptions::from_uri(&peer_address)?;
            peer.user = instance_def.user.clone();
            peer.password = instance_def.password.clone();
            peer.ssl = md_session.connection_options().ssl.clone();
            self.context
                .gateway
                .join_group(&instance_def, &peer, &credentials, &settings, None, false)
        };
        provisioned.and_then(|outcome| outcome.into_result(&address))?;

        let live_group_name = if seed {
            group::get_group_name(session)?.or_else(|| seed_group_name.map(str::to_string))
        } else {
            None
        };
        self.register_instance(
            session,
            &instance_def,
            options.label.as_deref(),
            live_group_name.as_deref(),
        )?;

        Ok(if seed {
            format!(
                "The instance '{}' was successfully added as seeding instance to the MySQL Cluster.",
                address
            )
        } else {
            format!(
                "The instance '{}' was successfully added to the MySQL Cluster.",
                address
            )
        })
    }

    /// Registers an instance that already runs as a member of this group.
    pub fn add_instance_metadata(
        &self,
        instance: &ConnectionOptions,
        label: Option<&str>,
    ) -> Result<()> {
        let options = self.target_options(instance, None)?;
        let target = open_scoped_session(self.context.connector.as_ref(), &options, "target")?;
        self.register_instance(target.session(), &options, label, None)
    }

    /// Registers every instance of a rescan's newly discovered list.
    pub fn add_instances_metadata(&self, instances: &[NewInstance]) -> Result<()> {
        for instance in instances {
            info!("Adding instance '{}' to the Metadata", instance.host);
            let options = ConnectionOptions::from_uri(&instance.host)?;
            self.add_instance_metadata(&options, instance.name.as_deref())?;
        }
        Ok(())
    }

    /// Brings a registered instance that left the group back in.
    pub fn rejoin_instance(
        &self,
        instance: &ConnectionOptions,
        options: &RejoinInstanceOptions,
    ) -> Result<String> {
        if self.metadata.is_replicaset_empty(self.id)? {
            return Err(AdminError::logic("ReplicaSet not initialized."));
        }

        let instance_def = self.target_options(instance, options.password.as_deref())?;
        let address = instance_def.address();
        self.ensure_member(&address)?;

        let target = open_scoped_session(self.context.connector.as_ref(), &instance_def, "target")?;
        let session = target.session();

        let registered = self.group_name()?;
        if !group::validate_replicaset_group_name(session, &registered)? {
            return Err(AdminError::runtime(format!(
                "The instance '{}' may belong to a different ReplicaSet as the one registered in \
                 the Metadata since the value of 'group_replication_group_name' does not match \
                 the one registered in the ReplicaSet's Metadata: possible split-brain scenario. \
                 Please remove the instance from the cluster.",
                address
            )));
        }

        let md_session = self.metadata.session()?;
        let plugin_active = group::get_plugin_status(md_session.as_ref())?
            .is_some_and(|s| s.eq_ignore_ascii_case("ACTIVE"));
        if !plugin_active {
            return Err(AdminError::runtime(
                "Cannot rejoin instance. The seed instance doesn't have group-replication active.",
            ));
        }
        let seed_address = require_server_variable(md_session.as_ref(), sql::VAR_LOCAL_ADDRESS)?;

        validations::validate_replication_filters(session)?;
        let ssl_mode = validations::resolve_instance_ssl_mode(
            session,
            md_session.as_ref(),
            options.member_ssl_mode,
        )?;
        if ssl_mode != options.member_ssl_mode {
            warn!("SSL mode used to configure the instance: '{}'", ssl_mode);
        }

        session.execute(sql::STOP_GROUP_REPLICATION)?;

        let credentials = ProvisionCredentials {
            super_user_password: instance_def.password.clone().unwrap_or_default(),
            ..Default::default()
        };
        let settings = GroupSettings {
            multi_primary: !self.topology_type.is_single_primary(),
            ssl_mode,
            ip_whitelist: options.ip_whitelist.clone(),
            ..Default::default()
        };
        info!("Rejoining instance '{}' to the group through '{}'", address, seed_address);
        self.context
            .gateway
            .join_group(
                &instance_def,
                md_session.connection_options(),
                &credentials,
                &settings,
                Some(&seed_address),
                true,
            )
            .and_then(|outcome| outcome.into_result(&address))?;

        if let Some(label) = &options.label {
            let tx = self.metadata.begin()?;
            tx.set_instance_label(&address, label)?;
            tx.commit()?;
        }

        Ok(format!(
            "The instance '{}' was successfully rejoined on the cluster.",
            address
        ))
    }

    /// Rejoins each listed address, logging failures. Returns the
    /// addresses that rejoined.
    pub fn rejoin_instances(&self, addresses: &[String], password: Option<&str>) -> Vec<String> {
        let options = RejoinInstanceOptions {
            password: password.map(str::to_string),
            ..Default::default()
        };
        let mut rejoined = Vec::new();
        for address in addresses {
            let result = ConnectionOptions::from_uri(address)
                .and_then(|instance| self.rejoin_instance(&instance, &options));
            match result {
                Ok(_) => rejoined.push(address.clone()),
                Err(err) => warn!("Failed to rejoin instance '{}': {}", address, err),
            }
        }
        rejoined
    }

    /// Removes an instance from the catalog, then from the group.
    ///
    /// The catalog delete is committed first. If the instance then fails to
    /// leave, the row is put back unless `force` is set.
    pub fn remove_instance(
        &self,
        instance: &ConnectionOptions,
        options: &RemoveInstanceOptions,
    ) -> Result<String> {
        let instance_def = self.target_options(instance, options.password.as_deref())?;
        let address = instance_def.address();
        self.ensure_member(&address)?;

        if self.metadata.get_replicaset_count(self.id)? == 1 {
            return Err(AdminError::logic(format!(
                "The instance '{}' cannot be removed because it is the only member of the \
                 Cluster. Please use <Cluster>.dissolve() instead to remove the last instance \
                 and dissolve the Cluster.",
                address
            )));
        }

        let removed = self.metadata.get_instance(&address)?;
        let host = self.metadata.get_host(removed.host_id)?;
        let tx = self.metadata.begin()?;
        tx.remove_instance(&address)?;
        tx.commit()?;

        let left = self
            .context
            .gateway
            .leave_group(&instance_def)
            .and_then(|outcome| outcome.into_result(&address));

        if let Err(err) = left {
            if options.force {
                warn!(
                    "The instance '{}' was removed from the Metadata but could not leave the \
                     group: {}",
                    address, err
                );
            } else {
                self.restore_instance(&removed, host.as_ref());
                let state = match self
                    .metadata
                    .session()
                    .and_then(|s| group::get_instance_state(s.as_ref(), &removed.uuid))
                {
                    Ok(state) => state,
                    Err(state_err) => {
                        warn!(
                            "Could not read the group state of instance '{}': {}",
                            address, state_err
                        );
                        return Err(err);
                    }
                };
                if matches!(
                    state,
                    ManagedInstanceState::Unreachable | ManagedInstanceState::Missing
                ) {
                    return Err(AdminError::runtime(format!(
                        "The instance '{}' cannot be removed because it is on a '{}' state. \
                         Please bring the instance back ONLINE and try to remove it again. If \
                         the instance is permanently not reachable, then please use \
                         <Cluster>.removeInstance() with the force option set to true to proceed \
                         with the operation and only remove the instance from the Cluster \
                         Metadata.",
                        address,
                        state.describe()
                    )));
                }
                return Err(err);
            }
        }

        Ok(format!(
            "The instance '{}' was successfully removed from the cluster.",
            address
        ))
    }

    /// Deletes the listed instances from the catalog only.
    pub fn remove_instances(&self, addresses: &[String]) -> Result<()> {
        for address in addresses {
            self.ensure_member(address)?;
        }
        let tx = self.metadata.begin()?;
        for address in addresses {
            tx.remove_instance(address)?;
            info!("Removed instance '{}' from the Metadata", address);
        }
        tx.commit()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drops the replicaset from the catalog and makes every instance leave
    /// the group.
    pub fn dissolve(&self, force: bool) -> Result<()> {
        if !force && self.metadata.is_replicaset_active(self.id)? {
            return Err(AdminError::runtime(
                "Cannot dissolve the ReplicaSet: the ReplicaSet is active.",
            ));
        }

        let tx = self.metadata.begin()?;
        let instances = tx.drop_replicaset(self.id)?;
        tx.commit()?;

        self.remove_instances_from_gr(&instances, force)
    }

    /// Marks the replicaset inactive and makes every instance leave the
    /// group, keeping the catalog rows.
    pub fn disable(&self) -> Result<()> {
        let instances = self.metadata.get_replicaset_instances(self.id)?;
        let tx = self.metadata.begin()?;
        tx.disable_replicaset(self.id)?;
        tx.commit()?;

        self.remove_instances_from_gr(&instances, false)
    }

    /// Makes `instances` leave the group, the primary last. Without `force`
    /// the first failure aborts; with it failures are logged and skipped.
    pub fn remove_instances_from_gr(
        &self,
        instances: &[InstanceDefinition],
        force: bool,
    ) -> Result<()> {
        let md_session = self.metadata.session()?;
        let primary_uuid = group::get_primary_uuid(md_session.as_ref())?;
        let credentials = md_session.connection_options().clone();

        for instance in leave_order(instances, primary_uuid.as_deref()) {
            let options = Self::endpoint_options(&instance.endpoint, &credentials)?;
            let left = self
                .context
                .gateway
                .leave_group(&options)
                .and_then(|outcome| outcome.into_result(&instance.endpoint));
            match left {
                Ok(()) => info!("Instance '{}' left the group", instance.endpoint),
                Err(err) if force => warn!(
                    "Ignoring failure of instance '{}' to leave the group: {}",
                    instance.endpoint, err
                ),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Restores quorum using the partition `instance` belongs to by forcing
    /// the membership to the online members that instance can see.
    pub fn force_quorum_using_partition_of(
        &self,
        instance: &ConnectionOptions,
        password: Option<&str>,
    ) -> Result<String> {
        let instance_def = self.target_options(instance, password)?;
        let address = instance_def.address();
        self.ensure_member(&address)?;

        let target = open_scoped_session(self.context.connector.as_ref(), &instance_def, "target")?;
        let session = target.session();

        let registered = self.group_name()?;
        if !group::validate_replicaset_group_name(session, &registered)? {
            return Err(AdminError::runtime(format!(
                "The instance '{}' cannot be used to restore the cluster as it may belong to a \
                 different ReplicaSet as the one registered in the Metadata since the value of \
                 'group_replication_group_name' does not match the one registered in the \
                 ReplicaSet's Metadata: possible split-brain scenario.",
                address
            )));
        }

        if group::get_gr_instance_type(session)? == GrInstanceType::Standalone {
            return Err(AdminError::runtime(format!(
                "The instance '{}' cannot be used to restore the cluster as it is not an active \
                 member of replication group.",
                address
            )));
        }

        let uuid = group::get_server_uuid(session)?;
        let state = group::get_instance_state(session, &uuid)?;
        if !state.is_online() {
            return Err(AdminError::runtime(format!(
                "The instance '{}' cannot be used to restore the cluster as it is on a {} state, \
                 and should be ONLINE",
                address,
                state.describe()
            )));
        }

        let online: Vec<_> = self
            .metadata
            .get_replicaset_instances_seen_by(self.id, session)?
            .into_iter()
            .filter(|i| i.is_online())
            .collect();
        if online.is_empty() {
            return Err(AdminError::logic(
                "No online instances are visible from the given one.",
            ));
        }

        let mut group_addresses = Vec::with_capacity(online.len());
        for instance in &online {
            let local_address = if instance.definition.uuid == uuid {
                require_server_variable(session, sql::VAR_LOCAL_ADDRESS)?
            } else {
                let options = Self::endpoint_options(&instance.definition.endpoint, &instance_def)?;
                let peer = open_scoped_session(self.context.connector.as_ref(), &options, "online")?;
                require_server_variable(peer.session(), sql::VAR_LOCAL_ADDRESS)?
            };
            group_addresses.push(local_address);
        }

        let members = group_addresses.join(",");
        warn!(
            "Restoring ReplicaSet '{}' from loss of quorum, by using the partition composed of [{}]",
            self.name, members
        );
        session.set_global_variable(sql::VAR_FORCE_MEMBERS, &Value::from(members.as_str()))?;

        Ok(format!(
            "The InnoDB cluster was successfully restored using the partition from the instance \
             '{}'.",
            address
        ))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Compares the executed transactions of a candidate with the group's.
    pub fn retrieve_instance_state(
        &self,
        instance: &ConnectionOptions,
        password: Option<&str>,
    ) -> Result<InstanceStateReport> {
        let instance_def = self.target_options(instance, password)?;
        let address = instance_def.address();

        let target = open_scoped_session(self.context.connector.as_ref(), &instance_def, "target")?;
        let candidate = group::get_gtid_executed(target.session())?;
        let group_set = self.group_gtid_executed()?;

        let reason = GtidConsistency::classify(&candidate, &group_set);
        info!(
            "The instance '{}' is {}: {}",
            address,
            if reason.is_ok() { "valid for the cluster" } else { "invalid for the cluster" },
            reason.reason()
        );
        Ok(InstanceStateReport::from(reason))
    }

    /// Compares the catalog with the live membership. Report only.
    pub fn rescan(&self) -> Result<RescanReport> {
        let md_session = self.metadata.session()?;
        let members = group::get_group_members(md_session.as_ref())?;
        let instances = self.metadata.get_replicaset_instances(self.id)?;

        let newly_discovered_instances = members
            .iter()
            .filter(|m| !instances.iter().any(|i| i.uuid == m.uuid))
            .map(|m| NewInstance {
                member_id: m.uuid.clone(),
                name: None,
                host: m.address(),
            })
            .collect();

        let mut unavailable_instances = Vec::new();
        let mut matched_instances = Vec::new();
        for instance in instances {
            let active = members.iter().any(|m| {
                m.uuid == instance.uuid
                    && matches!(m.state, MemberState::Online | MemberState::Recovering)
            });
            if active {
                matched_instances.push(instance.endpoint);
            } else {
                unavailable_instances.push(UnavailableInstance {
                    member_id: instance.uuid,
                    label: instance.label,
                    host: instance.endpoint,
                });
            }
        }

        Ok(RescanReport {
            name: self.name.clone(),
            newly_discovered_instances,
            unavailable_instances,
            matched_instances,
        })
    }

    /// Registers every member of the live group the catalog does not know.
    /// Returns the addresses registered.
    pub fn adopt_from_gr(&self) -> Result<Vec<String>> {
        let report = self.rescan()?;
        self.add_instances_metadata(&report.newly_discovered_instances)?;
        Ok(report
            .newly_discovered_instances
            .into_iter()
            .map(|i| i.host)
            .collect())
    }

    /// Fails when the live group runs a different topology than the one
    /// registered.
    pub fn verify_topology_type_change(&self) -> Result<()> {
        let md_session = self.metadata.session()?;
        let live = group::get_topology_type(md_session.as_ref())?;
        if live != self.topology_type {
            return Err(AdminError::runtime(format!(
                "The InnoDB Cluster topology type ({}) does not match the current Group \
                 Replication configuration ({}). Please use <cluster>.rescan() or change the \
                 Group Replication configuration accordingly.",
                self.topology_type, live
            )));
        }
        Ok(())
    }

    /// Endpoint of the member new instances join through: the primary when
    /// there is one, otherwise the first online instance.
    pub fn get_peer_instance(&self) -> Result<String> {
        let md_session = self.metadata.session()?;
        let primary_uuid = group::get_primary_uuid(md_session.as_ref())?;
        let online = self.metadata.get_replicaset_online_instances(self.id)?;

        let primary = primary_uuid.and_then(|uuid| online.iter().find(|i| i.uuid == uuid));
        primary
            .or_else(|| online.first())
            .map(|i| i.endpoint.clone())
            .ok_or_else(|| {
                AdminError::runtime(format!(
                    "Unable to find an ONLINE instance of the ReplicaSet '{}'",
                    self.name
                ))
            })
    }

    pub fn get_status(&self, state: &ReplicationGroupState) -> Result<ReplicaSetStatusReport> {
        self.verify_topology_type_change()?;

        let md_session = self.metadata.session()?;
        let source = md_session.connection_options().address();
        let single_primary = self.topology_type.is_single_primary();
        let primary_uuid = if single_primary {
            group::get_primary_uuid(md_session.as_ref())?
        } else {
            None
        };
        let ssl = get_server_variable(md_session.as_ref(), sql::VAR_GR_SSL_MODE)?.unwrap_or_default();

        let instances = self.metadata.get_replicaset_instances_with_state(self.id)?;
        let online = instances.iter().filter(|i| i.is_online()).count();
        let health = GroupHealth::new(online, instances.len());

        let mut primary = None;
        let mut topology = BTreeMap::new();
        for instance in instances {
            let definition = instance.definition;
            let is_primary = primary_uuid.as_deref() == Some(definition.uuid.as_str());
            if is_primary {
                primary = Some(definition.endpoint.clone());
            }
            let read_write = !single_primary || is_primary;
            topology.insert(
                definition.label.clone(),
                InstanceStatus {
                    address: definition.endpoint,
                    status: instance
                        .state
                        .unwrap_or(MemberState::Missing)
                        .as_str()
                        .to_string(),
                    role: definition.role,
                    mode: if read_write { "R/W" } else { "R/O" }.to_string(),
                    read_replicas: BTreeMap::new(),
                },
            );
        }

        Ok(ReplicaSetStatusReport {
            name: self.name.clone(),
            status: health.status(state.quorum),
            status_text: health.status_text(state.quorum, &source),
            ssl,
            primary,
            topology,
        })
    }

    pub fn get_description(&self) -> Result<ReplicaSetDescription> {
        let instances = self.metadata.get_replicaset_instances(self.id)?;
        Ok(ReplicaSetDescription {
            name: self.name.clone(),
            instances: instances
                .into_iter()
                .map(|i| InstanceDescription {
                    label: i.label,
                    host: i.endpoint,
                    role: i.role,
                })
                .collect(),
        })
    }
}

impl std::fmt::Debug for ReplicaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("topology_type", &self.topology_type)
            .field("cluster_name", &self.cluster_name)
            .finish()
    }
}

/// Non-primary instances first, in catalog order, then the primary.
fn leave_order<'a>(
    instances: &'a [InstanceDefinition],
    primary_uuid: Option<&str>,
) -> Vec<&'a InstanceDefinition> {
    let (primary, mut ordered): (Vec<_>, Vec<_>) = instances
        .iter()
        .partition(|i| Some(i.uuid.as_str()) == primary_uuid);
    ordered.extend(primary);
    ordered
}
