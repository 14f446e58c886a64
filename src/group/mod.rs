//! Read-only probing of the replication group.
//!
//! Everything here only queries an instance: membership, roles, the quorum
//! the group reports about itself and the GTID state. Nothing is changed on
//! the server.

pub mod gtid;
pub mod sql;

pub use gtid::{GtidConsistency, GtidSet};

use crate::connection::{Session, get_server_variable, get_status_variable};
use crate::core::{AdminError, Result};
use crate::metadata::TopologyType;
use log::debug;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Member State
// ============================================================================

/// `MEMBER_STATE` as reported by `replication_group_members`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberState {
    Online,
    Recovering,
    Offline,
    Error,
    Unreachable,
    Missing,
}

impl MemberState {
    pub fn parse(state: &str) -> Result<Self> {
        match state.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(Self::Online),
            "RECOVERING" => Ok(Self::Recovering),
            "OFFLINE" => Ok(Self::Offline),
            "ERROR" => Ok(Self::Error),
            "UNREACHABLE" => Ok(Self::Unreachable),
            "(MISSING)" | "MISSING" => Ok(Self::Missing),
            other => Err(AdminError::runtime(format!(
                "Unsupported member state '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Recovering => "RECOVERING",
            Self::Offline => "OFFLINE",
            Self::Error => "ERROR",
            Self::Unreachable => "UNREACHABLE",
            Self::Missing => "(MISSING)",
        }
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the membership view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub uuid: String,
    pub host: String,
    pub port: u16,
    pub state: MemberState,
}

impl GroupMember {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reads the membership view as seen by `session`.
pub fn get_group_members(session: &dyn Session) -> Result<Vec<GroupMember>> {
    let result = session.execute(sql::GROUP_MEMBERS)?;
    let mut members = Vec::with_capacity(result.row_count());
    for row in 0..result.row_count() {
        let uuid = result.get_text(row, "MEMBER_ID").unwrap_or_default();
        // A server with the plugin loaded but never started lists itself
        // with an empty id.
        if uuid.is_empty() {
            continue;
        }
        let state = match result.get_text(row, "MEMBER_STATE") {
            Some(s) => MemberState::parse(&s)?,
            None => MemberState::Offline,
        };
        let port = result
            .get(row, "MEMBER_PORT")
            .and_then(|v| v.as_i64())
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0);
        members.push(GroupMember {
            uuid,
            host: result.get_text(row, "MEMBER_HOST").unwrap_or_default(),
            port,
            state,
        });
    }
    Ok(members)
}

// ============================================================================
// Managed Instance State
// ============================================================================

/// State of one instance as observed right now. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ManagedInstanceState {
    OnlineRW,
    OnlineRO,
    Recovering,
    Unreachable,
    Missing,
    Offline,
    Error,
}

impl ManagedInstanceState {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::OnlineRW => "Read/Write",
            Self::OnlineRO => "Read Only",
            Self::Recovering => "Recovering",
            Self::Unreachable => "Unreachable",
            Self::Missing => "(Missing)",
            Self::Offline => "Offline",
            Self::Error => "Error",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::OnlineRW | Self::OnlineRO)
    }
}

impl fmt::Display for ManagedInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quorum {
    Quorumful,
    Quorumless,
}

/// Snapshot that gates every mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationGroupState {
    pub source_state: ManagedInstanceState,
    pub quorum: Quorum,
}

impl ReplicationGroupState {
    pub fn has_quorum(&self) -> bool {
        self.quorum == Quorum::Quorumful
    }
}

/// Relation of an instance to replication groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrInstanceType {
    /// Not an active member of any group
    Standalone,
    /// Active member of a group that carries no metadata schema
    GroupReplication,
    /// Active member of a group managed through the metadata catalog
    InnoDbCluster,
}

// ============================================================================
// Probes
// ============================================================================

pub fn get_server_uuid(session: &dyn Session) -> Result<String> {
    crate::connection::require_server_variable(session, sql::VAR_SERVER_UUID)
}

pub fn get_group_name(session: &dyn Session) -> Result<Option<String>> {
    get_server_variable(session, sql::VAR_GROUP_NAME)
}

pub fn is_single_primary_mode(session: &dyn Session) -> Result<bool> {
    Ok(session
        .global_variable(sql::VAR_SINGLE_PRIMARY_MODE)?
        .as_bool())
}

pub fn get_topology_type(session: &dyn Session) -> Result<TopologyType> {
    Ok(TopologyType::from_multi_primary(!is_single_primary_mode(session)?))
}

/// UUID of the primary; `None` in multi-primary mode or while electing.
pub fn get_primary_uuid(session: &dyn Session) -> Result<Option<String>> {
    get_status_variable(session, sql::STATUS_PRIMARY_MEMBER)
}

/// `PLUGIN_STATUS` of group_replication, `None` when not installed.
pub fn get_plugin_status(session: &dyn Session) -> Result<Option<String>> {
    let result = session.execute(sql::PLUGIN_STATUS)?;
    Ok(result.scalar().and_then(|v| v.to_text()))
}

pub fn has_metadata_schema(session: &dyn Session) -> Result<bool> {
    let result = session.execute(sql::METADATA_SCHEMA_EXISTS)?;
    Ok(result.scalar().and_then(|v| v.as_i64()).unwrap_or(0) > 0)
}

/// Whether `uuid` is an active member of the group `session` belongs to.
pub fn is_server_on_replication_group(session: &dyn Session, uuid: &str) -> Result<bool> {
    Ok(get_group_members(session)?
        .iter()
        .any(|m| m.uuid == uuid && m.state != MemberState::Offline))
}

pub fn get_gr_instance_type(session: &dyn Session) -> Result<GrInstanceType> {
    let uuid = get_server_uuid(session)?;
    let active = get_group_members(session)?
        .iter()
        .any(|m| m.uuid == uuid && !matches!(m.state, MemberState::Offline | MemberState::Error));
    if !active {
        return Ok(GrInstanceType::Standalone);
    }
    if has_metadata_schema(session)? {
        Ok(GrInstanceType::InnoDbCluster)
    } else {
        Ok(GrInstanceType::GroupReplication)
    }
}

/// State of the member `uuid` as seen from `session`.
pub fn get_instance_state(session: &dyn Session, uuid: &str) -> Result<ManagedInstanceState> {
    let members = get_group_members(session)?;
    let Some(member) = members.iter().find(|m| m.uuid == uuid) else {
        return Ok(ManagedInstanceState::Missing);
    };
    let state = match member.state {
        MemberState::Online => {
            if !is_single_primary_mode(session)? {
                ManagedInstanceState::OnlineRW
            } else if get_primary_uuid(session)?.as_deref() == Some(uuid) {
                ManagedInstanceState::OnlineRW
            } else {
                ManagedInstanceState::OnlineRO
            }
        }
        MemberState::Recovering => ManagedInstanceState::Recovering,
        MemberState::Unreachable => ManagedInstanceState::Unreachable,
        MemberState::Offline => ManagedInstanceState::Offline,
        MemberState::Error => ManagedInstanceState::Error,
        MemberState::Missing => ManagedInstanceState::Missing,
    };
    Ok(state)
}

/// Quorum as the group reports it to `session`.
pub fn get_reported_quorum(session: &dyn Session) -> Result<Quorum> {
    let result = session.execute(sql::GROUP_QUORUM)?;
    let quorumful = result.scalar().is_some_and(|v| v.as_bool());
    Ok(if quorumful {
        Quorum::Quorumful
    } else {
        Quorum::Quorumless
    })
}

/// State of the queried instance plus the quorum it reports.
pub fn get_replication_group_state(
    session: &dyn Session,
    instance_type: GrInstanceType,
) -> Result<ReplicationGroupState> {
    if instance_type == GrInstanceType::Standalone {
        return Ok(ReplicationGroupState {
            source_state: ManagedInstanceState::Offline,
            quorum: Quorum::Quorumless,
        });
    }
    let uuid = get_server_uuid(session)?;
    let state = ReplicationGroupState {
        source_state: get_instance_state(session, &uuid)?,
        quorum: get_reported_quorum(session)?,
    };
    debug!(
        "Group state from {}: {:?}, {:?}",
        session.connection_options().address(),
        state.source_state,
        state.quorum
    );
    Ok(state)
}

/// Whether the instance's group name equals the registered one.
pub fn validate_replicaset_group_name(session: &dyn Session, registered: &str) -> Result<bool> {
    let group_name = get_group_name(session)?.unwrap_or_default();
    Ok(!group_name.is_empty() && group_name.eq_ignore_ascii_case(registered))
}

pub fn get_gtid_executed(session: &dyn Session) -> Result<GtidSet> {
    let text = get_server_variable(session, sql::VAR_GTID_EXECUTED)?.unwrap_or_default();
    GtidSet::parse(&text)
}

/// Fresh group name for bootstrapping a group.
pub fn generate_group_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Tolerance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplicaSetStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "OK_NO_TOLERANCE")]
    OkNoTolerance,
    #[serde(rename = "OK_PARTIAL")]
    OkPartial,
    #[serde(rename = "NO_QUORUM")]
    NoQuorum,
}

impl ReplicaSetStatus {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::OkNoTolerance => "OK_NO_TOLERANCE",
            Self::OkPartial => "OK_PARTIAL",
            Self::NoQuorum => "NO_QUORUM",
        }
    }
}

impl fmt::Display for ReplicaSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Online/total counts of a replicaset and the tolerance derived from them.
///
/// Quorum is not computed here; it is what the group reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHealth {
    pub online_count: usize,
    pub total_count: usize,
}

impl GroupHealth {
    pub fn new(online_count: usize, total_count: usize) -> Self {
        Self {
            online_count,
            total_count,
        }
    }

    /// Failures the group survives: `(online - 1) / 2`.
    pub fn number_of_failures(&self) -> usize {
        self.online_count.saturating_sub(1) / 2
    }

    pub fn non_active(&self) -> usize {
        self.total_count.saturating_sub(self.online_count)
    }

    pub fn status(&self, quorum: Quorum) -> ReplicaSetStatus {
        if quorum == Quorum::Quorumless {
            ReplicaSetStatus::NoQuorum
        } else if self.number_of_failures() == 0 {
            ReplicaSetStatus::OkNoTolerance
        } else if self.non_active() > 0 {
            ReplicaSetStatus::OkPartial
        } else {
            ReplicaSetStatus::Ok
        }
    }

    /// Human readable status; `source` is the address the view was read from.
    pub fn status_text(&self, quorum: Quorum, source: &str) -> String {
        let mut text = if quorum == Quorum::Quorumless {
            format!(
                "Cluster has no quorum as visible from '{}' and cannot process write transactions.",
                source
            )
        } else {
            match self.number_of_failures() {
                0 => "Cluster is NOT tolerant to any failures.".to_string(),
                1 => "Cluster is ONLINE and can tolerate up to ONE failure.".to_string(),
                n => format!("Cluster is ONLINE and can tolerate up to {} failures.", n),
            }
        };
        match self.non_active() {
            0 => {}
            1 => text.push_str(" 1 member is not active"),
            n => text.push_str(&format!(" {} members are not active", n)),
        }
        text
    }
}
