//! Gate run before every cluster operation.
//!
//! Each operation accepts the source instance in a set of states and may
//! require the group to report quorum.

use crate::connection::Session;
use crate::core::{AdminError, Result};
use crate::group::{self, GrInstanceType, ManagedInstanceState, ReplicationGroupState};
use std::fmt;

/// Public operations of a cluster handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddInstance,
    RejoinInstance,
    RemoveInstance,
    Describe,
    Status,
    Dissolve,
    Disable,
    Rescan,
    ForceQuorumUsingPartitionOf,
    CheckInstanceState,
    AdoptFromGr,
    SyncTransactions,
    Disconnect,
}

/// What an operation accepts from the source instance.
#[derive(Debug, Clone, Copy)]
struct Requirement {
    quorum: bool,
    states: &'static [ManagedInstanceState],
}

const READ_WRITE: &[ManagedInstanceState] = &[ManagedInstanceState::OnlineRW];

const ONLINE: &[ManagedInstanceState] = &[
    ManagedInstanceState::OnlineRW,
    ManagedInstanceState::OnlineRO,
];

const ANY: &[ManagedInstanceState] = &[
    ManagedInstanceState::OnlineRW,
    ManagedInstanceState::OnlineRO,
    ManagedInstanceState::Recovering,
    ManagedInstanceState::Unreachable,
    ManagedInstanceState::Missing,
    ManagedInstanceState::Offline,
    ManagedInstanceState::Error,
];

impl Operation {
    /// Name as exposed on the cluster object, e.g. `addInstance`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddInstance => "addInstance",
            Self::RejoinInstance => "rejoinInstance",
            Self::RemoveInstance => "removeInstance",
            Self::Describe => "describe",
            Self::Status => "status",
            Self::Dissolve => "dissolve",
            Self::Disable => "disable",
            Self::Rescan => "rescan",
            Self::ForceQuorumUsingPartitionOf => "forceQuorumUsingPartitionOf",
            Self::CheckInstanceState => "checkInstanceState",
            Self::AdoptFromGr => "adoptFromGR",
            Self::SyncTransactions => "syncTransactions",
            Self::Disconnect => "disconnect",
        }
    }

    /// `Cluster.<name>`, the prefix of every error the operation raises.
    pub fn qualified_name(&self) -> String {
        format!("Cluster.{}", self.name())
    }

    fn requirement(&self) -> Requirement {
        match self {
            Self::AddInstance
            | Self::RemoveInstance
            | Self::Dissolve
            | Self::Disable
            | Self::Rescan
            | Self::AdoptFromGr => Requirement {
                quorum: true,
                states: READ_WRITE,
            },
            Self::RejoinInstance | Self::CheckInstanceState | Self::SyncTransactions => Requirement {
                quorum: true,
                states: ONLINE,
            },
            Self::ForceQuorumUsingPartitionOf => Requirement {
                quorum: false,
                states: ONLINE,
            },
            Self::Describe | Self::Status | Self::Disconnect => Requirement {
                quorum: false,
                states: ANY,
            },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Probes the group through `session` and checks it against what
/// `operation` accepts.
pub fn check_preconditions(
    operation: Operation,
    session: &dyn Session,
) -> Result<ReplicationGroupState> {
    let instance_type = group::get_gr_instance_type(session)?;
    if instance_type == GrInstanceType::Standalone {
        return Err(AdminError::runtime(format!(
            "This function is not available through a session to a standalone instance \
             ('{}')",
            session.connection_options().address()
        )));
    }

    let state = group::get_replication_group_state(session, instance_type)?;
    let requirement = operation.requirement();

    if requirement.quorum && !state.has_quorum() {
        return Err(AdminError::runtime(format!(
            "There is no quorum to perform the operation as visible from '{}'",
            session.connection_options().address()
        )));
    }

    if !requirement.states.contains(&state.source_state) {
        let reason = match state.source_state {
            ManagedInstanceState::OnlineRO => "a read only instance".to_string(),
            other => format!("an instance in '{}' state", other.describe()),
        };
        return Err(AdminError::runtime(format!(
            "This function is not available through a session to {} ('{}')",
            reason,
            session.connection_options().address()
        )));
    }

    Ok(state)
}
