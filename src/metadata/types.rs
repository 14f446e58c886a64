use crate::core::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group topology as registered in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyType {
    /// One read/write member, the rest read-only
    #[serde(rename = "pm")]
    SinglePrimary,
    /// Every member accepts writes
    #[serde(rename = "mm")]
    MultiPrimary,
}

impl TopologyType {
    pub fn from_multi_primary(multi_primary: bool) -> Self {
        if multi_primary {
            Self::MultiPrimary
        } else {
            Self::SinglePrimary
        }
    }

    pub fn is_single_primary(&self) -> bool {
        matches!(self, Self::SinglePrimary)
    }

    /// Catalog code, `pm` or `mm`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SinglePrimary => "pm",
            Self::MultiPrimary => "mm",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "pm" => Ok(Self::SinglePrimary),
            "mm" => Ok(Self::MultiPrimary),
            other => Err(AdminError::metadata(format!(
                "Unknown topology type '{}' in the Metadata",
                other
            ))),
        }
    }
}

impl fmt::Display for TopologyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePrimary => write!(f, "Single-Primary"),
            Self::MultiPrimary => write!(f, "Multi-Primary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub default_replicaset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetRow {
    pub id: u64,
    pub cluster_id: u64,
    pub name: String,
    pub topology_type: TopologyType,
    /// `group_replication_group_name` of the live group
    pub group_name: String,
    pub active: bool,
    /// Registered from an already running group rather than bootstrapped
    pub adopted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRow {
    pub id: u32,
    pub host_name: String,
    pub ip_address: String,
    pub location: String,
}

/// Catalog row of one instance admitted to a replicaset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDefinition {
    /// Row id, assigned on insert
    #[serde(default)]
    pub id: u64,
    /// `@@server_uuid`
    pub uuid: String,
    /// Classic protocol endpoint, `host:port`
    pub endpoint: String,
    /// X protocol endpoint, `host:xport`
    pub xendpoint: String,
    /// `@@group_replication_local_address`
    pub grendpoint: String,
    pub role: String,
    /// Human identifier, defaults to the endpoint
    pub label: String,
    pub host_id: u32,
    pub replicaset_id: u64,
}

impl InstanceDefinition {
    pub const ROLE_HA: &'static str = "HA";
}
