//! Payloads returned by `status`, `describe`, `rescan` and
//! `checkInstanceState`. All serialize with the camelCase keys operators
//! see.

use crate::group::{GtidConsistency, ReplicaSetStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub address: String,
    /// Member state, `(MISSING)` when the group does not list the instance
    pub status: String,
    pub role: String,
    /// `R/W` or `R/O`
    pub mode: String,
    pub read_replicas: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetStatusReport {
    pub name: String,
    pub status: ReplicaSetStatus,
    pub status_text: String,
    /// `group_replication_ssl_mode` of the group
    pub ssl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Keyed by instance label
    pub topology: BTreeMap<String, InstanceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub cluster_name: String,
    pub default_replica_set: Option<ReplicaSetStatusReport>,
    pub group_information_source_member: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDescription {
    pub label: String,
    pub host: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaSetDescription {
    pub name: String,
    pub instances: Vec<InstanceDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescription {
    pub cluster_name: String,
    pub default_replica_set: Option<ReplicaSetDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Group member without a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewInstance {
    pub member_id: String,
    pub name: Option<String>,
    pub host: String,
}

/// Catalog row without an active member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableInstance {
    pub member_id: String,
    pub label: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescanReport {
    pub name: String,
    pub newly_discovered_instances: Vec<NewInstance>,
    pub unavailable_instances: Vec<UnavailableInstance>,
    /// Addresses registered and active in the group
    #[serde(skip)]
    pub matched_instances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRescanReport {
    pub default_replica_set: RescanReport,
}

/// Whether a candidate's transactions allow it to join safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstanceStateReport {
    /// `ok` or `error`
    pub state: &'static str,
    pub reason: GtidConsistency,
}

impl From<GtidConsistency> for InstanceStateReport {
    fn from(reason: GtidConsistency) -> Self {
        Self {
            state: if reason.is_ok() { "ok" } else { "error" },
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serializes_camel_case() {
        let report = ReplicaSetStatusReport {
            name: "default".into(),
            status: ReplicaSetStatus::OkPartial,
            status_text: "text".into(),
            ssl: "REQUIRED".into(),
            primary: None,
            topology: BTreeMap::new(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], json!("OK_PARTIAL"));
        assert_eq!(value["statusText"], json!("text"));
        assert!(value.get("primary").is_none());
    }

    #[test]
    fn test_instance_state_report() {
        let report = InstanceStateReport::from(GtidConsistency::LostTransactions);
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"state": "error", "reason": "lost_transactions"})
        );
        assert_eq!(InstanceStateReport::from(GtidConsistency::New).state, "ok");
    }
}
