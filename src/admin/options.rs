//! Option structs accepted by the cluster operations.
//!
//! Each struct deserializes from a JSON object using the operation's
//! camelCase keys; unknown keys and ill-typed values are argument errors.
//! `validate` runs once at the boundary, before any side effect.

use super::validations::{validate_ip_whitelist, validate_label, validate_local_address};
use crate::core::{AdminError, Result};
use crate::provision::{ExitStateAction, MemberSslMode};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Common behavior of the per-operation option structs.
pub trait OperationOptions: DeserializeOwned + Default {
    /// Checks values and normalizes them in place.
    fn validate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Parses and validates options given as a JSON object.
    fn from_json(json: &str) -> Result<Self> {
        let mut options: Self = serde_json::from_str(json)
            .map_err(|e| AdminError::argument(format!("Invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }
}

fn require_non_empty(name: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(AdminError::argument(format!(
            "Invalid value for {}, string value cannot be empty.",
            name
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct AddInstanceOptions {
    /// Identifier of the instance; defaults to its address
    pub label: Option<String>,
    /// Overrides the password of the instance definition
    pub password: Option<String>,
    pub member_ssl_mode: MemberSslMode,
    /// Comma separated hosts allowed to connect for group replication
    pub ip_whitelist: Option<String>,
    /// `host:port`, `host:`, `:port` or a bare port
    pub local_address: Option<String>,
    /// Comma separated peer group addresses
    pub group_seeds: Option<String>,
    pub exit_state_action: Option<ExitStateAction>,
    /// Election weight in percent; clamped to 0-100
    pub member_weight: Option<i64>,
}

impl OperationOptions for AddInstanceOptions {
    fn validate(&mut self) -> Result<()> {
        if let Some(label) = &self.label {
            validate_label(label)?;
        }
        if let Some(list) = &self.ip_whitelist {
            validate_ip_whitelist(list)?;
        }
        require_non_empty("localAddress", &self.local_address)?;
        if let Some(address) = &self.local_address {
            validate_local_address(address)?;
        }
        require_non_empty("groupSeeds", &self.group_seeds)?;
        if let Some(weight) = self.member_weight {
            let clamped = weight.clamp(0, 100);
            if clamped != weight {
                warn!(
                    "The memberWeight ({}) is outside the range [0, 100], using {}",
                    weight, clamped
                );
                self.member_weight = Some(clamped);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RejoinInstanceOptions {
    pub label: Option<String>,
    pub password: Option<String>,
    pub member_ssl_mode: MemberSslMode,
    pub ip_whitelist: Option<String>,
}

impl OperationOptions for RejoinInstanceOptions {
    fn validate(&mut self) -> Result<()> {
        if let Some(label) = &self.label {
            validate_label(label)?;
        }
        if let Some(list) = &self.ip_whitelist {
            validate_ip_whitelist(list)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RemoveInstanceOptions {
    pub password: Option<String>,
    /// Keep the instance removed from the catalog even if it cannot leave
    /// the group
    pub force: bool,
    /// Ask for confirmation; defaults to the `wizards` setting
    pub interactive: Option<bool>,
}

impl OperationOptions for RemoveInstanceOptions {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DissolveOptions {
    /// Dissolve an active replicaset and ignore members that fail to leave
    pub force: bool,
    pub interactive: Option<bool>,
}

impl OperationOptions for DissolveOptions {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ForceQuorumOptions {
    pub password: Option<String>,
}

impl OperationOptions for ForceQuorumOptions {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CheckStateOptions {
    pub password: Option<String>,
}

impl OperationOptions for CheckStateOptions {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CreateClusterOptions {
    /// Bootstrap a multi-primary group; requires `force`
    pub multi_primary: bool,
    /// Register an already running group instead of bootstrapping one
    #[serde(rename = "adoptFromGR")]
    pub adopt_from_gr: bool,
    pub force: bool,
    pub description: Option<String>,
    pub member_ssl_mode: MemberSslMode,
    pub ip_whitelist: Option<String>,
    pub local_address: Option<String>,
    pub group_seeds: Option<String>,
    pub exit_state_action: Option<ExitStateAction>,
    pub member_weight: Option<i64>,
}

impl CreateClusterOptions {
    /// Options the seed instance is added with.
    pub fn seed_options(&self) -> AddInstanceOptions {
        AddInstanceOptions {
            label: None,
            password: None,
            member_ssl_mode: self.member_ssl_mode,
            ip_whitelist: self.ip_whitelist.clone(),
            local_address: self.local_address.clone(),
            group_seeds: self.group_seeds.clone(),
            exit_state_action: self.exit_state_action,
            member_weight: self.member_weight,
        }
    }
}

impl OperationOptions for CreateClusterOptions {
    fn validate(&mut self) -> Result<()> {
        if self.adopt_from_gr {
            if self.multi_primary {
                return Err(AdminError::argument(
                    "Cannot use multiPrimary option if adoptFromGR is set to true. Using \
                     adoptFromGR mode will adopt the topology of the existing group.",
                ));
            }
            if self.member_ssl_mode != MemberSslMode::Auto {
                return Err(AdminError::argument(
                    "Cannot use memberSslMode option if adoptFromGR is set to true.",
                ));
            }
            if self.ip_whitelist.is_some() {
                return Err(AdminError::argument(
                    "Cannot use ipWhitelist option if adoptFromGR is set to true.",
                ));
            }
        }
        if self.multi_primary && !self.force {
            return Err(AdminError::argument(
                "Use of multiPrimary mode is not recommended unless you understand the \
                 limitations. Please use the 'force' option if you understand and accept them.",
            ));
        }
        let mut seed = self.seed_options();
        seed.validate()?;
        self.member_weight = seed.member_weight;
        Ok(())
    }
}
