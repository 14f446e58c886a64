//! Interface to the external provisioning tool that starts, joins and
//! removes instances from a replication group.

use crate::connection::ConnectionOptions;
use crate::core::{AdminError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `group_replication_ssl_mode` requested for a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberSslMode {
    /// REQUIRED when the instance supports SSL, DISABLED otherwise
    #[default]
    Auto,
    Disabled,
    Required,
}

impl MemberSslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Disabled => "DISABLED",
            Self::Required => "REQUIRED",
        }
    }

    /// Mode from a `group_replication_ssl_mode` value. Every mode that
    /// encrypts group traffic counts as REQUIRED.
    pub fn from_server_value(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DISABLED" | "" => Self::Disabled,
            _ => Self::Required,
        }
    }
}

impl fmt::Display for MemberSslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a member does when it leaves the group involuntarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitStateAction {
    AbortServer,
    ReadOnly,
}

impl ExitStateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbortServer => "ABORT_SERVER",
            Self::ReadOnly => "READ_ONLY",
        }
    }
}

/// Group settings handed to `start_group` / `join_group`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSettings {
    pub multi_primary: bool,
    pub ssl_mode: MemberSslMode,
    pub ip_whitelist: Option<String>,
    pub group_name: Option<String>,
    pub local_address: Option<String>,
    pub group_seeds: Option<String>,
    pub exit_state_action: Option<ExitStateAction>,
    pub member_weight: Option<u8>,
}

/// Accounts used by the provisioning tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionCredentials {
    /// Password of the administrative account on the target
    pub super_user_password: String,
    /// Account the group's recovery channel replicates with; empty keeps
    /// the one already configured
    pub replication_user: String,
    pub replication_password: String,
}

/// Result of one provisioning call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub exit_code: i32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProvisionOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32, errors: Vec<String>) -> Self {
        Self {
            exit_code,
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turns a non-zero exit into a runtime error naming `instance` and
    /// carrying every reported error. Warnings of a successful call are logged.
    pub fn into_result(self, instance: &str) -> Result<()> {
        if self.is_success() {
            for warning in &self.warnings {
                warn!("{}: {}", instance, warning);
            }
            return Ok(());
        }
        let detail = if self.errors.is_empty() {
            format!("provisioning failed with exit code {}", self.exit_code)
        } else {
            self.errors.join("\n")
        };
        Err(AdminError::runtime(format!("{}: {}", instance, detail)))
    }
}

/// Provisioning tool driving the replication plugin on an instance.
pub trait ProvisioningGateway: Send + Sync {
    /// Bootstraps a new group with `instance` as its seed.
    fn start_group(
        &self,
        instance: &ConnectionOptions,
        credentials: &ProvisionCredentials,
        settings: &GroupSettings,
    ) -> Result<ProvisionOutcome>;

    /// Joins `instance` to the group `peer` belongs to. `seed_address` is
    /// the peer's group communication address when rejoining.
    fn join_group(
        &self,
        instance: &ConnectionOptions,
        peer: &ConnectionOptions,
        credentials: &ProvisionCredentials,
        settings: &GroupSettings,
        seed_address: Option<&str>,
        is_rejoin: bool,
    ) -> Result<ProvisionOutcome>;

    /// Makes `instance` leave its group.
    fn leave_group(&self, instance: &ConnectionOptions) -> Result<ProvisionOutcome>;
}
