use crate::connection::DEFAULT_PORT;
use crate::core::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by every admin operation.
///
/// Built with the builder methods or loaded from a JSON document whose keys
/// match the field names; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Port used when an instance address omits one
    pub default_port: u16,

    /// Account used when an instance definition omits the user
    pub default_user: String,

    /// Maximum wait for an instance to apply the group's transactions,
    /// whole seconds in JSON
    #[serde(with = "duration_secs")]
    pub gtid_wait_timeout: Duration,

    /// Pause between two GTID catch-up checks, milliseconds in JSON
    #[serde(with = "duration_millis")]
    pub gtid_poll_interval: Duration,

    /// Datadir suffix that marks a local sandbox instance
    pub sandbox_datadir_suffix: String,

    /// Prefix of generated replication accounts
    pub replication_user_prefix: String,

    /// Default for the `interactive` option of dangerous operations
    pub wizards: bool,
}

impl AdminConfig {
    pub fn new() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            default_user: "root".to_string(),
            gtid_wait_timeout: Duration::from_secs(60),
            gtid_poll_interval: Duration::from_millis(500),
            sandbox_datadir_suffix: "sandboxdata".to_string(),
            replication_user_prefix: "mysql_innodb_cluster_r".to_string(),
            wizards: false,
        }
    }

    /// Set the default port
    pub fn default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Set the default user
    pub fn default_user(mut self, user: &str) -> Self {
        self.default_user = user.to_string();
        self
    }

    /// Set the GTID catch-up timeout
    pub fn gtid_wait_timeout(mut self, timeout: Duration) -> Self {
        self.gtid_wait_timeout = timeout;
        self
    }

    /// Set the GTID catch-up poll interval
    pub fn gtid_poll_interval(mut self, interval: Duration) -> Self {
        self.gtid_poll_interval = interval;
        self
    }

    /// Set the sandbox datadir suffix
    pub fn sandbox_datadir_suffix(mut self, suffix: &str) -> Self {
        self.sandbox_datadir_suffix = suffix.to_string();
        self
    }

    /// Set the replication account prefix
    pub fn replication_user_prefix(mut self, prefix: &str) -> Self {
        self.replication_user_prefix = prefix.to_string();
        self
    }

    /// Enable or disable interactive confirmations by default
    pub fn wizards(mut self, enabled: bool) -> Self {
        self.wizards = enabled;
        self
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AdminError::argument(format!("Invalid admin configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdminError::argument(format!("Unable to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_port == 0 {
            return Err(AdminError::argument("default_port must be > 0"));
        }
        if self.default_user.is_empty() {
            return Err(AdminError::argument("default_user cannot be empty"));
        }
        if self.gtid_poll_interval.is_zero() {
            return Err(AdminError::argument("gtid_poll_interval must be > 0"));
        }
        if self.replication_user_prefix.is_empty() {
            return Err(AdminError::argument("replication_user_prefix cannot be empty"));
        }
        Ok(())
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
