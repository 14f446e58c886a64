//! Cluster administration: the replicaset orchestrator and the cluster
//! facade in front of it.

pub mod cluster;
pub mod options;
pub mod preconditions;
pub mod prompt;
pub mod replicaset;
pub mod status;
pub mod validations;

pub use cluster::Cluster;
pub use options::{
    AddInstanceOptions, CheckStateOptions, CreateClusterOptions, DissolveOptions,
    ForceQuorumOptions, OperationOptions, RejoinInstanceOptions, RemoveInstanceOptions,
};
pub use preconditions::{Operation, check_preconditions};
pub use prompt::{FixedAnswer, Outcome, Prompt};
pub use replicaset::ReplicaSet;

use crate::config::AdminConfig;
use crate::connection::Connector;
use crate::provision::ProvisioningGateway;
use std::sync::Arc;

/// External collaborators shared by a cluster and its replicaset.
#[derive(Clone)]
pub struct AdminContext {
    pub connector: Arc<dyn Connector>,
    pub gateway: Arc<dyn ProvisioningGateway>,
    pub prompt: Arc<dyn Prompt>,
    pub config: Arc<AdminConfig>,
}

impl AdminContext {
    /// Context with the default configuration and a prompt that declines
    /// every confirmation.
    pub fn new(connector: Arc<dyn Connector>, gateway: Arc<dyn ProvisioningGateway>) -> Self {
        Self {
            connector,
            gateway,
            prompt: Arc::new(FixedAnswer(false)),
            config: Arc::new(AdminConfig::default()),
        }
    }

    /// Set the confirmation prompt
    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: AdminConfig) -> Self {
        self.config = Arc::new(config);
        self
    }
}

impl std::fmt::Debug for AdminContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
