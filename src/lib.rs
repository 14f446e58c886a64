// ============================================================================
// clusteradmin Library
// ============================================================================

pub mod admin;
pub mod config;
pub mod connection;
pub mod core;
pub mod group;
pub mod metadata;
pub mod provision;
pub mod result;

// Re-export main types for convenience
pub use admin::{
    AddInstanceOptions, AdminContext, CheckStateOptions, Cluster, CreateClusterOptions,
    DissolveOptions, FixedAnswer, ForceQuorumOptions, Operation, OperationOptions, Outcome,
    Prompt, RejoinInstanceOptions, RemoveInstanceOptions, ReplicaSet,
};
pub use config::AdminConfig;
pub use core::{AdminError, ErrorKind, Result, Value};
pub use result::QueryResult;

// Re-export the interfaces an embedding application implements
pub use connection::{ConnectionOptions, Connector, Session, SslOptions};
pub use metadata::{CatalogStore, CatalogTables, InMemoryCatalog, JsonFileCatalog, MetadataStorage};
pub use provision::{
    ExitStateAction, GroupSettings, MemberSslMode, ProvisionCredentials, ProvisionOutcome,
    ProvisioningGateway,
};
