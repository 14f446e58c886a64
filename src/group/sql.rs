//! Statements and variable names the prober issues against an instance.

/// Membership view as seen by the queried instance.
pub const GROUP_MEMBERS: &str = "SELECT MEMBER_ID, MEMBER_HOST, MEMBER_PORT, MEMBER_STATE \
     FROM performance_schema.replication_group_members";

/// Quorum as reported by the group: a majority of the listed members is reachable.
/// RECOVERING members still count towards the majority.
pub const GROUP_QUORUM: &str = "SELECT COUNT(*) \
     - CAST(SUM(IF(MEMBER_STATE = 'UNREACHABLE', 1, 0)) AS SIGNED) \
     > COUNT(*) / 2 AS quorum \
     FROM performance_schema.replication_group_members";

pub const PLUGIN_STATUS: &str = "SELECT PLUGIN_STATUS FROM information_schema.plugins \
     WHERE PLUGIN_NAME = 'group_replication'";

pub const METADATA_SCHEMA_EXISTS: &str = "SELECT COUNT(*) FROM information_schema.schemata \
     WHERE SCHEMA_NAME = 'mysql_innodb_cluster_metadata'";

/// Binary log filters show up in the Binlog_Do_DB / Binlog_Ignore_DB columns.
pub const MASTER_STATUS: &str = "SHOW MASTER STATUS";

pub const STOP_GROUP_REPLICATION: &str = "STOP GROUP_REPLICATION";

// ============================================================================
// Variables
// ============================================================================

pub const VAR_SERVER_UUID: &str = "server_uuid";
pub const VAR_DATADIR: &str = "datadir";
pub const VAR_REPORT_HOST: &str = "report_host";
pub const VAR_HOSTNAME: &str = "hostname";
pub const VAR_PORT: &str = "port";
pub const VAR_MYSQLX_PORT: &str = "mysqlx_port";
pub const VAR_GROUP_NAME: &str = "group_replication_group_name";
pub const VAR_SINGLE_PRIMARY_MODE: &str = "group_replication_single_primary_mode";
pub const VAR_LOCAL_ADDRESS: &str = "group_replication_local_address";
pub const VAR_GR_SSL_MODE: &str = "group_replication_ssl_mode";
pub const VAR_FORCE_MEMBERS: &str = "group_replication_force_members";
pub const VAR_REQUIRE_SECURE_TRANSPORT: &str = "require_secure_transport";
pub const VAR_HAVE_SSL: &str = "have_ssl";
pub const VAR_GTID_EXECUTED: &str = "gtid_executed";

/// Status variable naming the primary in single-primary mode.
pub const STATUS_PRIMARY_MEMBER: &str = "group_replication_primary_member";
