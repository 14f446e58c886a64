//! In-process simulation of a set of server instances, the replication
//! groups they form and the provisioning tool acting on them.

#![allow(dead_code)]

use clusteradmin::admin::AdminContext;
use clusteradmin::group::sql;
use clusteradmin::{
    AdminConfig, AdminError, Cluster, ConnectionOptions, Connector, CreateClusterOptions,
    FixedAnswer, GroupSettings, InMemoryCatalog, ProvisionCredentials, ProvisionOutcome,
    ProvisioningGateway, QueryResult, Result, Session, Value,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLUSTER: &str = "testCluster";

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Clone)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub uuid: String,
    pub reachable: bool,
    pub group_name: Option<String>,
    /// State inside its group; `None` when replication is stopped
    pub state: Option<&'static str>,
    pub local_address: String,
    pub datadir: String,
    pub hostname: String,
    pub have_ssl: bool,
    pub require_secure_transport: bool,
    pub binlog_filter: bool,
    pub gtid_executed: String,
    pub force_members: String,
    pub executed: Vec<String>,
}

impl Server {
    fn new(address: &str) -> Self {
        let (host, port) = address.rsplit_once(':').expect("host:port");
        let port: u16 = port.parse().expect("numeric port");
        Self {
            host: host.to_string(),
            port,
            uuid: format!("uuid-{}-{}", host, port),
            reachable: true,
            group_name: None,
            state: None,
            local_address: format!("{}:{}", host, u32::from(port) * 10 + 1),
            datadir: "/var/lib/mysql/".to_string(),
            hostname: host.to_string(),
            have_ssl: true,
            require_secure_transport: false,
            binlog_filter: false,
            gtid_executed: String::new(),
            force_members: String::new(),
            executed: Vec::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn active_group(&self) -> Option<&str> {
        self.state.and(self.group_name.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub single_primary: bool,
    pub primary: Option<String>,
    pub ssl_mode: String,
    pub metadata_schema: bool,
}

#[derive(Debug, Default)]
pub struct World {
    pub servers: BTreeMap<String, Server>,
    pub groups: HashMap<String, Group>,
}

impl World {
    fn members(&self, group: &str) -> Vec<&Server> {
        self.servers
            .values()
            .filter(|s| s.active_group() == Some(group))
            .collect()
    }

    fn group_of(&self, address: &str) -> Option<(&Server, Option<&Group>)> {
        let server = self.servers.get(address)?;
        let group = server.active_group().and_then(|g| self.groups.get(g));
        Some((server, group))
    }

    fn execute(&mut self, address: &str, statement: &str) -> QueryResult {
        let Some(server) = self.servers.get(address) else {
            return QueryResult::empty();
        };
        let active_group = server.active_group().map(str::to_string);

        if statement == sql::GROUP_MEMBERS {
            let rows = match &active_group {
                Some(group) => self
                    .members(group)
                    .into_iter()
                    .map(|m| {
                        vec![
                            Value::from(m.uuid.as_str()),
                            Value::from(m.host.as_str()),
                            Value::Integer(i64::from(m.port)),
                            Value::from(m.state.unwrap_or("OFFLINE")),
                        ]
                    })
                    .collect(),
                None => Vec::new(),
            };
            return QueryResult::with_columns(
                &["MEMBER_ID", "MEMBER_HOST", "MEMBER_PORT", "MEMBER_STATE"],
                rows,
            );
        }
        if statement == sql::GROUP_QUORUM {
            let quorum = match &active_group {
                Some(group) => {
                    let members = self.members(group);
                    let unreachable = members
                        .iter()
                        .filter(|m| m.state == Some("UNREACHABLE"))
                        .count();
                    (members.len() - unreachable) * 2 > members.len()
                }
                None => false,
            };
            return QueryResult::with_columns(&["quorum"], vec![vec![Value::Integer(i64::from(quorum))]]);
        }
        if statement == sql::PLUGIN_STATUS {
            let status = if active_group.is_some() { "ACTIVE" } else { "INACTIVE" };
            return QueryResult::with_columns(&["PLUGIN_STATUS"], vec![vec![Value::from(status)]]);
        }
        if statement == sql::METADATA_SCHEMA_EXISTS {
            let exists = active_group
                .as_deref()
                .and_then(|g| self.groups.get(g))
                .is_some_and(|g| g.metadata_schema);
            return QueryResult::with_columns(&["COUNT(*)"], vec![vec![Value::Integer(i64::from(exists))]]);
        }
        if statement == sql::MASTER_STATUS {
            let filter = if server.binlog_filter { "db1" } else { "" };
            return QueryResult::with_columns(
                &["File", "Position", "Binlog_Do_DB", "Binlog_Ignore_DB"],
                vec![vec![
                    Value::from("binlog.000001"),
                    Value::Integer(4),
                    Value::from(filter),
                    Value::from(""),
                ]],
            );
        }

        let server = self.servers.get_mut(address).expect("server exists");
        if statement == sql::STOP_GROUP_REPLICATION {
            server.state = None;
        }
        server.executed.push(statement.to_string());
        QueryResult::empty()
    }

    fn global_variable(&self, address: &str, name: &str) -> Value {
        let Some((server, group)) = self.group_of(address) else {
            return Value::Null;
        };
        match name {
            sql::VAR_SERVER_UUID => Value::from(server.uuid.as_str()),
            sql::VAR_DATADIR => Value::from(server.datadir.as_str()),
            sql::VAR_HOSTNAME => Value::from(server.hostname.as_str()),
            sql::VAR_PORT => Value::Integer(i64::from(server.port)),
            sql::VAR_MYSQLX_PORT => Value::Integer(i64::from(server.port) * 10),
            sql::VAR_GROUP_NAME => server
                .group_name
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
            sql::VAR_SINGLE_PRIMARY_MODE => {
                Value::Boolean(group.map(|g| g.single_primary).unwrap_or(true))
            }
            sql::VAR_LOCAL_ADDRESS => Value::from(server.local_address.as_str()),
            sql::VAR_GR_SSL_MODE => {
                Value::from(group.map(|g| g.ssl_mode.as_str()).unwrap_or("DISABLED"))
            }
            sql::VAR_FORCE_MEMBERS => Value::from(server.force_members.as_str()),
            sql::VAR_REQUIRE_SECURE_TRANSPORT => Value::Boolean(server.require_secure_transport),
            sql::VAR_HAVE_SSL => Value::from(if server.have_ssl { "YES" } else { "DISABLED" }),
            sql::VAR_GTID_EXECUTED => Value::from(server.gtid_executed.as_str()),
            _ => Value::Null,
        }
    }

    fn status_variable(&self, address: &str, name: &str) -> Value {
        let Some((_, Some(group))) = self.group_of(address) else {
            return Value::Null;
        };
        if name != sql::STATUS_PRIMARY_MEMBER || !group.single_primary {
            return Value::Null;
        }
        group
            .primary
            .as_ref()
            .and_then(|p| self.servers.get(p))
            .map(|p| Value::from(p.uuid.as_str()))
            .unwrap_or(Value::Null)
    }

    /// Forcing the membership drops every member whose group address is
    /// not listed.
    fn force_members(&mut self, address: &str, value: &str) {
        let listed: HashSet<&str> = value.split(',').collect();
        let group = self.servers.get(address).and_then(|s| s.group_name.clone());
        for server in self.servers.values_mut() {
            if server.address() == address {
                server.force_members = value.to_string();
            }
            if server.group_name == group && !listed.contains(server.local_address.as_str()) {
                server.state = None;
            }
        }
    }
}

// ============================================================================
// Session and connector
// ============================================================================

pub struct FakeSession {
    world: Arc<Mutex<World>>,
    options: ConnectionOptions,
    address: String,
    open: AtomicBool,
}

impl FakeSession {
    fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> Result<R> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(AdminError::runtime("The session is closed"));
        }
        let mut world = self.world.lock().unwrap();
        let reachable = world.servers.get(&self.address).is_some_and(|s| s.reachable);
        if !reachable {
            return Err(AdminError::runtime(format!(
                "Lost connection to MySQL server at '{}'",
                self.address
            )));
        }
        Ok(f(&mut world))
    }
}

impl Session for FakeSession {
    fn connection_options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn execute(&self, statement: &str) -> Result<QueryResult> {
        self.with_world(|w| w.execute(&self.address, statement))
    }

    fn global_variable(&self, name: &str) -> Result<Value> {
        self.with_world(|w| w.global_variable(&self.address, name))
    }

    fn set_global_variable(&self, name: &str, value: &Value) -> Result<()> {
        self.with_world(|w| {
            if name == sql::VAR_FORCE_MEMBERS {
                w.force_members(&self.address, &value.to_text().unwrap_or_default());
            }
        })
    }

    fn status_variable(&self, name: &str) -> Result<Value> {
        self.with_world(|w| w.status_variable(&self.address, name))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

pub struct FakeConnector {
    world: Arc<Mutex<World>>,
    pub connections: AtomicUsize,
}

impl Connector for FakeConnector {
    fn connect(&self, options: &ConnectionOptions) -> Result<Arc<dyn Session>> {
        let address = options.address();
        let reachable = self
            .world
            .lock()
            .unwrap()
            .servers
            .get(&address)
            .is_some_and(|s| s.reachable);
        if !reachable {
            return Err(AdminError::runtime(format!(
                "Can't connect to MySQL server on '{}'",
                address
            )));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            world: Arc::clone(&self.world),
            options: options.clone(),
            address,
            open: AtomicBool::new(true),
        }))
    }
}

// ============================================================================
// Provisioning
// ============================================================================

pub struct FakeGateway {
    world: Arc<Mutex<World>>,
    calls: Mutex<Vec<String>>,
    /// Instances whose leave fails, with the servers lost when it does.
    failing_leaves: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeGateway {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn unreachable(address: &str) -> ProvisionOutcome {
        ProvisionOutcome::failure(1, vec![format!("Unable to connect to the instance '{}'", address)])
    }
}

impl ProvisioningGateway for FakeGateway {
    fn start_group(
        &self,
        instance: &ConnectionOptions,
        _credentials: &ProvisionCredentials,
        settings: &GroupSettings,
    ) -> Result<ProvisionOutcome> {
        let address = instance.address();
        self.record(format!("start {}", address));
        let mut world = self.world.lock().unwrap();
        let group_name = settings
            .group_name
            .clone()
            .unwrap_or_else(|| "generated-group".to_string());
        let Some(server) = world.servers.get_mut(&address).filter(|s| s.reachable) else {
            return Ok(Self::unreachable(&address));
        };
        server.group_name = Some(group_name.clone());
        server.state = Some("ONLINE");
        if let Some(local) = &settings.local_address {
            server.local_address = local.clone();
        }
        world.groups.insert(
            group_name,
            Group {
                single_primary: !settings.multi_primary,
                primary: (!settings.multi_primary).then(|| address.clone()),
                ssl_mode: settings.ssl_mode.as_str().to_string(),
                metadata_schema: true,
            },
        );
        Ok(ProvisionOutcome::success())
    }

    fn join_group(
        &self,
        instance: &ConnectionOptions,
        peer: &ConnectionOptions,
        _credentials: &ProvisionCredentials,
        _settings: &GroupSettings,
        _seed_address: Option<&str>,
        is_rejoin: bool,
    ) -> Result<ProvisionOutcome> {
        let address = instance.address();
        let verb = if is_rejoin { "rejoin" } else { "join" };
        self.record(format!("{} {} via {}", verb, address, peer.address()));

        let mut world = self.world.lock().unwrap();
        let Some(peer_server) = world.servers.get(&peer.address()) else {
            return Ok(Self::unreachable(&peer.address()));
        };
        let Some(group) = peer_server.active_group().map(str::to_string) else {
            return Ok(ProvisionOutcome::failure(
                1,
                vec![format!("The peer '{}' is not a group member", peer.address())],
            ));
        };
        let gtids = peer_server.gtid_executed.clone();
        let Some(server) = world.servers.get_mut(&address).filter(|s| s.reachable) else {
            return Ok(Self::unreachable(&address));
        };
        server.group_name = Some(group);
        server.state = Some("ONLINE");
        server.gtid_executed = gtids;
        Ok(ProvisionOutcome::success().with_warning("recovery channel configured"))
    }

    fn leave_group(&self, instance: &ConnectionOptions) -> Result<ProvisionOutcome> {
        let address = instance.address();
        self.record(format!("leave {}", address));
        let lost = self.failing_leaves.lock().unwrap().get(&address).cloned();
        let mut world = self.world.lock().unwrap();
        if let Some(lost) = lost {
            for peer in lost {
                if let Some(server) = world.servers.get_mut(&peer) {
                    server.reachable = false;
                }
            }
            return Ok(Self::unreachable(&address));
        }
        let Some(server) = world.servers.get_mut(&address).filter(|s| s.reachable) else {
            return Ok(Self::unreachable(&address));
        };
        server.state = None;
        let group_name = server.group_name.clone();

        let successor = group_name.as_deref().and_then(|g| {
            world
                .members(g)
                .into_iter()
                .find(|m| m.state == Some("ONLINE"))
                .map(Server::address)
        });
        if let Some(group) = group_name.and_then(|g| world.groups.get_mut(&g)) {
            if group.primary.as_deref() == Some(address.as_str()) {
                group.primary = successor;
            }
        }
        Ok(ProvisionOutcome::success())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Sim {
    pub world: Arc<Mutex<World>>,
    pub connector: Arc<FakeConnector>,
    pub gateway: Arc<FakeGateway>,
    pub catalog: Arc<InMemoryCatalog>,
    pub config: AdminConfig,
}

impl Sim {
    pub fn new(addresses: &[&str]) -> Self {
        let mut world = World::default();
        for address in addresses {
            world.servers.insert(address.to_string(), Server::new(address));
        }
        let world = Arc::new(Mutex::new(world));
        Self {
            connector: Arc::new(FakeConnector {
                world: Arc::clone(&world),
                connections: AtomicUsize::new(0),
            }),
            gateway: Arc::new(FakeGateway {
                world: Arc::clone(&world),
                calls: Mutex::new(Vec::new()),
                failing_leaves: Mutex::new(HashMap::new()),
            }),
            catalog: Arc::new(InMemoryCatalog::new()),
            config: AdminConfig::new()
                .gtid_wait_timeout(Duration::from_millis(50))
                .gtid_poll_interval(Duration::from_millis(5)),
            world,
        }
    }

    pub fn options(&self, address: &str) -> ConnectionOptions {
        ConnectionOptions::from_uri(&format!("root:secret@{}", address)).unwrap()
    }

    pub fn session(&self, address: &str) -> Arc<dyn Session> {
        self.connector.connect(&self.options(address)).unwrap()
    }

    pub fn context(&self, confirm: bool) -> AdminContext {
        AdminContext::new(self.connector.clone(), self.gateway.clone())
            .with_prompt(Arc::new(FixedAnswer(confirm)))
            .with_config(self.config.clone())
    }

    /// Creates a cluster seeded on `seed`, then adds `others` in order.
    pub fn cluster(&self, seed: &str, others: &[&str]) -> Cluster {
        let cluster = Cluster::create(
            self.context(true),
            self.session(seed),
            self.catalog.clone(),
            CLUSTER,
            CreateClusterOptions::default(),
        )
        .unwrap();
        for address in others {
            cluster
                .add_instance(&self.options(address), Default::default())
                .unwrap();
        }
        self.clear_calls();
        cluster
    }

    /// Forms a group outside of any cluster, the first address as primary.
    pub fn form_group(&self, group_name: &str, addresses: &[&str]) {
        let mut world = self.world.lock().unwrap();
        for address in addresses {
            let server = world.servers.get_mut(*address).unwrap();
            server.group_name = Some(group_name.to_string());
            server.state = Some("ONLINE");
        }
        world.groups.insert(
            group_name.to_string(),
            Group {
                single_primary: true,
                primary: addresses.first().map(|a| a.to_string()),
                ssl_mode: "REQUIRED".to_string(),
                metadata_schema: false,
            },
        );
    }

    pub fn with_server<R>(&self, address: &str, f: impl FnOnce(&mut Server) -> R) -> R {
        f(self.world.lock().unwrap().servers.get_mut(address).unwrap())
    }

    pub fn server(&self, address: &str) -> Server {
        self.world.lock().unwrap().servers[address].clone()
    }

    /// The instance stops answering and the group reports it UNREACHABLE.
    pub fn make_unreachable(&self, address: &str) {
        self.with_server(address, |s| {
            s.reachable = false;
            s.state = Some("UNREACHABLE");
        });
    }

    /// Moves the primary role of the group `address` belongs to.
    pub fn set_primary(&self, address: &str) {
        let mut world = self.world.lock().unwrap();
        let group = world.servers[address].group_name.clone().unwrap();
        world.groups.get_mut(&group).unwrap().primary = Some(address.to_string());
    }

    /// Group name `address` belongs to.
    pub fn group_name(&self, address: &str) -> String {
        self.server(address).group_name.unwrap()
    }

    /// `address` joins the group of `member` without the cluster knowing.
    pub fn join_outside(&self, address: &str, member: &str) {
        let group = self.group_name(member);
        self.with_server(address, |s| {
            s.group_name = Some(group);
            s.state = Some("ONLINE");
        });
    }

    pub fn fail_leave(&self, address: &str) {
        self.fail_leave_losing(address, &[]);
    }

    /// The leave of `address` fails and takes `lost` down with it.
    pub fn fail_leave_losing(&self, address: &str, lost: &[&str]) {
        self.gateway.failing_leaves.lock().unwrap().insert(
            address.to_string(),
            lost.iter().map(|a| a.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.gateway.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.gateway.calls.lock().unwrap().clear();
    }
}
