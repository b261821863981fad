//! Cluster administrative client seam and the topology value types it speaks.

pub mod shell;

use crate::core::{BootstrapError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One member of a replica set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaMember {
    pub id: u32,
    pub host: String,
}

impl ReplicaMember {
    pub fn new(id: u32, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
        }
    }
}

/// Desired configuration of a replica set, as passed to initiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaSetConfig {
    pub id: String,
    /// True for the configuration-server replica set of a sharded cluster.
    pub config_server: bool,
    pub members: Vec<ReplicaMember>,
}

impl ReplicaSetConfig {
    pub fn new(id: impl Into<String>, members: Vec<ReplicaMember>) -> Result<Self> {
        Self::build(id, false, members)
    }

    pub fn config_server(id: impl Into<String>, members: Vec<ReplicaMember>) -> Result<Self> {
        Self::build(id, true, members)
    }

    fn build(id: impl Into<String>, config_server: bool, members: Vec<ReplicaMember>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(BootstrapError::InvalidConfig(
                "replica set id must not be empty".to_string(),
            ));
        }
        if members.is_empty() {
            return Err(BootstrapError::InvalidConfig(format!(
                "replica set '{}' needs at least one member",
                id
            )));
        }
        Ok(Self {
            id,
            config_server,
            members,
        })
    }
}

/// Health report for one member, as found in a replica-set status document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberStatus {
    pub id: u32,
    pub name: String,
    /// Health sentinel: 1.0 means healthy.
    pub health: f64,
    /// Replication state, e.g. "PRIMARY", "SECONDARY", "STARTUP".
    pub state: String,
}

impl MemberStatus {
    pub fn is_healthy(&self) -> bool {
        self.health >= 1.0
    }
}

/// Snapshot of a replica set's convergence state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplicaSetStatus {
    pub ok: bool,
    pub set: String,
    pub members: Vec<MemberStatus>,
}

impl ReplicaSetStatus {
    /// Parse the server's `replSetGetStatus` document.
    ///
    /// Kept tolerant: only `ok` is required, since early in initiation the
    /// server may omit the member list entirely.
    pub fn from_json(value: &Value) -> Result<Self> {
        let ok = match value.get("ok") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) >= 1.0,
            Some(Value::Bool(b)) => *b,
            _ => {
                return Err(BootstrapError::MalformedStatus(
                    "status document has no 'ok' field".to_string(),
                ));
            }
        };
        let set = value
            .get("set")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let members = value
            .get("members")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(member_from_json).collect())
            .unwrap_or_default();
        Ok(Self { ok, set, members })
    }

    pub fn healthy_members(&self) -> usize {
        self.members.iter().filter(|m| m.is_healthy()).count()
    }

    pub fn has_primary(&self) -> bool {
        self.members
            .iter()
            .any(|m| m.is_healthy() && m.state == "PRIMARY")
    }

    /// The readiness predicate for replica-set initiation: the status is ok,
    /// a primary has been elected, and every configured member reports
    /// healthy.
    pub fn converged(&self, expected_members: usize) -> bool {
        self.ok && self.has_primary() && self.healthy_members() >= expected_members
    }
}

fn member_from_json(value: &Value) -> MemberStatus {
    MemberStatus {
        id: value.get("_id").and_then(Value::as_u64).unwrap_or(0) as u32,
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        health: value.get("health").and_then(Value::as_f64).unwrap_or(0.0),
        state: value
            .get("stateStr")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// A shard to register with the router, addressed as a replica set plus its
/// member hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardSpec {
    pub replica_set: String,
    pub hosts: Vec<String>,
}

impl ShardSpec {
    pub fn new(replica_set: impl Into<String>, hosts: Vec<String>) -> Result<Self> {
        let replica_set = replica_set.into();
        if replica_set.trim().is_empty() || hosts.is_empty() {
            return Err(BootstrapError::InvalidConfig(
                "shard spec needs a replica set id and at least one host".to_string(),
            ));
        }
        Ok(Self { replica_set, hosts })
    }

    /// Wire form understood by the router: `"rs/host1:port,host2:port"`.
    pub fn address(&self) -> String {
        format!("{}/{}", self.replica_set, self.hosts.join(","))
    }
}

impl FromStr for ShardSpec {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        let (set, hosts) = s.split_once('/').ok_or_else(|| {
            BootstrapError::InvalidConfig(format!(
                "shard spec '{}' must look like 'rs/host:port[,host:port]'",
                s
            ))
        })?;
        let hosts = hosts
            .split(',')
            .filter(|h| !h.trim().is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self::new(set, hosts)
    }
}

/// A fully-qualified collection name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Sort order of one key in an index or shard-key document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyOrder {
    Ascending,
    Descending,
}

impl KeyOrder {
    /// Numeric form used in key documents: 1 or -1.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// An index to create before sharding a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<(String, KeyOrder)>,
    pub unique: bool,
}

impl IndexSpec {
    /// Single ascending key, not unique.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), KeyOrder::Ascending)],
            unique: false,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// The key a collection is partitioned by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardKey(pub Vec<(String, KeyOrder)>);

impl ShardKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self(vec![(field.into(), KeyOrder::Ascending)])
    }
}

/// Administrative operations the bootstrap sequence needs from the cluster.
///
/// Every operation takes an explicit client handle; there is no ambient
/// connection state. Implementations classify their failures into the
/// transient/fatal taxonomy of [`BootstrapError`] so the readiness poller can
/// decide what to retry.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Initiate a replica set. Success here only means the command was
    /// accepted; convergence is confirmed by polling [`Self::replica_set_status`].
    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<()>;

    /// Query the current replica-set status.
    async fn replica_set_status(&self) -> Result<ReplicaSetStatus>;

    /// Register a shard with the cluster through the router.
    async fn add_shard(&self, spec: &ShardSpec) -> Result<()>;

    /// List the identifiers of shards the cluster currently knows about.
    async fn list_shards(&self) -> Result<Vec<String>>;

    /// Enable sharding on a database.
    async fn enable_sharding(&self, database: &str) -> Result<()>;

    /// Create an index on a collection.
    async fn create_index(&self, ns: &Namespace, index: &IndexSpec) -> Result<()>;

    /// Shard a collection by the given key.
    async fn shard_collection(&self, ns: &Namespace, key: &ShardKey) -> Result<()>;
}
