//! [`AdminClient`] implementation on top of the `mongosh` shell.
//!
//! Each operation becomes one `mongosh --quiet --eval <snippet> --json`
//! invocation against the configured target. The shell prints the command
//! result as a single JSON document on stdout, which keeps the parsing side
//! plain `serde_json`.

use super::{
    AdminClient, IndexSpec, KeyOrder, Namespace, ReplicaSetConfig, ReplicaSetStatus, ShardKey,
    ShardSpec,
};
use crate::core::{BootstrapError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

/// Administrative client that shells out to `mongosh`.
pub struct ShellAdminClient {
    target: String,
    shell: String,
}

impl ShellAdminClient {
    /// Client for one connection target (a node or router address, or a full
    /// connection string).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            shell: "mongosh".to_string(),
        }
    }

    /// Override the shell binary, e.g. a container-local path.
    pub fn shell_path(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn eval(&self, snippet: &str) -> Result<Value> {
        debug!(node = %self.target, snippet, "running admin command");
        let output = Command::new(&self.shell)
            .arg(&self.target)
            .arg("--quiet")
            .arg("--json=relaxed")
            .arg("--eval")
            .arg(snippet)
            .output()
            .await
            .map_err(|err| BootstrapError::Io(format!("failed to spawn {}: {}", self.shell, err)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_shell_failure(&format!("{stdout}\n{stderr}")));
        }

        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|err| {
            BootstrapError::MalformedStatus(format!("unparseable shell output: {}", err))
        })?;
        ensure_ok(&value)?;
        Ok(value)
    }
}

#[async_trait]
impl AdminClient for ShellAdminClient {
    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<()> {
        match self.eval(&initiate_snippet(config)).await {
            Ok(_) => Ok(()),
            // A re-run against an already-initiated set is not a failure.
            Err(BootstrapError::CommandRejected(msg)) if msg.contains("AlreadyInitialized") => {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn replica_set_status(&self) -> Result<ReplicaSetStatus> {
        let value = self.eval("rs.status()").await?;
        ReplicaSetStatus::from_json(&value)
    }

    async fn add_shard(&self, spec: &ShardSpec) -> Result<()> {
        self.eval(&format!("sh.addShard({:?})", spec.address()))
            .await
            .map(|_| ())
    }

    async fn list_shards(&self) -> Result<Vec<String>> {
        let value = self.eval("db.adminCommand({ listShards: 1 })").await?;
        let shards = value
            .get("shards")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                BootstrapError::MalformedStatus(
                    "listShards reply has no 'shards' array".to_string(),
                )
            })?;
        Ok(shards
            .iter()
            .filter_map(|s| s.get("_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn enable_sharding(&self, database: &str) -> Result<()> {
        self.eval(&format!("sh.enableSharding({:?})", database))
            .await
            .map(|_| ())
    }

    async fn create_index(&self, ns: &Namespace, index: &IndexSpec) -> Result<()> {
        self.eval(&create_index_snippet(ns, index)).await.map(|_| ())
    }

    async fn shard_collection(&self, ns: &Namespace, key: &ShardKey) -> Result<()> {
        self.eval(&format!(
            "sh.shardCollection({:?}, {})",
            ns.to_string(),
            key_document(&key.0)
        ))
        .await
        .map(|_| ())
    }
}

fn initiate_snippet(config: &ReplicaSetConfig) -> String {
    let members = config
        .members
        .iter()
        .map(|m| format!("{{ _id: {}, host: {:?} }}", m.id, m.host))
        .collect::<Vec<_>>()
        .join(", ");
    let configsvr = if config.config_server {
        ", configsvr: true"
    } else {
        ""
    };
    format!(
        "rs.initiate({{ _id: {:?}{}, members: [{}] }})",
        config.id, configsvr, members
    )
}

fn create_index_snippet(ns: &Namespace, index: &IndexSpec) -> String {
    format!(
        "db.getSiblingDB({:?}).getCollection({:?}).createIndex({}, {{ unique: {} }})",
        ns.database,
        ns.collection,
        key_document(&index.keys),
        index.unique
    )
}

/// Render a key document preserving field order, e.g. `{ "book_id": 1 }`.
fn key_document(keys: &[(String, KeyOrder)]) -> String {
    let fields = keys
        .iter()
        .map(|(field, order)| format!("{:?}: {}", field, order.as_i64()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{ {} }}", fields)
}

/// Reject command replies the server marked as failed.
fn ensure_ok(value: &Value) -> Result<()> {
    let Some(ok) = value.get("ok").and_then(Value::as_f64) else {
        // Not a command-reply document (e.g. createIndex returns the index
        // name as a bare string).
        return Ok(());
    };
    if ok >= 1.0 {
        return Ok(());
    }
    let code_name = value
        .get("codeName")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let errmsg = value
        .get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or("command failed");
    Err(classify_server_error(code_name, errmsg))
}

fn classify_server_error(code_name: &str, errmsg: &str) -> BootstrapError {
    let detail = if code_name.is_empty() {
        errmsg.to_string()
    } else {
        format!("{}: {}", code_name, errmsg)
    };
    match code_name {
        "Unauthorized" | "AuthenticationFailed" => BootstrapError::AuthFailed(detail),
        "NotYetInitialized" | "NotPrimaryNoSecondaryOk" | "NotWritablePrimary"
        | "PrimarySteppedDown" | "HostUnreachable" | "FailedToSatisfyReadPreference"
        | "InterruptedDueToReplStateChange" => BootstrapError::NotReady(detail),
        _ => BootstrapError::CommandRejected(detail),
    }
}

/// Classify a non-zero shell exit from its combined output.
///
/// The shell throws for both "cluster not up yet" and "you sent garbage";
/// only the former may be retried.
fn classify_shell_failure(output: &str) -> BootstrapError {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("shell command failed")
        .to_string();

    let transient_markers = [
        "ECONNREFUSED",
        "ENOTFOUND",
        "getaddrinfo",
        "connect ETIMEDOUT",
        "Server selection timed out",
        "no replset config has been received",
        "NotYetInitialized",
        "not primary",
        "network error",
    ];
    if transient_markers.iter().any(|m| output.contains(m)) {
        return BootstrapError::Unreachable(line);
    }

    let auth_markers = ["Authentication failed", "Unauthorized", "requires authentication"];
    if auth_markers.iter().any(|m| output.contains(m)) {
        return BootstrapError::AuthFailed(line);
    }

    BootstrapError::CommandRejected(line)
}
