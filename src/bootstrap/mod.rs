//! The three-stage bootstrap sequence.
//!
//! Configuration servers first, then the shard replica set, then the router
//! wiring. Each stage issues its topology command and confirms convergence
//! through a bounded readiness poll; the runner aborts on the first stage
//! that does not come up ready, so router wiring never runs against a
//! cluster whose topology is not in place.

use crate::admin::{AdminClient, IndexSpec, Namespace, ReplicaSetConfig, ShardKey, ShardSpec};
use crate::core::BootstrapError;
use crate::poll::{CancelSignal, LastObserved, PollConfig, PollOutcome, wait_until_ready};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// One step of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ConfigServers,
    Shard,
    Router,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ConfigServers => "config-servers",
            Stage::Shard => "shard",
            Stage::Router => "router",
        };
        f.write_str(name)
    }
}

/// Terminal result of one stage. The driver branches on this and nothing
/// lower-level.
#[derive(Debug)]
pub enum StageOutcome {
    Ready,
    TimedOut { elapsed: Duration, detail: String },
    Failed(BootstrapError),
}

impl StageOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    fn from_poll<S>(outcome: PollOutcome<S>, describe: impl Fn(&S) -> String) -> Self {
        match outcome {
            PollOutcome::Ready(_) => Self::Ready,
            PollOutcome::TimedOut { elapsed, last } => {
                let detail = match last {
                    Some(LastObserved::Status(status)) => describe(&status),
                    Some(LastObserved::Error(err)) => format!("last error: {}", err),
                    None => "no status observed".to_string(),
                };
                Self::TimedOut { elapsed, detail }
            }
            PollOutcome::Failed(err) => Self::Failed(err),
        }
    }
}

/// A stage paired with how it ended.
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// What happened across a whole bootstrap run. Stages that were never
/// reached have no entry.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub stages: Vec<StageReport>,
}

impl BootstrapReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(|r| r.outcome.is_ready())
    }

    pub fn first_failure(&self) -> Option<&StageReport> {
        self.stages.iter().find(|r| !r.outcome.is_ready())
    }
}

/// Initiate a replica set and wait until it converges.
///
/// Initiation reports success asynchronously, so a transient error from the
/// command itself is only logged; the subsequent status poll is what decides
/// the stage. Fatal errors abort immediately.
pub async fn init_replica_set(
    client: &dyn AdminClient,
    config: &ReplicaSetConfig,
    poll: &PollConfig,
    cancel: Option<CancelSignal>,
) -> StageOutcome {
    match client.initiate_replica_set(config).await {
        Ok(()) => info!(set = %config.id, "replica set initiation issued"),
        Err(err) if err.is_fatal() => return StageOutcome::Failed(err),
        Err(err) => {
            warn!(set = %config.id, %err, "initiation not acknowledged, relying on status poll");
        }
    }

    let expected = config.members.len();
    let outcome = wait_until_ready(
        || client.replica_set_status(),
        |status| status.converged(expected),
        poll,
        cancel,
    )
    .await;

    StageOutcome::from_poll(outcome, |status| {
        format!(
            "last status: ok={}, primary={}, healthy {}/{} members",
            status.ok,
            status.has_primary(),
            status.healthy_members(),
            expected
        )
    })
}

/// Everything the router stage needs: the shard to register and the
/// database/collection wiring to apply once it is visible.
#[derive(Debug, Clone)]
pub struct RouterPlan {
    pub shard: ShardSpec,
    pub namespace: Namespace,
    pub index: IndexSpec,
    pub shard_key: ShardKey,
    /// Bounded settle wait after enabling sharding, for which no status
    /// query exists.
    pub settle_delay: Duration,
}

/// Register the shard, wait until the router lists it, then wire up the
/// database: enable sharding, create the index, shard the collection.
pub async fn init_router(
    client: &dyn AdminClient,
    plan: &RouterPlan,
    poll: &PollConfig,
    cancel: Option<CancelSignal>,
) -> StageOutcome {
    match client.add_shard(&plan.shard).await {
        Ok(()) => info!(shard = %plan.shard.address(), "shard registration issued"),
        Err(err) if err.is_fatal() => return StageOutcome::Failed(err),
        Err(err) => {
            warn!(shard = %plan.shard.address(), %err, "registration not acknowledged, relying on shard-list poll");
        }
    }

    let shard_id = plan.shard.replica_set.clone();
    let outcome = wait_until_ready(
        || client.list_shards(),
        |ids: &Vec<String>| ids.iter().any(|id| id == &shard_id),
        poll,
        cancel.clone(),
    )
    .await;
    let listed = StageOutcome::from_poll(outcome, |ids: &Vec<String>| {
        format!("shard '{}' not in shard list {:?}", shard_id, ids)
    });
    if !listed.is_ready() {
        return listed;
    }

    let ns = &plan.namespace;
    if let Err(err) = client.enable_sharding(&ns.database).await {
        return StageOutcome::Failed(err);
    }
    info!(database = %ns.database, "sharding enabled");

    // No status query confirms enableSharding has propagated; a bounded
    // fixed-delay wait substitutes for a poll here.
    info!(
        delay_ms = plan.settle_delay.as_millis() as u64,
        "fixed-delay wait for sharding metadata to settle"
    );
    if let Some(mut signal) = cancel {
        tokio::select! {
            _ = sleep(plan.settle_delay) => {}
            _ = signal.cancelled() => return StageOutcome::Failed(BootstrapError::Cancelled),
        }
    } else {
        sleep(plan.settle_delay).await;
    }

    if let Err(err) = client.create_index(ns, &plan.index).await {
        return StageOutcome::Failed(err);
    }
    info!(namespace = %ns, "index created");

    if let Err(err) = client.shard_collection(ns, &plan.shard_key).await {
        return StageOutcome::Failed(err);
    }
    info!(namespace = %ns, "collection sharded");

    StageOutcome::Ready
}

/// Topology for a complete cluster bootstrap.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub config_servers: ReplicaSetConfig,
    pub shard: ReplicaSetConfig,
    pub router: RouterPlan,
}

/// Run all three stages in order against their respective targets, stopping
/// at the first stage that is not ready.
pub async fn run_cluster_bootstrap(
    config_client: &dyn AdminClient,
    shard_client: &dyn AdminClient,
    router_client: &dyn AdminClient,
    plan: &ClusterPlan,
    poll_template: &PollConfig,
    cancel: Option<CancelSignal>,
) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    let poll = poll_template
        .clone()
        .describe("config server replica set");
    info!(stage = %Stage::ConfigServers, "starting bootstrap stage");
    let outcome =
        init_replica_set(config_client, &plan.config_servers, &poll, cancel.clone()).await;
    let ready = outcome.is_ready();
    report.stages.push(StageReport {
        stage: Stage::ConfigServers,
        outcome,
    });
    if !ready {
        return report;
    }

    let poll = poll_template.clone().describe("shard replica set");
    info!(stage = %Stage::Shard, "starting bootstrap stage");
    let outcome = init_replica_set(shard_client, &plan.shard, &poll, cancel.clone()).await;
    let ready = outcome.is_ready();
    report.stages.push(StageReport {
        stage: Stage::Shard,
        outcome,
    });
    if !ready {
        return report;
    }

    let poll = poll_template.clone().describe("router shard list");
    info!(stage = %Stage::Router, "starting bootstrap stage");
    let outcome = init_router(router_client, &plan.router, &poll, cancel).await;
    report.stages.push(StageReport {
        stage: Stage::Router,
        outcome,
    });

    report
}
