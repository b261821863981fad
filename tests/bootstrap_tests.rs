use async_trait::async_trait;
use shardinit::{
    AdminClient, BootstrapError, ClusterPlan, IndexSpec, MemberStatus, Namespace, PollConfig,
    ReplicaMember, ReplicaSetConfig, ReplicaSetStatus, Result, RouterPlan, ShardKey, ShardSpec,
    Stage, StageOutcome, init_replica_set, init_router, run_cluster_bootstrap,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted in-memory stand-in for a cluster administrative client.
///
/// Records every operation and reports readiness after a configurable number
/// of status queries.
#[derive(Default)]
struct ScriptedAdmin {
    calls: Mutex<Vec<String>>,
    status_calls: AtomicU32,
    list_calls: AtomicU32,
    /// Replica-set status converges from this query on (0 = never).
    status_ready_on: u32,
    /// The shard appears in the shard list from this query on (0 = never).
    shard_listed_on: u32,
    /// When set, `initiate_replica_set` fails with an authentication error.
    reject_initiate: bool,
}

impl ScriptedAdmin {
    fn replica_set_ready_on(n: u32) -> Self {
        Self {
            status_ready_on: n,
            ..Self::default()
        }
    }

    fn shard_listed_on(n: u32) -> Self {
        Self {
            shard_listed_on: n,
            ..Self::default()
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdminClient for ScriptedAdmin {
    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<()> {
        self.record(format!("initiate:{}", config.id));
        if self.reject_initiate {
            return Err(BootstrapError::AuthFailed("bad credentials".to_string()));
        }
        Ok(())
    }

    async fn replica_set_status(&self) -> Result<ReplicaSetStatus> {
        self.record("status");
        let n = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = self.status_ready_on != 0 && n >= self.status_ready_on;
        Ok(ReplicaSetStatus {
            ok: ready,
            set: "testrs".to_string(),
            members: if ready {
                vec![MemberStatus {
                    id: 0,
                    name: "node:27018".to_string(),
                    health: 1.0,
                    state: "PRIMARY".to_string(),
                }]
            } else {
                vec![]
            },
        })
    }

    async fn add_shard(&self, spec: &ShardSpec) -> Result<()> {
        self.record(format!("add_shard:{}", spec.address()));
        Ok(())
    }

    async fn list_shards(&self) -> Result<Vec<String>> {
        self.record("list_shards");
        let n = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shard_listed_on != 0 && n >= self.shard_listed_on {
            Ok(vec!["shardrs".to_string()])
        } else {
            Ok(vec![])
        }
    }

    async fn enable_sharding(&self, database: &str) -> Result<()> {
        self.record(format!("enable_sharding:{}", database));
        Ok(())
    }

    async fn create_index(&self, ns: &Namespace, _index: &IndexSpec) -> Result<()> {
        self.record(format!("create_index:{}", ns));
        Ok(())
    }

    async fn shard_collection(&self, ns: &Namespace, _key: &ShardKey) -> Result<()> {
        self.record(format!("shard_collection:{}", ns));
        Ok(())
    }
}

fn cadence(interval_ms: u64, timeout_ms: u64) -> PollConfig {
    PollConfig::new("test")
        .interval(Duration::from_millis(interval_ms))
        .timeout(Duration::from_millis(timeout_ms))
}

fn shard_config() -> ReplicaSetConfig {
    ReplicaSetConfig::new("shardrs", vec![ReplicaMember::new(0, "mongodb-shard:27018")]).unwrap()
}

fn router_plan() -> RouterPlan {
    RouterPlan {
        shard: "shardrs/mongodb-shard:27018".parse().unwrap(),
        namespace: Namespace::new("douban", "books"),
        index: IndexSpec::ascending("book_id").unique(true),
        shard_key: ShardKey::ascending("book_id"),
        settle_delay: Duration::from_millis(2000),
    }
}

#[tokio::test(start_paused = true)]
async fn replica_set_stage_polls_until_converged() {
    let admin = ScriptedAdmin::replica_set_ready_on(3);
    let outcome = init_replica_set(&admin, &shard_config(), &cadence(1000, 10_000), None).await;

    assert!(outcome.is_ready());
    assert_eq!(admin.status_calls.load(Ordering::SeqCst), 3);
    let calls = admin.calls();
    assert_eq!(calls[0], "initiate:shardrs", "initiation precedes the poll");
}

#[tokio::test(start_paused = true)]
async fn fatal_initiation_error_skips_the_poll() {
    let admin = ScriptedAdmin {
        reject_initiate: true,
        ..ScriptedAdmin::replica_set_ready_on(1)
    };
    let outcome = init_replica_set(&admin, &shard_config(), &cadence(1000, 10_000), None).await;

    assert!(matches!(
        outcome,
        StageOutcome::Failed(BootstrapError::AuthFailed(_))
    ));
    assert_eq!(admin.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn replica_set_stage_times_out_with_last_status() {
    let admin = ScriptedAdmin::replica_set_ready_on(0);
    let outcome = init_replica_set(&admin, &shard_config(), &cadence(1000, 3000), None).await;

    match outcome {
        StageOutcome::TimedOut { elapsed, detail } => {
            assert!(elapsed >= Duration::from_millis(3000));
            assert!(detail.contains("healthy 0/1"), "detail was: {}", detail);
        }
        other => panic!("expected TimedOut, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn router_stage_runs_wiring_in_order() {
    let admin = ScriptedAdmin::shard_listed_on(2);
    let start = Instant::now();
    let outcome = init_router(&admin, &router_plan(), &cadence(1000, 10_000), None).await;

    assert!(outcome.is_ready());
    assert_eq!(
        admin.calls(),
        vec![
            "add_shard:shardrs/mongodb-shard:27018",
            "list_shards",
            "list_shards",
            "enable_sharding:douban",
            "create_index:douban.books",
            "shard_collection:douban.books",
        ]
    );
    // One interval for the second list poll plus the labeled settle delay.
    assert!(start.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn router_stage_times_out_before_any_wiring() {
    let admin = ScriptedAdmin::shard_listed_on(0);
    let outcome = init_router(&admin, &router_plan(), &cadence(1000, 3000), None).await;

    assert!(matches!(outcome, StageOutcome::TimedOut { .. }));
    let calls = admin.calls();
    assert!(!calls.iter().any(|c| c.starts_with("enable_sharding")));
    assert!(!calls.iter().any(|c| c.starts_with("create_index")));
    assert!(!calls.iter().any(|c| c.starts_with("shard_collection")));
}

fn cluster_plan() -> ClusterPlan {
    ClusterPlan {
        config_servers: ReplicaSetConfig::config_server(
            "configrs",
            vec![ReplicaMember::new(0, "mongodb-config:27019")],
        )
        .unwrap(),
        shard: shard_config(),
        router: router_plan(),
    }
}

#[tokio::test(start_paused = true)]
async fn full_bootstrap_runs_all_three_stages() {
    let config_admin = ScriptedAdmin::replica_set_ready_on(2);
    let shard_admin = ScriptedAdmin::replica_set_ready_on(1);
    let router_admin = ScriptedAdmin::shard_listed_on(1);

    let report = run_cluster_bootstrap(
        &config_admin,
        &shard_admin,
        &router_admin,
        &cluster_plan(),
        &cadence(1000, 10_000),
        None,
    )
    .await;

    assert!(report.succeeded());
    let stages: Vec<Stage> = report.stages.iter().map(|r| r.stage).collect();
    assert_eq!(stages, vec![Stage::ConfigServers, Stage::Shard, Stage::Router]);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_timeout_in_stage_one_stops_the_sequence() {
    let config_admin = ScriptedAdmin::replica_set_ready_on(0);
    let shard_admin = ScriptedAdmin::replica_set_ready_on(1);
    let router_admin = ScriptedAdmin::shard_listed_on(1);

    let report = run_cluster_bootstrap(
        &config_admin,
        &shard_admin,
        &router_admin,
        &cluster_plan(),
        &cadence(1000, 3000),
        None,
    )
    .await;

    assert!(!report.succeeded());
    assert_eq!(report.stages.len(), 1);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.stage, Stage::ConfigServers);
    assert!(matches!(failure.outcome, StageOutcome::TimedOut { .. }));

    assert!(shard_admin.calls().is_empty(), "shard stage never invoked");
    assert!(router_admin.calls().is_empty(), "router stage never invoked");
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_in_stage_two_stops_before_the_router() {
    let config_admin = ScriptedAdmin::replica_set_ready_on(1);
    let shard_admin = ScriptedAdmin {
        reject_initiate: true,
        ..ScriptedAdmin::replica_set_ready_on(1)
    };
    let router_admin = ScriptedAdmin::shard_listed_on(1);

    let report = run_cluster_bootstrap(
        &config_admin,
        &shard_admin,
        &router_admin,
        &cluster_plan(),
        &cadence(1000, 10_000),
        None,
    )
    .await;

    assert!(!report.succeeded());
    assert_eq!(report.stages.len(), 2);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.stage, Stage::Shard);
    assert!(matches!(failure.outcome, StageOutcome::Failed(_)));
    assert!(router_admin.calls().is_empty());
}
