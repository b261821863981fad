use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use shardinit::{
    AdminClient, BootstrapReport, CancelSignal, ClusterPlan, IndexSpec, Namespace, PollConfig,
    ReplicaMember, ReplicaSetConfig, RouterPlan, ShardKey, ShardSpec, ShellAdminClient, Stage,
    StageOutcome, StageReport, cancel_pair, init_replica_set, init_router, run_cluster_bootstrap,
};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code when a stage timed out waiting for readiness.
const EXIT_TIMED_OUT: i32 = 3;
/// Exit code when a stage failed fatally (auth, rejected command, cancel).
const EXIT_FAILED: i32 = 4;

#[derive(Parser)]
#[command(name = "shardinit")]
#[command(about = "Bootstrap a sharded document-database cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct PollArgs {
    /// Wait between status polls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Hard deadline for each readiness wait, in milliseconds
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,
}

impl PollArgs {
    fn to_config(&self, description: &str) -> PollConfig {
        PollConfig::new(description)
            .interval(Duration::from_millis(self.interval_ms))
            .timeout(Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Args, Clone)]
struct RouterTopologyArgs {
    /// Shard to register, as 'rs/host:port[,host:port]'
    #[arg(long, default_value = "shardrs/mongodb-shard:27018")]
    shard: String,

    /// Database to enable sharding on
    #[arg(long, default_value = "douban")]
    database: String,

    /// Collection to index and shard
    #[arg(long, default_value = "books")]
    collection: String,

    /// Field to index and shard by (ascending)
    #[arg(long, default_value = "book_id")]
    shard_key: String,

    /// Create the shard-key index as unique
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    unique_index: bool,

    /// Bounded settle wait after enabling sharding, in milliseconds
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,
}

impl RouterTopologyArgs {
    fn to_plan(&self) -> Result<RouterPlan> {
        let shard: ShardSpec = self.shard.parse()?;
        Ok(RouterPlan {
            shard,
            namespace: Namespace::new(&self.database, &self.collection),
            index: IndexSpec::ascending(&self.shard_key).unique(self.unique_index),
            shard_key: ShardKey::ascending(&self.shard_key),
            settle_delay: Duration::from_millis(self.settle_ms),
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the configuration-server replica set
    ConfigServers {
        /// Connection target of a configuration-server node
        #[arg(long)]
        target: String,

        /// Replica set id
        #[arg(long, default_value = "configrs")]
        replica_set: String,

        /// Member host:port, repeatable
        #[arg(long = "member", default_value = "mongodb-config:27019")]
        members: Vec<String>,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Initialize the shard replica set
    Shard {
        /// Connection target of a shard node
        #[arg(long)]
        target: String,

        /// Replica set id
        #[arg(long, default_value = "shardrs")]
        replica_set: String,

        /// Member host:port, repeatable
        #[arg(long = "member", default_value = "mongodb-shard:27018")]
        members: Vec<String>,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Wire the router: add the shard, enable sharding, index and shard the collection
    Router {
        /// Connection target of the router
        #[arg(long)]
        target: String,

        #[command(flatten)]
        topology: RouterTopologyArgs,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Run all three stages in order against their respective targets
    All {
        /// Connection target of a configuration-server node
        #[arg(long)]
        config_target: String,

        /// Connection target of a shard node
        #[arg(long)]
        shard_target: String,

        /// Connection target of the router
        #[arg(long)]
        router_target: String,

        /// Configuration-server replica set id
        #[arg(long, default_value = "configrs")]
        config_replica_set: String,

        /// Configuration-server member host:port, repeatable
        #[arg(long = "config-member", default_value = "mongodb-config:27019")]
        config_members: Vec<String>,

        /// Shard replica set id
        #[arg(long, default_value = "shardrs")]
        shard_replica_set: String,

        /// Shard member host:port, repeatable
        #[arg(long = "shard-member", default_value = "mongodb-shard:27018")]
        shard_members: Vec<String>,

        #[command(flatten)]
        topology: RouterTopologyArgs,

        #[command(flatten)]
        poll: PollArgs,
    },
}

fn replica_members(hosts: &[String]) -> Vec<ReplicaMember> {
    hosts
        .iter()
        .enumerate()
        .map(|(id, host)| ReplicaMember::new(id as u32, host))
        .collect()
}

/// Cancel the bootstrap on Ctrl-C.
fn spawn_ctrl_c_listener() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling bootstrap");
            handle.cancel();
        }
    });
    signal
}

fn exit_code_for(outcome: &StageOutcome) -> i32 {
    match outcome {
        StageOutcome::Ready => 0,
        StageOutcome::TimedOut { .. } => EXIT_TIMED_OUT,
        StageOutcome::Failed(_) => EXIT_FAILED,
    }
}

fn finish_stage(stage: Stage, outcome: StageOutcome) -> i32 {
    match &outcome {
        StageOutcome::Ready => {
            info!(%stage, "stage ready");
        }
        StageOutcome::TimedOut { elapsed, detail } => {
            error!(
                %stage,
                elapsed_ms = elapsed.as_millis() as u64,
                detail = %detail,
                "stage timed out waiting for readiness"
            );
        }
        StageOutcome::Failed(err) => {
            error!(%stage, %err, "stage failed");
        }
    }
    exit_code_for(&outcome)
}

fn finish_report(report: &BootstrapReport) -> i32 {
    match report.first_failure() {
        None => {
            info!("cluster bootstrap complete");
            0
        }
        Some(StageReport { stage, outcome }) => match outcome {
            StageOutcome::Ready => 0,
            StageOutcome::TimedOut { elapsed, detail } => {
                error!(
                    %stage,
                    elapsed_ms = elapsed.as_millis() as u64,
                    detail = %detail,
                    "bootstrap aborted: stage timed out"
                );
                EXIT_TIMED_OUT
            }
            StageOutcome::Failed(err) => {
                error!(%stage, %err, "bootstrap aborted: stage failed");
                EXIT_FAILED
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = spawn_ctrl_c_listener();

    let code = match cli.command {
        Command::ConfigServers {
            target,
            replica_set,
            members,
            poll,
        } => {
            let client = ShellAdminClient::new(target);
            let config =
                ReplicaSetConfig::config_server(replica_set, replica_members(&members))?;
            let poll = poll.to_config("config server replica set");
            let outcome = init_replica_set(&client, &config, &poll, Some(cancel)).await;
            finish_stage(Stage::ConfigServers, outcome)
        }
        Command::Shard {
            target,
            replica_set,
            members,
            poll,
        } => {
            let client = ShellAdminClient::new(target);
            let config = ReplicaSetConfig::new(replica_set, replica_members(&members))?;
            let poll = poll.to_config("shard replica set");
            let outcome = init_replica_set(&client, &config, &poll, Some(cancel)).await;
            finish_stage(Stage::Shard, outcome)
        }
        Command::Router {
            target,
            topology,
            poll,
        } => {
            let client = ShellAdminClient::new(target);
            let plan = topology.to_plan()?;
            let poll = poll.to_config("router shard list");
            let outcome = init_router(&client, &plan, &poll, Some(cancel)).await;
            finish_stage(Stage::Router, outcome)
        }
        Command::All {
            config_target,
            shard_target,
            router_target,
            config_replica_set,
            config_members,
            shard_replica_set,
            shard_members,
            topology,
            poll,
        } => {
            let config_client = ShellAdminClient::new(config_target);
            let shard_client = ShellAdminClient::new(shard_target);
            let router_client = ShellAdminClient::new(router_target);
            let plan = ClusterPlan {
                config_servers: ReplicaSetConfig::config_server(
                    config_replica_set,
                    replica_members(&config_members),
                )?,
                shard: ReplicaSetConfig::new(
                    shard_replica_set,
                    replica_members(&shard_members),
                )?,
                router: topology.to_plan()?,
            };
            let poll = poll.to_config("bootstrap");
            let report = run_cluster_bootstrap(
                &config_client as &dyn AdminClient,
                &shard_client,
                &router_client,
                &plan,
                &poll,
                Some(cancel),
            )
            .await;
            finish_report(&report)
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
