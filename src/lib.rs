// ============================================================================
// shardinit Library
// ============================================================================

pub mod admin;
pub mod bootstrap;
pub mod core;
pub mod poll;

// Re-export main types for convenience
pub use crate::admin::{
    AdminClient, IndexSpec, KeyOrder, MemberStatus, Namespace, ReplicaMember, ReplicaSetConfig,
    ReplicaSetStatus, ShardKey, ShardSpec, shell::ShellAdminClient,
};
pub use crate::bootstrap::{
    BootstrapReport, ClusterPlan, RouterPlan, Stage, StageOutcome, StageReport, init_replica_set,
    init_router, run_cluster_bootstrap,
};
pub use crate::core::{BootstrapError, Result};
pub use crate::poll::{
    CancelHandle, CancelSignal, LastObserved, PollConfig, PollOutcome, cancel_pair,
    wait_until_ready,
};
