//! Bounded readiness polling.
//!
//! Cluster topology commands (replica-set initiation, shard registration)
//! report success asynchronously: the command returns before the cluster has
//! converged. [`wait_until_ready`] turns a one-shot status query into a
//! blocking wait with a hard wall-clock deadline, so a cluster that never
//! converges produces a timeout instead of an infinite loop.

mod cancel;
mod config;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use config::PollConfig;

use crate::core::{BootstrapError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// The last thing a poll observed before giving up.
#[derive(Debug)]
pub enum LastObserved<S> {
    /// A status document that did not satisfy the predicate.
    Status(S),
    /// A transient error from the status query.
    Error(BootstrapError),
}

/// Terminal result of a single readiness wait.
#[derive(Debug)]
pub enum PollOutcome<S> {
    /// The predicate held for an observed status.
    Ready(S),
    /// The deadline elapsed without the predicate holding.
    TimedOut {
        elapsed: Duration,
        last: Option<LastObserved<S>>,
    },
    /// A fatal error or cancellation aborted the wait early.
    Failed(BootstrapError),
}

impl<S> PollOutcome<S> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Repeatedly invoke `query` until `predicate` holds, the deadline elapses,
/// or a fatal error occurs.
///
/// `query` must be idempotent and side-effect-free from the caller's
/// perspective; `predicate` must be a pure function of the status value.
/// Transient query errors (unreachable cluster, replica set not yet
/// initiated) are retried until the deadline; fatal errors short-circuit
/// without another attempt. The deadline is wall-clock, not an iteration
/// count, so slow queries still respect the real-time bound.
///
/// At least one query is always attempted, even when the timeout is shorter
/// than the interval. Cancellation, when signalled, wins against the interval
/// sleep and returns [`BootstrapError::Cancelled`] without issuing another
/// query.
pub async fn wait_until_ready<S, Q, Fut, P>(
    mut query: Q,
    predicate: P,
    config: &PollConfig,
    mut cancel: Option<CancelSignal>,
) -> PollOutcome<S>
where
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
    P: Fn(&S) -> bool,
{
    if let Err(err) = config.validate() {
        return PollOutcome::Failed(err);
    }

    let start = Instant::now();
    let mut last = None;
    let mut attempt: u32 = 0;

    loop {
        if cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            info!(waiting_for = %config.description, "readiness wait cancelled");
            return PollOutcome::Failed(BootstrapError::Cancelled);
        }

        attempt += 1;
        debug!(waiting_for = %config.description, attempt, "querying cluster status");
        match query().await {
            Ok(status) if predicate(&status) => {
                info!(
                    waiting_for = %config.description,
                    attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ready"
                );
                return PollOutcome::Ready(status);
            }
            Ok(status) => {
                info!(waiting_for = %config.description, attempt, "not ready yet");
                last = Some(LastObserved::Status(status));
            }
            Err(err) if err.is_fatal() => {
                warn!(waiting_for = %config.description, attempt, %err, "fatal error, aborting wait");
                return PollOutcome::Failed(err);
            }
            Err(err) => {
                info!(waiting_for = %config.description, attempt, %err, "status query failed, will retry");
                last = Some(LastObserved::Error(err));
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            warn!(
                waiting_for = %config.description,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "readiness wait timed out"
            );
            return PollOutcome::TimedOut { elapsed, last };
        }

        // Never sleep past the deadline: a timeout shorter than the interval
        // still reports TimedOut at the deadline, not a full interval later.
        let wait = config.interval.min(config.timeout - elapsed);
        tokio::select! {
            _ = sleep(wait) => {}
            _ = wait_for_cancel(&mut cancel) => {
                info!(waiting_for = %config.description, "readiness wait cancelled");
                return PollOutcome::Failed(BootstrapError::Cancelled);
            }
        }
    }
}

async fn wait_for_cancel(cancel: &mut Option<CancelSignal>) {
    match cancel {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}
