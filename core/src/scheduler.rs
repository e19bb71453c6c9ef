//! C10 — Background Schedulers (§4.10).
//!
//! Two independent periodic drivers with the same shape: walk the active
//! deployment set, run one pass per deployment, sleep, repeat. Per-
//! deployment work is serialised against itself (a slow pass never
//! overlaps the next tick for the same deployment) while different
//! deployments run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::cancellation::CancellationToken;
use crate::id::DeploymentId;

/// Supplies the set of deployments a driver should visit on a tick. An
/// external collaborator (§13) — the control plane never owns deployment
/// persistence.
#[async_trait]
pub trait ActiveDeploymentLister: Send + Sync {
  async fn list_active(&self) -> Vec<DeploymentId>;
}

/// One pass over one deployment. `health.rs`'s capture and `observer::
/// run_observer_tick` are each wrapped in a `DeploymentPass` impl by the
/// caller that owns the repositories they need.
#[async_trait]
pub trait DeploymentPass: Send + Sync {
  async fn run_once(&self, deployment_id: DeploymentId);
}

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sleeps up to `total`, checking `cancel` every [`CANCEL_POLL_INTERVAL`]
/// so shutdown never waits out a full tick interval (§5: "Init-container
/// wait: exits from the next 500 ms sleep" — the same cadence here).
async fn cancellable_sleep(total: Duration, cancel: &CancellationToken) {
  let mut remaining = total;
  while remaining > Duration::ZERO {
    if cancel.is_cancelled() {
      return;
    }
    let step = remaining.min(CANCEL_POLL_INTERVAL);
    tokio::time::sleep(step).await;
    remaining -= step;
  }
}

/// Per-deployment lock map shared across ticks of a single driver, so a
/// pass still in flight when the next tick fires blocks that one
/// deployment's new pass rather than racing it.
#[derive(Default)]
struct LockMap(Mutex<HashMap<DeploymentId, Arc<Mutex<()>>>>);

impl LockMap {
  async fn lock_for(&self, id: DeploymentId) -> Arc<Mutex<()>> {
    self.0.lock().await.entry(id).or_default().clone()
  }
}

/// Runs one driver until `cancel` fires. On shutdown, the in-flight tick
/// is drained (every spawned pass is awaited) before returning — no work
/// is orphaned mid-flight (§4.10).
pub async fn run_scheduler(
  tick_interval: Duration,
  cancel: CancellationToken,
  lister: &dyn ActiveDeploymentLister,
  pass: &dyn DeploymentPass,
) {
  let locks = LockMap::default();
  loop {
    if cancel.is_cancelled() {
      return;
    }
    let deployments = lister.list_active().await;
    stream::iter(deployments)
      .for_each_concurrent(None, |id| {
        let locks = &locks;
        let cancel = &cancel;
        async move {
          if cancel.is_cancelled() {
            return;
          }
          let lock = locks.lock_for(id).await;
          let _guard = lock.lock().await;
          pass.run_once(id).await;
        }
      })
      .await;

    if cancel.is_cancelled() {
      return;
    }
    cancellable_sleep(tick_interval, &cancel).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct FixedLister(Vec<DeploymentId>);

  #[async_trait]
  impl ActiveDeploymentLister for FixedLister {
    async fn list_active(&self) -> Vec<DeploymentId> {
      self.0.clone()
    }
  }

  struct CountingPass(Arc<AtomicU32>);

  #[async_trait]
  impl DeploymentPass for CountingPass {
    async fn run_once(&self, _deployment_id: DeploymentId) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[tokio::test]
  async fn visits_every_active_deployment_each_tick() {
    let counter = Arc::new(AtomicU32::new(0));
    let lister = FixedLister(vec![DeploymentId::new(), DeploymentId::new()]);
    let pass = CountingPass(counter.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();
    run_scheduler(Duration::from_secs(60), cancel, &lister, &pass).await;
    // Cancelled before the first tick's deployments are visited: zero
    // passes, proving shutdown is checked before work starts.
    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn runs_one_tick_worth_of_passes_before_honoring_cancellation() {
    let counter = Arc::new(AtomicU32::new(0));
    let deployments = vec![DeploymentId::new(), DeploymentId::new(), DeploymentId::new()];
    let lister = FixedLister(deployments.clone());
    let pass = CountingPass(counter.clone());
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move {
      run_scheduler(Duration::from_millis(50), cancel_clone, &lister, &pass).await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), deployments.len() as u32);
  }
}
