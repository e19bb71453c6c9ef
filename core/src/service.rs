//! §6 "Exposed to upstream" — the facade a REST/SignalR layer calls
//! through. Wires C1/C3/C5/C6/C7/C8/C9 together; owns no persistence
//! itself, the `Deployment` and `ReleaseConfig` rows it mutates are handed
//! back to the caller to persist (§6: "Persistence" is an external
//! collaborator).

use crate::cancellation::CancellationToken;
use crate::config::RsgoConfig;
use crate::deployment::Deployment;
use crate::engine::ContainerEngine;
use crate::entities::{DeployedService, DeploymentStatus, ObserverResult, ServiceRunStatus};
use crate::executor::{self, DeploymentResult, ProgressCallback};
use crate::health::{self, CaptureRequest};
use crate::id::{DeploymentId, EnvironmentId, OrganizationId};
use crate::notify::{
  DeploymentDetailEvent, DeploymentSummaryEvent, EnvironmentSummaryEvent, NotificationEvent,
  NotificationSink, ObserverResultEvent,
};
use crate::observer::{self, ObserverOutcome, SqlConnector};
use crate::plan::DeploymentPlan;
use crate::registry_probe::{self, AccessClassification, RegistryCredentials};
use cache::TimeoutCache;

/// `ExecuteDeployment(plan, progressCb, ctx) -> DeploymentResult` (§6).
///
/// Installs a fresh deployment, or drives an existing one through
/// Upgrading/RollingBack depending on its current status (§4.6): a
/// `Running` deployment upgrades in place, a `Failed` deployment rolls
/// back. Both paths clear old services and record history on success,
/// and mark the deployment `Failed` with services cleared on failure.
pub async fn execute_deployment(
  deployment: &mut Deployment,
  plan: &DeploymentPlan,
  engine: &dyn ContainerEngine,
  config: &RsgoConfig,
  progress: Option<&ProgressCallback<'_>>,
  cancel: &CancellationToken,
  clock: &dyn crate::clock::Clock,
) -> DeploymentResult {
  let previous_version = deployment.stack_version.clone();
  let is_reinstall = matches!(
    deployment.status,
    DeploymentStatus::Running | DeploymentStatus::Failed
  );

  if is_reinstall {
    let transitioned = match deployment.status {
      DeploymentStatus::Running => {
        deployment.start_upgrade_process(plan.stack_version.clone(), clock)
      }
      DeploymentStatus::Failed => {
        deployment.start_rollback_process(plan.stack_version.clone(), clock)
      }
      _ => unreachable!(),
    };
    if transitioned.is_err() {
      let mut result = DeploymentResult::default();
      result.errors.push("deployment is not in a state that allows execution".to_string());
      return result;
    }
  }

  let mut result = executor::execute(plan, engine, config, progress, cancel).await;

  if result.success {
    deployment.mark_all_services_as_removed(clock);
    for container in &result.deployed_containers {
      let _ = deployment.add_service(
        DeployedService {
          service_name: container.service_name.clone(),
          container_id: Some(container.container_id.clone()),
          container_name: Some(container.container_name.clone()),
          image: Some(container.image.clone()),
          status: ServiceRunStatus::Running,
        },
        clock,
      );
    }
    if is_reinstall {
      deployment.record_upgrade(previous_version, plan.stack_version.clone(), clock);
    } else {
      deployment.set_stack_version(plan.stack_version.clone(), clock);
    }
    if let Err(e) = deployment.mark_as_running(clock) {
      error!("deployment {} could not transition to Running after a successful execute: {e}", deployment.id);
      result.errors.push(format!("deployment succeeded but could not transition to Running: {e}"));
    }
  } else if result.cancelled {
    // Pre-PNR cancellation leaves the deployment exactly as it was; the
    // caller decides whether to retry (§5).
  } else {
    deployment.mark_all_services_as_removed(clock);
    let reason = result.errors.join("; ");
    let _ = deployment.mark_as_failed(reason, clock);
  }

  result
}

/// `RemoveStack(envId, stackName, progressCb?, ctx) -> DeploymentResult`.
pub async fn remove_stack(
  deployment: &mut Deployment,
  engine: &dyn ContainerEngine,
  progress: Option<&ProgressCallback<'_>>,
  cancel: &CancellationToken,
  clock: &dyn crate::clock::Clock,
) -> DeploymentResult {
  let result = executor::remove_stack(
    engine,
    &deployment.stack_name,
    Some(&deployment.stack_version),
    None,
    progress,
    cancel,
  )
  .await;
  if result.success {
    deployment.mark_all_services_as_removed(clock);
    let _ = deployment.mark_as_removed(clock);
  }
  result
}

/// `CaptureHealthSnapshot(orgId, envId, deploymentId, stackName,
/// currentVersion?, ctx) -> HealthSnapshot`. Publishes the per-deployment
/// detail and summary events (§4.8 step 6) so a caller doesn't have to
/// re-derive `overall` from the snapshot to raise its own summary event.
pub async fn capture_health_snapshot(
  engine: &dyn ContainerEngine,
  organization_id: OrganizationId,
  environment_id: EnvironmentId,
  deployment: &Deployment,
  notifications: &dyn NotificationSink,
  clock: &dyn crate::clock::Clock,
) -> crate::entities::HealthSnapshot {
  let snapshot = health::capture_health_snapshot(
    engine,
    CaptureRequest {
      organization_id,
      environment_id,
      deployment_id: deployment.id,
      stack_name: &deployment.stack_name,
      current_version: Some(deployment.stack_version.clone()),
      deployment_status: deployment.status,
      running_deployment_operation_mode: Some(deployment.operation_mode),
    },
    clock,
  )
  .await;

  notifications
    .publish(NotificationEvent::DeploymentSummary(DeploymentSummaryEvent {
      deployment_id: deployment.id,
      stack_name: deployment.stack_name.clone(),
      overall: snapshot.overall,
    }))
    .await;
  notifications
    .publish(NotificationEvent::DeploymentDetail(DeploymentDetailEvent {
      snapshot: snapshot.clone(),
    }))
    .await;

  snapshot
}

/// §4.8 step 6 "per-environment summary aggregate": call once per tick
/// after collecting every deployment's snapshot in an environment.
pub async fn publish_environment_summary(
  environment_id: EnvironmentId,
  snapshots: &[crate::entities::HealthSnapshot],
  notifications: &dyn NotificationSink,
) {
  let summary = health::summarize_environment(snapshots);
  notifications
    .publish(NotificationEvent::EnvironmentSummary(EnvironmentSummaryEvent {
      environment_id,
      summary,
    }))
    .await;
}

/// `CheckDeploymentObserver(deploymentId, ctx) -> ObserverResult?`. Also
/// applies the resulting mode change to `deployment` (§4.9 step 5) so the
/// caller only has to persist what comes back, and publishes the result as
/// an event (§4.9 step 4) whenever a check actually ran.
pub async fn check_deployment_observer(
  deployment: &mut Deployment,
  cache: &TimeoutCache<DeploymentId, Option<ObserverResult>>,
  sql: &dyn SqlConnector,
  http_client: &reqwest::Client,
  notifications: &dyn NotificationSink,
  clock: &dyn crate::clock::Clock,
) -> Option<ObserverResult> {
  let outcome = observer::run_observer_tick(
    deployment.id,
    deployment.status == DeploymentStatus::Running,
    deployment.maintenance_observer_config.as_ref(),
    &deployment.variables,
    cache,
    sql,
    http_client,
    clock,
  )
  .await;

  match outcome {
    ObserverOutcome::Skipped(_) => None,
    ObserverOutcome::Cached(result) => Some(result),
    ObserverOutcome::Checked { result, mode_change } => {
      if let Some(decision) = mode_change {
        if let Err(e) = deployment.change_operation_mode(decision.mode, decision.reason, clock) {
          warn!("deployment {} observer mode change rejected: {e}", deployment.id);
        }
      }
      notifications
        .publish(NotificationEvent::ObserverResult(ObserverResultEvent {
          deployment_id: deployment.id,
          result: result.clone(),
        }))
        .await;
      Some(result)
    }
  }
}

/// `CheckAccess(host, ns, repo, credentials?, ctx) -> {Public|AuthRequired|Unknown}`.
pub async fn check_access(
  client: &reqwest::Client,
  host: &str,
  namespace: &str,
  repo: &str,
  credentials: Option<&RegistryCredentials>,
) -> AccessClassification {
  registry_probe::check_access(client, host, namespace, repo, credentials).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::FixedClock;
  use crate::engine::{Container, CreateContainerRequest, EngineResult};
  use crate::id::{StackId, UserId};
  use crate::plan::DeploymentPlan;
  use async_trait::async_trait;
  use chrono::Utc;
  use indexmap::IndexMap;

  struct AlwaysSucceedsEngine;

  #[async_trait]
  impl ContainerEngine for AlwaysSucceedsEngine {
    async fn list_containers(&self) -> EngineResult<Vec<Container>> {
      Ok(vec![])
    }
    async fn get_container_by_name(&self, _: &str) -> EngineResult<Option<Container>> {
      Ok(None)
    }
    async fn create_and_start(&self, req: CreateContainerRequest) -> EngineResult<String> {
      Ok(format!("container-for-{}", req.name))
    }
    async fn remove_container(&self, _: &str, _: bool) -> EngineResult<()> {
      Ok(())
    }
    async fn pull_image(&self, _: &str, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn image_exists(&self, _: &str, _: &str) -> EngineResult<bool> {
      Ok(true)
    }
    async fn ensure_network(&self, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn get_exit_code(&self, _: &str) -> EngineResult<Option<i64>> {
      Ok(Some(0))
    }
    async fn get_logs(&self, _: &str, _: usize) -> EngineResult<String> {
      Ok(String::new())
    }
  }

  fn fresh_deployment(clock: &FixedClock) -> Deployment {
    Deployment::start_installation(
      DeploymentId::new(),
      EnvironmentId::new(),
      OrganizationId::new(),
      StackId::new(),
      "stack".into(),
      "project".into(),
      UserId::new(),
      clock,
    )
  }

  fn trivial_plan() -> DeploymentPlan {
    DeploymentPlan {
      stack_version: "v1".into(),
      stack_name: Some("stack".into()),
      environment_id: None,
      global_env_vars: IndexMap::new(),
      networks: vec![],
      volumes: vec![],
      steps: vec![],
    }
  }

  #[tokio::test]
  async fn execute_deployment_installs_and_marks_running() {
    let clock = FixedClock(Utc::now());
    let mut deployment = fresh_deployment(&clock);
    let engine = AlwaysSucceedsEngine;
    let config = RsgoConfig::default();
    let cancel = CancellationToken::new();
    let result = execute_deployment(
      &mut deployment,
      &trivial_plan(),
      &engine,
      &config,
      None,
      &cancel,
      &clock,
    )
    .await;
    assert!(result.success);
    assert_eq!(deployment.status, DeploymentStatus::Running);
    assert_eq!(deployment.stack_version, "v1");
  }

  #[tokio::test]
  async fn reinstalling_a_failed_deployment_rolls_back_to_running() {
    let clock = FixedClock(Utc::now());
    let mut deployment = fresh_deployment(&clock);
    let engine = AlwaysSucceedsEngine;
    let config = RsgoConfig::default();
    let cancel = CancellationToken::new();
    execute_deployment(&mut deployment, &trivial_plan(), &engine, &config, None, &cancel, &clock)
      .await;
    deployment.mark_as_failed("boom".into(), &clock).unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);

    let result =
      execute_deployment(&mut deployment, &trivial_plan(), &engine, &config, None, &cancel, &clock)
        .await;
    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(deployment.status, DeploymentStatus::Running);
  }

  #[tokio::test]
  async fn reinstalling_a_running_deployment_records_upgrade_history() {
    let clock = FixedClock(Utc::now());
    let mut deployment = fresh_deployment(&clock);
    let engine = AlwaysSucceedsEngine;
    let config = RsgoConfig::default();
    let cancel = CancellationToken::new();
    execute_deployment(&mut deployment, &trivial_plan(), &engine, &config, None, &cancel, &clock)
      .await;

    let mut plan_v2 = trivial_plan();
    plan_v2.stack_version = "v2".into();
    let result =
      execute_deployment(&mut deployment, &plan_v2, &engine, &config, None, &cancel, &clock).await;
    assert!(result.success);
    assert_eq!(deployment.upgrade_history.len(), 1);
    assert_eq!(deployment.stack_version, "v2");
  }
}
