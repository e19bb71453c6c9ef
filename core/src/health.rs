//! C8 — Health Aggregator.
//!
//! Collects per-container states, maps them onto the three-level status
//! lattice, and builds per-stack snapshots with change events (§4.8).
//! Container-engine errors are swallowed into an empty `SelfHealth` so the
//! stack still receives a snapshot — transport errors never propagate.

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::clock::Clock;
use crate::engine::{Container, ContainerEngine};
use crate::entities::{
  DeploymentStatus, HealthSnapshot, HealthStatus, OperationMode,
  OverallHealth, SelfHealth, ServiceHealth,
};
use crate::id::{DeploymentId, EnvironmentId, HealthSnapshotId, OrganizationId};

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

pub struct CaptureRequest<'a> {
  pub organization_id: OrganizationId,
  pub environment_id: EnvironmentId,
  pub deployment_id: DeploymentId,
  pub stack_name: &'a str,
  pub current_version: Option<String>,
  pub deployment_status: DeploymentStatus,
  pub running_deployment_operation_mode: Option<OperationMode>,
}

fn normalize_name(name: &str) -> String {
  name.to_lowercase().replace(['.', '_'], "-")
}

fn belongs_to_stack(container: &Container, stack_name: &str) -> bool {
  if let Some(project) = container.labels.get(COMPOSE_PROJECT_LABEL) {
    if project.eq_ignore_ascii_case(stack_name) {
      return true;
    }
  }
  let name = normalize_name(container.name.trim_start_matches('/'));
  name.starts_with(&normalize_name(stack_name))
}

fn service_name_for(container: &Container) -> String {
  container
    .labels
    .get(COMPOSE_SERVICE_LABEL)
    .cloned()
    .unwrap_or_else(|| container.name.trim_start_matches('/').to_string())
}

/// §4.8 step 3: maps a container's reported health/state onto the lattice.
fn classify(container: &Container) -> (HealthStatus, Option<String>) {
  if let Some(health) = container.health_status.as_deref() {
    if !health.eq_ignore_ascii_case("none") {
      return match health.to_lowercase().as_str() {
        "healthy" => (HealthStatus::Healthy, None),
        "unhealthy" => (
          HealthStatus::Unhealthy,
          Some(format!(
            "Health check failing (streak: {})",
            container.failing_streak
          )),
        ),
        "starting" => (
          HealthStatus::Degraded,
          Some("Container starting, health check pending".to_string()),
        ),
        other => (HealthStatus::Unknown, Some(format!("Unknown state: {other}"))),
      };
    }
  }

  match container.state.to_lowercase().as_str() {
    "running" => (HealthStatus::Healthy, None),
    "restarting" => (
      HealthStatus::Degraded,
      Some("Container is restarting".to_string()),
    ),
    "paused" => (HealthStatus::Degraded, Some("Container is paused".to_string())),
    "exited" => (
      HealthStatus::Unhealthy,
      Some(format!("Container exited (status: {})", container.status)),
    ),
    "dead" => (HealthStatus::Unhealthy, Some("Container is dead".to_string())),
    "created" => (
      HealthStatus::Unknown,
      Some("Container created but not started".to_string()),
    ),
    other => (HealthStatus::Unknown, Some(format!("Unknown state: {other}"))),
  }
}

fn derive_operation_mode(
  status: DeploymentStatus,
  running_mode: Option<OperationMode>,
) -> OperationMode {
  match status {
    DeploymentStatus::Pending => OperationMode::Migrating,
    DeploymentStatus::Stopped => OperationMode::Stopped,
    DeploymentStatus::Failed | DeploymentStatus::RollingBack => OperationMode::Failed,
    DeploymentStatus::Running | DeploymentStatus::Upgrading => {
      running_mode.unwrap_or(OperationMode::Normal)
    }
    DeploymentStatus::Removed => OperationMode::Stopped,
  }
}

/// Captures a [`HealthSnapshot`] for one deployment. Never propagates a
/// container-engine transport error; an unreachable engine yields an
/// empty `SelfHealth` instead (§4.8 final paragraph).
#[instrument("CaptureHealthSnapshot", skip_all, fields(stack = %req.stack_name))]
pub async fn capture_health_snapshot(
  engine: &dyn ContainerEngine,
  req: CaptureRequest<'_>,
  clock: &dyn Clock,
) -> HealthSnapshot {
  let self_health = match engine.list_containers().await {
    Ok(containers) => {
      let services: Vec<ServiceHealth> = containers
        .iter()
        .filter(|c| belongs_to_stack(c, req.stack_name))
        .map(|c| {
          let (status, reason) = classify(c);
          if status != HealthStatus::Healthy {
            debug!("service '{}' classified {:?}: {:?}", service_name_for(c), status, reason);
          }
          ServiceHealth {
            name: service_name_for(c),
            status,
            container_id: Some(c.id.clone()),
            container_name: Some(c.name.clone()),
            reason,
            restart_count: c.failing_streak,
          }
        })
        .collect();
      SelfHealth::from_services(services)
    }
    Err(e) => {
      warn!("engine unreachable while capturing health for '{}': {e}", req.stack_name);
      SelfHealth::empty()
    }
  };

  let operation_mode =
    derive_operation_mode(req.deployment_status, req.running_deployment_operation_mode);

  HealthSnapshot {
    id: HealthSnapshotId::new(),
    organization_id: req.organization_id,
    environment_id: req.environment_id,
    deployment_id: req.deployment_id,
    stack_name: req.stack_name.to_string(),
    operation_mode,
    current_version: req.current_version,
    target_version: None,
    captured_at_utc: clock.now(),
    overall: OverallHealth::from(self_health.status),
    self_health,
  }
}

/// §9 Open Question: a container recorded in an expected-service set but
/// absent from the engine's listing is `Unhealthy` / "Container vanished".
pub fn vanished_service_health(service_name: &str) -> ServiceHealth {
  ServiceHealth {
    name: service_name.to_string(),
    status: HealthStatus::Unhealthy,
    container_id: None,
    container_name: None,
    reason: Some("Container vanished".to_string()),
    restart_count: 0,
  }
}

/// §4.8 step 6: per-environment aggregate across many stacks' snapshots.
#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHealthSummary {
  pub total: u32,
  pub healthy: u32,
  pub degraded: u32,
  pub unhealthy: u32,
  pub stacks: Vec<String>,
}

#[instrument("SummarizeEnvironment", skip_all, fields(stacks = snapshots.len()))]
pub fn summarize_environment(snapshots: &[HealthSnapshot]) -> EnvironmentHealthSummary {
  let mut summary = EnvironmentHealthSummary {
    total: snapshots.len() as u32,
    stacks: snapshots.iter().map(|s| s.stack_name.clone()).collect(),
    ..Default::default()
  };
  for snapshot in snapshots {
    match snapshot.overall {
      OverallHealth::Healthy => summary.healthy += 1,
      OverallHealth::Degraded => summary.degraded += 1,
      OverallHealth::Unhealthy => summary.unhealthy += 1,
      OverallHealth::Unknown => {}
    }
  }
  info!(
    "environment summary: {} healthy, {} degraded, {} unhealthy of {}",
    summary.healthy, summary.degraded, summary.unhealthy, summary.total
  );
  summary
}
