//! Shared data-model types from §3 that don't belong to a single component:
//! deployment/operation status lattices, health snapshots, observer
//! results, and the persisted release marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
  Pending,
  Running,
  Stopped,
  Failed,
  Upgrading,
  RollingBack,
  Removed,
}

impl DeploymentStatus {
  /// §3 invariants: the only legal transitions.
  pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
    use DeploymentStatus::*;
    if next == Removed {
      return self != Removed;
    }
    matches!(
      (self, next),
      (Pending, Running)
        | (Pending, Failed)
        | (Running, Upgrading)
        | (Running, Stopped)
        | (Running, Failed)
        | (Upgrading, Running)
        | (Upgrading, Failed)
        | (Failed, RollingBack)
        | (RollingBack, Running)
        | (RollingBack, Failed)
        | (Stopped, Running)
    )
  }
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
  Normal,
  Maintenance,
  Migrating,
  Stopped,
  Failed,
}

impl OperationMode {
  /// §3: `operationMode` is derived but writable — validates a write
  /// against the deployment's current status.
  pub fn is_legal_for(self, status: DeploymentStatus) -> bool {
    use DeploymentStatus as S;
    use OperationMode as M;
    match status {
      S::Pending => self == M::Migrating,
      S::Stopped => self == M::Stopped,
      S::Failed => self == M::Failed,
      S::Running => matches!(self, M::Normal | M::Maintenance),
      S::Upgrading | S::RollingBack | S::Removed => false,
    }
  }
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedService {
  pub service_name: String,
  pub container_id: Option<String>,
  pub container_name: Option<String>,
  pub image: Option<String>,
  pub status: ServiceRunStatus,
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRunStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Removed,
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
  // Ordered worst-to-best so `max` over a set is a no-op rollup.
  Unhealthy,
  Degraded,
  Unknown,
  Healthy,
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
  Healthy,
  Degraded,
  Unhealthy,
  Unknown,
}

impl From<HealthStatus> for OverallHealth {
  fn from(s: HealthStatus) -> Self {
    match s {
      HealthStatus::Healthy => OverallHealth::Healthy,
      HealthStatus::Degraded => OverallHealth::Degraded,
      HealthStatus::Unhealthy => OverallHealth::Unhealthy,
      HealthStatus::Unknown => OverallHealth::Unknown,
    }
  }
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
  pub name: String,
  pub status: HealthStatus,
  pub container_id: Option<String>,
  pub container_name: Option<String>,
  pub reason: Option<String>,
  pub restart_count: u32,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfHealth {
  pub status: HealthStatus,
  pub services: Vec<ServiceHealth>,
}

impl SelfHealth {
  pub fn empty() -> Self {
    SelfHealth { status: HealthStatus::Unknown, services: Vec::new() }
  }

  /// Worst-of rollup: `Unhealthy > Degraded > Unknown > Healthy` (§4.8 step
  /// 4, §8 "Health rollup"). An empty service list is `Unknown`.
  pub fn from_services(services: Vec<ServiceHealth>) -> Self {
    if services.is_empty() {
      return Self::empty();
    }
    let status = services.iter().map(|s| s.status).min().unwrap();
    SelfHealth { status, services }
  }
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
  pub id: crate::id::HealthSnapshotId,
  pub organization_id: crate::id::OrganizationId,
  pub environment_id: crate::id::EnvironmentId,
  pub deployment_id: crate::id::DeploymentId,
  pub stack_name: String,
  pub operation_mode: OperationMode,
  pub current_version: Option<String>,
  pub target_version: Option<String>,
  pub captured_at_utc: DateTime<Utc>,
  pub overall: OverallHealth,
  #[serde(rename = "self")]
  pub self_health: SelfHealth,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverResult {
  pub is_success: bool,
  pub observed_value: Option<String>,
  pub is_maintenance_required: bool,
  pub error_message: Option<String>,
  pub captured_at_utc: DateTime<Utc>,
}

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
  pub installed_stack_version: Option<String>,
  pub installed_contexts: std::collections::BTreeMap<String, String>,
  pub install_date: Option<DateTime<Utc>>,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeHistoryEntry {
  pub from_version: String,
  pub to_version: String,
  pub at_utc: DateTime<Utc>,
}
