//! C7 — Deployment Aggregate.
//!
//! State machine per deployment (§3, §4.7). Every mutation is rejected if
//! it is not in the transition matrix; every mutation sets `updated_at`.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::clock::Clock;
use crate::entities::{
  DeployedService, DeploymentStatus, OperationMode, ServiceRunStatus,
  UpgradeHistoryEntry,
};
use crate::error::{RsgoError, RsgoResult};
use crate::id::{DeploymentId, EnvironmentId, OrganizationId, StackId, UserId};
use crate::manifest::{MaintenanceObserverConfig, ServiceHealthCheckConfig};

#[derive(Debug, Clone)]
pub struct Deployment {
  pub id: DeploymentId,
  pub environment_id: EnvironmentId,
  pub organization_id: OrganizationId,
  pub stack_id: StackId,
  pub stack_name: String,
  pub project_name: String,
  pub created_by: UserId,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub stack_version: String,
  pub status: DeploymentStatus,
  pub operation_mode: OperationMode,
  /// Insertion order preserved for reproducibility (§3).
  pub variables: IndexMap<String, String>,
  pub services: Vec<DeployedService>,
  pub maintenance_observer_config: Option<MaintenanceObserverConfig>,
  pub health_check_configs: Vec<ServiceHealthCheckConfig>,
  pub upgrade_history: Vec<UpgradeHistoryEntry>,
}

impl Deployment {
  pub fn start_installation(
    id: DeploymentId,
    environment_id: EnvironmentId,
    organization_id: OrganizationId,
    stack_id: StackId,
    stack_name: String,
    project_name: String,
    created_by: UserId,
    clock: &dyn Clock,
  ) -> Self {
    let now = clock.now();
    Deployment {
      id,
      environment_id,
      organization_id,
      stack_id,
      stack_name,
      project_name,
      created_by,
      created_at: now,
      updated_at: now,
      stack_version: "unspecified".to_string(),
      status: DeploymentStatus::Pending,
      operation_mode: OperationMode::Migrating,
      variables: IndexMap::new(),
      services: Vec::new(),
      maintenance_observer_config: None,
      health_check_configs: Vec::new(),
      upgrade_history: Vec::new(),
    }
  }

  fn touch(&mut self, clock: &dyn Clock) {
    self.updated_at = clock.now();
  }

  fn transition(
    &mut self,
    next: DeploymentStatus,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    if !self.status.can_transition_to(next) {
      return Err(RsgoError::Validation(format!(
        "illegal deployment status transition: {:?} -> {:?}",
        self.status, next
      )));
    }
    self.status = next;
    self.touch(clock);
    Ok(())
  }

  pub fn set_stack_version(&mut self, version: String, clock: &dyn Clock) {
    self.stack_version = version;
    self.touch(clock);
  }

  pub fn set_variables(&mut self, variables: IndexMap<String, String>, clock: &dyn Clock) {
    self.variables = variables;
    self.touch(clock);
  }

  pub fn set_maintenance_observer_config(
    &mut self,
    config: Option<MaintenanceObserverConfig>,
    clock: &dyn Clock,
  ) {
    self.maintenance_observer_config = config;
    self.touch(clock);
  }

  pub fn set_health_check_configs(
    &mut self,
    configs: Vec<ServiceHealthCheckConfig>,
    clock: &dyn Clock,
  ) {
    self.health_check_configs = configs;
    self.touch(clock);
  }

  pub fn add_service(
    &mut self,
    service: DeployedService,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    if self.services.iter().any(|s| s.service_name == service.service_name) {
      return Err(RsgoError::Validation(format!(
        "service '{}' already exists in deployment",
        service.service_name
      )));
    }
    self.services.push(service);
    self.touch(clock);
    Ok(())
  }

  pub fn set_service_container_info(
    &mut self,
    service_name: &str,
    container_id: Option<String>,
    container_name: Option<String>,
    image: Option<String>,
    status: ServiceRunStatus,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    let service = self
      .services
      .iter_mut()
      .find(|s| s.service_name == service_name)
      .ok_or_else(|| {
        RsgoError::Validation(format!("unknown service '{service_name}'"))
      })?;
    service.container_id = container_id;
    service.container_name = container_name;
    service.image = image;
    service.status = status;
    self.touch(clock);
    Ok(())
  }

  pub fn remove_service(&mut self, service_name: &str, clock: &dyn Clock) {
    self.services.retain(|s| s.service_name != service_name);
    self.touch(clock);
  }

  pub fn mark_as_running(&mut self, clock: &dyn Clock) -> RsgoResult<()> {
    self.transition(DeploymentStatus::Running, clock)?;
    self.change_operation_mode(OperationMode::Normal, "deployment running".into(), clock)?;
    Ok(())
  }

  pub fn mark_as_failed(&mut self, reason: String, clock: &dyn Clock) -> RsgoResult<()> {
    self.transition(DeploymentStatus::Failed, clock)?;
    self.change_operation_mode(OperationMode::Failed, reason, clock)?;
    Ok(())
  }

  /// §4.6: everything past PNR that is not a warning drives the
  /// deployment to Failed and writes `MarkAllServicesAsRemoved`.
  pub fn mark_all_services_as_removed(&mut self, clock: &dyn Clock) {
    for service in &mut self.services {
      service.status = ServiceRunStatus::Removed;
      service.container_id = None;
    }
    self.touch(clock);
  }

  pub fn mark_as_removed(&mut self, clock: &dyn Clock) -> RsgoResult<()> {
    self.transition(DeploymentStatus::Removed, clock)
  }

  pub fn start_upgrade_process(
    &mut self,
    _new_version: String,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    self.transition(DeploymentStatus::Upgrading, clock)
  }

  pub fn start_rollback_process(
    &mut self,
    _new_version: String,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    self.transition(DeploymentStatus::RollingBack, clock)
  }

  pub fn record_upgrade(
    &mut self,
    from: String,
    to: String,
    clock: &dyn Clock,
  ) {
    self.upgrade_history.push(UpgradeHistoryEntry {
      from_version: from,
      to_version: to.clone(),
      at_utc: clock.now(),
    });
    self.stack_version = to;
    self.touch(clock);
  }

  pub fn change_operation_mode(
    &mut self,
    mode: OperationMode,
    _reason: String,
    clock: &dyn Clock,
  ) -> RsgoResult<()> {
    if !mode.is_legal_for(self.status) {
      return Err(RsgoError::Validation(format!(
        "operation mode {mode:?} is not legal for status {:?}",
        self.status
      )));
    }
    self.operation_mode = mode;
    self.touch(clock);
    Ok(())
  }
}
