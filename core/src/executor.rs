//! C6 — Deployment Executor, the hardest subsystem (§4.6).
//!
//! Drives a [`DeploymentPlan`] through named phases with phase-local
//! progress mapped onto a fixed global weighting, enforcing Point-of-No-
//! Return semantics: once the remove-old-containers phase has force-
//! removed at least one container, every later failure must be reported
//! as `past_point_of_no_return` so the caller marks the deployment Failed
//! with its services cleared (§4.6, §7, §8 "PNR").

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::cancellation::CancellationToken;
use crate::config::RsgoConfig;
use crate::engine::{ContainerEngine, CreateContainerRequest, RestartPolicy};
use crate::entities::ReleaseConfig;
use crate::manifest::ServiceLifecycle;
use crate::plan::{DeploymentPlan, Step};

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Initializing,
  Network,
  RemovingOldContainers,
  PullingImages,
  InitializingContainers,
  StartingServices,
  Complete,
  // RemoveStack-only phases.
  RemovingContainers,
  Cleanup,
}

/// Global percent span for each phase (§4.6 table).
fn span(phase: Phase) -> (f32, f32) {
  match phase {
    Phase::Initializing => (0.0, 2.0),
    Phase::Network => (2.0, 5.0),
    Phase::RemovingOldContainers => (5.0, 10.0),
    Phase::PullingImages => (10.0, 70.0),
    Phase::InitializingContainers => (70.0, 80.0),
    Phase::StartingServices => (80.0, 100.0),
    Phase::Complete => (100.0, 100.0),
    Phase::RemovingContainers => (10.0, 90.0),
    Phase::Cleanup => (95.0, 95.0),
  }
}

fn global_percent(phase: Phase, local_fraction: f32) -> f32 {
  let (start, end) = span(phase);
  (start + (end - start) * local_fraction.clamp(0.0, 1.0)).min(100.0)
}

/// The canonical progress callback signature (§9 Open Question): the
/// two init-count fields are zero when the plan has no init-lifecycle
/// steps. All invocations are synchronous with the executor's current
/// step (§9 Design Notes).
#[derive(Debug, Clone)]
pub struct ProgressEvent {
  pub phase: Phase,
  pub message: String,
  pub global_percent: f32,
  pub current_service: Option<String>,
  pub total_services: u32,
  pub completed_services: u32,
  pub total_init: u32,
  pub completed_init: u32,
}

pub type ProgressCallback<'a> = dyn Fn(ProgressEvent) + Send + Sync + 'a;

fn noop_progress(_: ProgressEvent) {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContainerInfo {
  pub service_name: String,
  pub container_id: String,
  pub container_name: String,
  pub image: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentResult {
  pub success: bool,
  pub stack_version: String,
  pub deployed_contexts: Vec<String>,
  pub deployed_containers: Vec<DeployedContainerInfo>,
  pub warnings: Vec<String>,
  pub errors: Vec<String>,
  pub deployment_time: Duration,
  pub cancelled: bool,
  /// §4.6, §8: once true, the caller must mark the deployment Failed with
  /// all services cleared, regardless of how much work actually finished.
  pub past_point_of_no_return: bool,
  pub release_config: Option<ReleaseConfig>,
}

struct Ctx<'a> {
  engine: &'a dyn ContainerEngine,
  config: &'a RsgoConfig,
  progress: &'a ProgressCallback<'a>,
  cancel: &'a CancellationToken,
  total_services: u32,
  total_init: u32,
  completed_services: u32,
  completed_init: u32,
}

impl<'a> Ctx<'a> {
  fn report(&self, phase: Phase, message: impl Into<String>, local_fraction: f32, current: Option<String>) {
    (self.progress)(ProgressEvent {
      phase,
      message: message.into(),
      global_percent: global_percent(phase, local_fraction),
      current_service: current,
      total_services: self.total_services,
      completed_services: self.completed_services,
      total_init: self.total_init,
      completed_init: self.completed_init,
    });
  }
}

/// A result carried out of a phase: either it completed, the executor was
/// cancelled, or it failed (fatally, or as a fallback warning).
enum StepOutcome {
  Ok,
  OkWithWarning(String),
  Cancelled,
  Fatal(String),
}

#[instrument(
  "ExecuteDeployment",
  skip_all,
  fields(
    stack = %plan.stack_name.clone().unwrap_or_default(),
    version = %plan.stack_version,
    steps = plan.steps.len(),
  )
)]
pub async fn execute(
  plan: &DeploymentPlan,
  engine: &dyn ContainerEngine,
  config: &RsgoConfig,
  progress: Option<&ProgressCallback<'_>>,
  cancel: &CancellationToken,
) -> DeploymentResult {
  let start = Instant::now();
  info!("starting deployment execution");
  let noop: &ProgressCallback = &noop_progress;
  let progress = progress.unwrap_or(noop);

  let total_services = plan
    .steps
    .iter()
    .filter(|s| s.lifecycle == ServiceLifecycle::Service)
    .count() as u32;
  let total_init = plan
    .steps
    .iter()
    .filter(|s| s.lifecycle == ServiceLifecycle::Init)
    .count() as u32;

  let mut ctx = Ctx {
    engine,
    config,
    progress,
    cancel,
    total_services,
    total_init,
    completed_services: 0,
    completed_init: 0,
  };

  let mut result = DeploymentResult {
    stack_version: plan.stack_version.clone(),
    ..Default::default()
  };

  let stack_name = plan.stack_name.clone().unwrap_or_default();
  let environment_id = plan.environment_id.clone().unwrap_or_default();

  // Phase: Initializing.
  ctx.report(Phase::Initializing, "Initializing deployment", 1.0, None);
  if cancel.is_cancelled() {
    info!("execution cancelled before any work started");
    result.cancelled = true;
    return result;
  }

  // Phase: Network.
  ctx.report(Phase::Network, "Ensuring networks", 0.0, None);
  let non_external: Vec<&str> = plan
    .networks
    .iter()
    .filter(|n| !n.external)
    .map(|n| n.name.as_str())
    .collect();
  let to_ensure: Vec<String> = if plan.networks.is_empty() {
    vec![format!("{stack_name}_default")]
  } else {
    non_external.into_iter().map(str::to_string).collect()
  };
  for network in &to_ensure {
    if cancel.is_cancelled() {
      result.cancelled = true;
      return result;
    }
    if let Err(e) = engine.ensure_network(network).await {
      result.errors.push(format!("failed to ensure network '{network}': {e}"));
      return result;
    }
  }
  ctx.report(Phase::Network, "Networks ready", 1.0, None);

  // Phase: RemovingOldContainers — Point of No Return.
  ctx.report(Phase::RemovingOldContainers, "Removing old containers", 0.0, None);
  let total_steps = plan.steps.len().max(1) as f32;
  for (i, step) in plan.steps.iter().enumerate() {
    if cancel.is_cancelled() {
      // Cancellation mid-removal is clean only if nothing has been
      // force-removed yet (§5); `past_point_of_no_return` already
      // reflects that.
      result.cancelled = true;
      return result;
    }
    match engine.get_container_by_name(&step.container_name).await {
      Ok(Some(existing)) => {
        match engine.remove_container(&existing.id, true).await {
          Ok(()) => {
            if !result.past_point_of_no_return {
              debug!("point of no return crossed, removed '{}'", step.container_name);
            }
            result.past_point_of_no_return = true;
          }
          Err(e) => {
            error!("failed to remove existing container '{}': {e}", step.container_name);
            result.errors.push(format!(
              "failed to remove existing container '{}': {e}",
              step.container_name
            ));
            return result;
          }
        }
      }
      Ok(None) => {}
      Err(e) => {
        if result.past_point_of_no_return {
          error!("engine error while removing old containers: {e}");
          result.errors.push(format!("engine error while removing old containers: {e}"));
          return result;
        }
        error!("engine unavailable: {e}");
        result.errors.push(format!("engine unavailable: {e}"));
        return result;
      }
    }
    ctx.report(
      Phase::RemovingOldContainers,
      format!("Checked '{}' for an existing container", step.container_name),
      (i + 1) as f32 / total_steps,
      Some(step.context_name.clone()),
    );
  }

  // Phase: PullingImages.
  ctx.report(Phase::PullingImages, "Pulling images", 0.0, None);
  for (i, step) in plan.steps.iter().enumerate() {
    if cancel.is_cancelled() {
      result.cancelled = true;
      return result;
    }
    match pull_one(&ctx, step).await {
      StepOutcome::Ok => {}
      StepOutcome::OkWithWarning(msg) => {
        result.warnings.push(msg);
      }
      StepOutcome::Cancelled => {
        result.cancelled = true;
        return result;
      }
      StepOutcome::Fatal(msg) => {
        result.errors.push(msg);
        return result;
      }
    }
    ctx.report(
      Phase::PullingImages,
      format!("Pulled image for '{}'", step.context_name),
      (i + 1) as f32 / total_steps,
      Some(step.context_name.clone()),
    );
  }

  // Phase: InitializingContainers.
  ctx.report(Phase::InitializingContainers, "Starting init containers", 0.0, None);
  let init_steps: Vec<&Step> = plan
    .steps
    .iter()
    .filter(|s| s.lifecycle == ServiceLifecycle::Init)
    .collect();
  for step in &init_steps {
    if cancel.is_cancelled() {
      result.cancelled = true;
      return result;
    }
    match run_init_container(&ctx, step, &stack_name, &environment_id).await {
      StepOutcome::Ok => {
        ctx.completed_init += 1;
        ctx.report(
          Phase::InitializingContainers,
          format!("Init container '{}' completed", step.context_name),
          ctx.completed_init as f32 / total_init.max(1) as f32,
          Some(step.context_name.clone()),
        );
      }
      StepOutcome::OkWithWarning(msg) => {
        ctx.completed_init += 1;
        result.warnings.push(msg);
      }
      StepOutcome::Cancelled => {
        result.cancelled = true;
        return result;
      }
      StepOutcome::Fatal(msg) => {
        result.errors.push(msg);
        return result;
      }
    }
  }

  // Phase: StartingServices.
  ctx.report(Phase::StartingServices, "Starting services", 0.0, None);
  let service_steps: Vec<&Step> = plan
    .steps
    .iter()
    .filter(|s| s.lifecycle == ServiceLifecycle::Service)
    .collect();
  for step in &service_steps {
    if cancel.is_cancelled() {
      result.cancelled = true;
      return result;
    }
    let labels = [
      ("rsgo.stack".to_string(), stack_name.clone()),
      ("rsgo.context".to_string(), step.context_name.clone()),
      ("rsgo.environment".to_string(), environment_id.clone()),
      ("rsgo.lifecycle".to_string(), "service".to_string()),
    ]
    .into_iter()
    .collect();

    let req = CreateContainerRequest {
      name: step.container_name.clone(),
      image: step.full_image(),
      env_vars: step.env_vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
      ports: step.ports.clone(),
      volumes: parse_volume_pairs(&step.volumes),
      networks: step.networks.clone(),
      network_aliases: vec![step.context_name.clone()],
      labels,
      restart_policy: RestartPolicy::UnlessStopped,
    };

    match ctx.engine.create_and_start(req).await {
      Ok(container_id) => {
        result.deployed_contexts.push(step.context_name.clone());
        result.deployed_containers.push(DeployedContainerInfo {
          service_name: step.context_name.clone(),
          container_id,
          container_name: step.container_name.clone(),
          image: step.full_image(),
        });
        ctx.completed_services += 1;
        ctx.report(
          Phase::StartingServices,
          format!("Started service '{}'", step.context_name),
          ctx.completed_services as f32 / total_services.max(1) as f32,
          Some(step.context_name.clone()),
        );
      }
      Err(e) => {
        result.errors.push(format!(
          "failed to start service '{}': {e}",
          step.context_name
        ));
        return result;
      }
    }
  }

  // Phase: Complete.
  let release_config = ReleaseConfig {
    installed_stack_version: Some(plan.stack_version.clone()),
    installed_contexts: plan
      .steps
      .iter()
      .map(|s| (s.context_name.clone(), plan.stack_version.clone()))
      .collect(),
    install_date: None,
  };
  result.release_config = Some(release_config);
  result.success = true;
  result.deployment_time = start.elapsed();
  info!("deployment execution completed in {:?}", result.deployment_time);
  ctx.report(Phase::Complete, "Deployment complete", 1.0, None);
  result
}

fn parse_volume_pairs(specs: &[String]) -> std::collections::BTreeMap<String, String> {
  specs
    .iter()
    .filter_map(|s| s.split_once(':').map(|(a, b)| (a.to_string(), b.to_string())))
    .collect()
}

async fn pull_one(ctx: &Ctx<'_>, step: &Step) -> StepOutcome {
  if ctx.cancel.is_cancelled() {
    return StepOutcome::Cancelled;
  }
  if let Err(e) = ctx.engine.pull_image(&step.image, &step.version).await {
    warn!("pull failed for '{}': {e}", step.full_image());
    match ctx.engine.image_exists(&step.image, &step.version).await {
      Ok(true) => {
        let message = format!(
          "Image '{}' could not be pulled - using existing local image. The deployed version may be outdated.",
          step.full_image()
        );
        warn!("{message}");
        ctx.report(Phase::PullingImages, message.clone(), 0.0, Some(step.context_name.clone()));
        StepOutcome::OkWithWarning(message)
      }
      _ => {
        error!("no local image for '{}', failing deployment", step.full_image());
        StepOutcome::Fatal(format!(
          "failed to pull image '{}' for service '{}' and no local image exists",
          step.full_image(),
          step.context_name
        ))
      }
    }
  } else {
    StepOutcome::Ok
  }
}

async fn run_init_container(
  ctx: &Ctx<'_>,
  step: &Step,
  stack_name: &str,
  environment_id: &str,
) -> StepOutcome {
  let labels = [
    ("rsgo.stack".to_string(), stack_name.to_string()),
    ("rsgo.context".to_string(), step.context_name.clone()),
    ("rsgo.environment".to_string(), environment_id.to_string()),
    ("rsgo.lifecycle".to_string(), "init".to_string()),
  ]
  .into_iter()
  .collect();

  let req = CreateContainerRequest {
    name: step.container_name.clone(),
    image: step.full_image(),
    env_vars: step.env_vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    ports: vec![],
    volumes: parse_volume_pairs(&step.volumes),
    networks: step.networks.clone(),
    network_aliases: vec![step.context_name.clone()],
    labels,
    restart_policy: RestartPolicy::OnFailure,
  };

  if let Err(e) = ctx.engine.create_and_start(req).await {
    return StepOutcome::Fatal(format!(
      "failed to start init container '{}': {e}",
      step.context_name
    ));
  }

  let deadline = Instant::now() + ctx.config.init_container_timeout;
  loop {
    if ctx.cancel.is_cancelled() {
      return StepOutcome::Cancelled;
    }
    match ctx.engine.get_container_by_name(&step.container_name).await {
      Ok(None) => {
        return StepOutcome::Fatal(format!(
          "init container '{}' disappeared before completing",
          step.context_name
        ));
      }
      Ok(Some(container)) => {
        if container.state.to_lowercase().starts_with("exited") {
          let exit_code = ctx
            .engine
            .get_exit_code(&container.id)
            .await
            .ok()
            .flatten();
          return match exit_code {
            Some(0) => StepOutcome::Ok,
            other => {
              let logs = ctx
                .engine
                .get_logs(&container.id, 50)
                .await
                .unwrap_or_default();
              error!("init container '{}' failed with exit code {other:?}", step.context_name);
              StepOutcome::Fatal(format!(
                "init container '{}' failed (exit code: {other:?})\n--- last 50 log lines ---\n{logs}",
                step.context_name
              ))
            }
          };
        }
      }
      Err(e) => {
        return StepOutcome::Fatal(format!(
          "engine error while polling init container '{}': {e}",
          step.context_name
        ));
      }
    }
    if Instant::now() >= deadline {
      let logs = ctx
        .engine
        .get_logs(&step.container_name, 50)
        .await
        .unwrap_or_default();
      return StepOutcome::Fatal(format!(
        "init container '{}' timed out after {:?}\n--- last 50 log lines ---\n{logs}",
        step.context_name, ctx.config.init_container_timeout
      ));
    }
    tokio::time::sleep(ctx.config.init_container_poll_interval).await;
  }
}

/// §4.6 "RemoveStack": force-removes every container labeled
/// `rsgo.stack == name`, collecting errors but never aborting.
#[instrument("RemoveStack", skip_all, fields(stack = %stack_name))]
pub async fn remove_stack(
  engine: &dyn ContainerEngine,
  stack_name: &str,
  installed_version: Option<&str>,
  release_config: Option<&ReleaseConfig>,
  progress: Option<&ProgressCallback<'_>>,
  cancel: &CancellationToken,
) -> DeploymentResult {
  let start = Instant::now();
  info!("removing stack");
  let noop: &ProgressCallback = &noop_progress;
  let progress = progress.unwrap_or(noop);
  let mut result = DeploymentResult::default();

  let report = |phase: Phase, message: String, fraction: f32| {
    progress(ProgressEvent {
      phase,
      message,
      global_percent: global_percent(phase, fraction),
      current_service: None,
      total_services: 0,
      completed_services: 0,
      total_init: 0,
      completed_init: 0,
    });
  };

  report(Phase::RemovingContainers, "Listing stack containers".to_string(), 0.0);
  let containers = match engine.list_containers().await {
    Ok(c) => c,
    Err(e) => {
      result.errors.push(format!("failed to list containers: {e}"));
      return result;
    }
  };
  let matching: Vec<_> = containers
    .into_iter()
    .filter(|c| c.labels.get("rsgo.stack").map(String::as_str) == Some(stack_name))
    .collect();

  let total = matching.len().max(1) as f32;
  for (i, container) in matching.iter().enumerate() {
    if cancel.is_cancelled() {
      result.cancelled = true;
      return result;
    }
    if let Err(e) = engine.remove_container(&container.id, true).await {
      result
        .errors
        .push(format!("failed to remove container '{}': {e}", container.name));
    }
    report(
      Phase::RemovingContainers,
      format!("Removed container '{}'", container.name),
      (i + 1) as f32 / total,
    );
  }

  report(Phase::Cleanup, "Cleaning up release metadata".to_string(), 1.0);
  let version_matches = release_config
    .and_then(|rc| rc.installed_stack_version.as_deref())
    .zip(installed_version)
    .map(|(a, b)| a == b)
    .unwrap_or(true);
  if version_matches {
    result.release_config = None;
  } else {
    result.release_config = release_config.cloned();
  }

  result.success = result.errors.is_empty();
  result.deployment_time = start.elapsed();
  report(Phase::Complete, "Stack removed".to_string(), 1.0);
  result
}
