//! End-to-end scenarios against the real executor and a fake engine —
//! the plan/engine boundary is the only thing faked here.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use readystackgo::cancellation::CancellationToken;
use readystackgo::clock::UtcClock;
use readystackgo::config::RsgoConfig;
use readystackgo::engine::{Container, ContainerEngine, CreateContainerRequest, EngineError, EngineResult};
use readystackgo::entities::DeploymentStatus;
use readystackgo::id::{DeploymentId, EnvironmentId, OrganizationId, StackId, UserId};
use readystackgo::manifest::ServiceLifecycle;
use readystackgo::plan::{DeploymentPlan, Step};

fn step(context: &str, image: &str, lifecycle: ServiceLifecycle, order: u32) -> Step {
  Step {
    context_name: context.to_string(),
    image: image.to_string(),
    version: "latest".to_string(),
    container_name: format!("stack_{context}"),
    internal: false,
    env_vars: IndexMap::new(),
    ports: vec![],
    volumes: vec![],
    networks: vec!["stack_default".to_string()],
    depends_on: vec![],
    lifecycle,
    order,
  }
}

fn plan_with_steps(steps: Vec<Step>) -> DeploymentPlan {
  DeploymentPlan {
    stack_version: "v1".to_string(),
    stack_name: Some("stack".to_string()),
    environment_id: None,
    global_env_vars: IndexMap::new(),
    networks: vec![],
    volumes: vec![],
    steps,
  }
}

#[derive(Default)]
struct FakeEngine {
  existing: Mutex<BTreeMap<String, Container>>,
  fail_remove: Mutex<Option<String>>,
  fail_pull: Mutex<Option<String>>,
  pull_fallback_has_local: bool,
  fail_create: Mutex<Option<String>>,
}

#[async_trait]
impl ContainerEngine for FakeEngine {
  async fn list_containers(&self) -> EngineResult<Vec<Container>> {
    Ok(self.existing.lock().unwrap().values().cloned().collect())
  }

  async fn get_container_by_name(&self, name: &str) -> EngineResult<Option<Container>> {
    Ok(self.existing.lock().unwrap().get(name).cloned())
  }

  async fn create_and_start(&self, req: CreateContainerRequest) -> EngineResult<String> {
    if self.fail_create.lock().unwrap().as_deref() == Some(req.name.as_str()) {
      return Err(EngineError::Other(anyhow::anyhow!("refused to start {}", req.name)));
    }
    Ok(format!("container-{}", req.name))
  }

  async fn remove_container(&self, id: &str, _force: bool) -> EngineResult<()> {
    if self.fail_remove.lock().unwrap().as_deref() == Some(id) {
      return Err(EngineError::Other(anyhow::anyhow!("refused to remove {id}")));
    }
    Ok(())
  }

  async fn pull_image(&self, name: &str, _tag: &str) -> EngineResult<()> {
    if self.fail_pull.lock().unwrap().as_deref() == Some(name) {
      return Err(EngineError::Other(anyhow::anyhow!("registry unreachable")));
    }
    Ok(())
  }

  async fn image_exists(&self, _name: &str, _tag: &str) -> EngineResult<bool> {
    Ok(self.pull_fallback_has_local)
  }

  async fn ensure_network(&self, _name: &str) -> EngineResult<()> {
    Ok(())
  }

  async fn get_exit_code(&self, _id: &str) -> EngineResult<Option<i64>> {
    Ok(Some(0))
  }

  async fn get_logs(&self, _id: &str, _tail: usize) -> EngineResult<String> {
    Ok(String::new())
  }
}

/// §8 "Progress monotonicity": the global percent reported across a full
/// execute is non-decreasing and ends at exactly 100 on success.
#[tokio::test]
async fn progress_monotonic_and_ends_at_100_on_success() {
  let engine = FakeEngine::default();
  let plan = plan_with_steps(vec![step("web", "nginx", ServiceLifecycle::Service, 0)]);
  let config = RsgoConfig::default();
  let cancel = CancellationToken::new();

  let percents = Mutex::new(Vec::new());
  let progress = |event: readystackgo::executor::ProgressEvent| {
    percents.lock().unwrap().push(event.global_percent);
  };
  let result =
    readystackgo::executor::execute(&plan, &engine, &config, Some(&progress), &cancel).await;

  assert!(result.success);
  let seen = percents.into_inner().unwrap();
  assert!(seen.windows(2).all(|w| w[0] <= w[1]), "percent went backwards: {seen:?}");
  assert_eq!(*seen.last().unwrap(), 100.0);
}

/// §8 "PNR": once an old container has been force-removed, a later fatal
/// failure still reports `past_point_of_no_return = true` with no
/// containers recorded as deployed.
#[tokio::test]
async fn past_point_of_no_return_on_later_failure() {
  let mut engine = FakeEngine::default();
  engine.existing.get_mut().unwrap().insert(
    "stack_web".to_string(),
    Container { id: "old-web".to_string(), name: "stack_web".to_string(), ..Default::default() },
  );
  *engine.fail_create.get_mut().unwrap() = Some("stack_app".to_string());

  let plan = plan_with_steps(vec![
    step("web", "nginx", ServiceLifecycle::Service, 0),
    step("app", "myapp", ServiceLifecycle::Service, 1),
  ]);
  let config = RsgoConfig::default();
  let cancel = CancellationToken::new();
  let result = readystackgo::executor::execute(&plan, &engine, &config, None, &cancel).await;

  assert!(!result.success);
  assert!(result.past_point_of_no_return);
}

/// §8 scenario 3: pull fails but a local image exists — execution
/// continues and the exact fallback warning text is recorded.
#[tokio::test]
async fn pull_failure_with_local_fallback_continues_and_warns() {
  let mut engine = FakeEngine::default();
  *engine.fail_pull.get_mut().unwrap() = Some("nginx".to_string());
  engine.pull_fallback_has_local = true;

  let plan = plan_with_steps(vec![step("web", "nginx", ServiceLifecycle::Service, 0)]);
  let config = RsgoConfig::default();
  let cancel = CancellationToken::new();
  let result = readystackgo::executor::execute(&plan, &engine, &config, None, &cancel).await;

  assert!(result.success);
  assert!(result.warnings.iter().any(|w| w
    == "Image 'nginx:latest' could not be pulled - using existing local image. The deployed version may be outdated."));
}

/// §8 scenario 6: an existing Running deployment upgrades to a plan
/// whose pull step fails with no local image — ends Failed, services
/// empty, no upgrade history recorded.
#[tokio::test]
async fn upgrade_failure_leaves_deployment_failed_with_no_history() {
  let clock = UtcClock;
  let mut deployment = readystackgo::deployment::Deployment::start_installation(
    DeploymentId::new(),
    EnvironmentId::new(),
    OrganizationId::new(),
    StackId::new(),
    "stack".to_string(),
    "project".to_string(),
    UserId::new(),
    &clock,
  );

  let engine = FakeEngine::default();
  let config = RsgoConfig::default();
  let cancel = CancellationToken::new();
  let v1 = plan_with_steps(vec![step("web", "nginx", ServiceLifecycle::Service, 0)]);
  let installed = readystackgo::service::execute_deployment(
    &mut deployment,
    &v1,
    &engine,
    &config,
    None,
    &cancel,
    &clock,
  )
  .await;
  assert!(installed.success);
  assert_eq!(deployment.status, DeploymentStatus::Running);

  let mut failing_engine = FakeEngine::default();
  *failing_engine.fail_pull.get_mut().unwrap() = Some("myapp".to_string());
  failing_engine.pull_fallback_has_local = false;
  let mut v2 = plan_with_steps(vec![step("web", "myapp", ServiceLifecycle::Service, 0)]);
  v2.stack_version = "v2".to_string();

  let result = readystackgo::service::execute_deployment(
    &mut deployment,
    &v2,
    &failing_engine,
    &config,
    None,
    &cancel,
    &clock,
  )
  .await;

  assert!(!result.success);
  assert_eq!(deployment.status, DeploymentStatus::Failed);
  assert!(deployment
    .services
    .iter()
    .all(|s| s.status == readystackgo::entities::ServiceRunStatus::Removed));
  assert!(deployment.upgrade_history.is_empty());
}
