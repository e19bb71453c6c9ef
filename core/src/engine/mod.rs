//! C1 — Container Engine Adapter.
//!
//! A thin capability contract over a Docker-compatible HTTP API (§4.1).
//! Failures are surfaced unchanged to callers; implementations must not
//! retry transparently — that policy belongs to the executor (§6 errors
//! `PullFailed`, `EngineUnavailable`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

pub mod bollard_engine;

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
  pub id: String,
  pub name: String,
  pub image: String,
  /// Raw engine state: `running`, `exited`, `restarting`, `paused`,
  /// `dead`, `created`, ...
  pub state: String,
  pub status: String,
  /// `healthy` / `unhealthy` / `starting` / `none`, when the container
  /// declares a HEALTHCHECK.
  pub health_status: Option<String>,
  pub failing_streak: u32,
  pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateContainerRequest {
  pub name: String,
  pub image: String,
  pub env_vars: BTreeMap<String, String>,
  /// `host:container[/proto]`.
  pub ports: Vec<String>,
  pub volumes: BTreeMap<String, String>,
  pub networks: Vec<String>,
  pub network_aliases: Vec<String>,
  pub labels: BTreeMap<String, String>,
  pub restart_policy: RestartPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
  #[default]
  No,
  OnFailure,
  UnlessStopped,
}

impl RestartPolicy {
  pub fn as_docker_str(self) -> &'static str {
    match self {
      RestartPolicy::No => "no",
      RestartPolicy::OnFailure => "on-failure",
      RestartPolicy::UnlessStopped => "unless-stopped",
    }
  }
}

/// Engine-level error, distinct from [`crate::error::RsgoError`]: the
/// executor decides how an `EngineError` maps onto the spec's error
/// kinds (e.g. connection failure at step 1 becomes `EngineUnavailable`,
/// the same failure mid-pull becomes a `PullFailed` fallback check).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("container engine unreachable: {0}")]
  Unreachable(String),
  #[error("{0}")]
  Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[async_trait]
pub trait ContainerEngine: Send + Sync {
  async fn list_containers(&self) -> EngineResult<Vec<Container>>;
  async fn get_container_by_name(
    &self,
    name: &str,
  ) -> EngineResult<Option<Container>>;
  async fn create_and_start(
    &self,
    req: CreateContainerRequest,
  ) -> EngineResult<String>;
  async fn remove_container(
    &self,
    id: &str,
    force: bool,
  ) -> EngineResult<()>;
  async fn pull_image(&self, name: &str, tag: &str) -> EngineResult<()>;
  async fn image_exists(&self, name: &str, tag: &str) -> EngineResult<bool>;
  async fn ensure_network(&self, name: &str) -> EngineResult<()>;
  async fn get_exit_code(&self, id: &str) -> EngineResult<Option<i64>>;
  async fn get_logs(&self, id: &str, tail: usize) -> EngineResult<String>;
}
