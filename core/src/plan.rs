//! Plan shapes produced by the Deployment Planner (C5) and consumed by the
//! Deployment Executor (C6) — §3 "DeploymentPlan" / "Step".

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::manifest::ServiceLifecycle;

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
  pub stack_version: String,
  pub stack_name: Option<String>,
  pub environment_id: Option<String>,
  pub global_env_vars: IndexMap<String, String>,
  pub networks: Vec<PlannedNetwork>,
  pub volumes: Vec<PlannedVolume>,
  pub steps: Vec<Step>,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedNetwork {
  pub name: String,
  pub external: bool,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedVolume {
  pub name: String,
  pub external: bool,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub context_name: String,
  pub image: String,
  pub version: String,
  pub container_name: String,
  pub internal: bool,
  pub env_vars: IndexMap<String, String>,
  pub ports: Vec<String>,
  pub volumes: Vec<String>,
  pub networks: Vec<String>,
  pub depends_on: Vec<String>,
  pub lifecycle: ServiceLifecycle,
  pub order: u32,
}

impl Step {
  pub fn full_image(&self) -> String {
    format!("{}:{}", self.image, self.version)
  }
}
