//! Stack Source contract (§6): the shape a manifest parser yields to the
//! planner. YAML parsing itself is out of scope — these types are the
//! already-parsed structured input.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::duration::parse_duration;

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackDefinition {
  pub name: String,
  pub version: Option<String>,
  pub services: IndexMap<String, ServiceDefinition>,
  #[serde(default)]
  pub networks: Vec<NetworkDefinition>,
  #[serde(default)]
  pub volumes: Vec<VolumeDefinition>,
  /// Insertion-ordered so reproducible plans keep variable precedence
  /// stable (§8 "Planner determinism").
  #[serde(default)]
  pub variables: IndexMap<String, String>,
  #[serde(default)]
  pub feature_flags: IndexMap<String, bool>,
  pub maintenance_observer: Option<MaintenanceObserverConfig>,
  #[serde(default)]
  pub health_checks: Vec<ServiceHealthCheckConfig>,
  /// The source permits a special context that is always deployed last
  /// even past dependency order (§9, REDESIGN FLAGS).
  pub gateway_context: Option<String>,
}

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
  pub image: String,
  #[serde(default)]
  pub container_name: Option<String>,
  #[serde(default)]
  pub env_vars: IndexMap<String, String>,
  #[serde(default)]
  pub ports: Vec<String>,
  #[serde(default)]
  pub volumes: Vec<String>,
  #[serde(default)]
  pub networks: Vec<String>,
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub lifecycle: ServiceLifecycle,
}

#[typeshare]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLifecycle {
  #[default]
  Service,
  Init,
}

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
  pub name: String,
  #[serde(default)]
  pub external: bool,
}

#[typeshare]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDefinition {
  pub name: String,
  #[serde(default)]
  pub external: bool,
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckType {
  Docker,
  Http,
  Tcp,
  None,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthCheckConfig {
  pub service_name: String,
  #[serde(rename = "type")]
  pub kind: HealthCheckType,
  pub path: Option<String>,
  pub port: Option<u16>,
  pub expected_status_codes: Option<Vec<u16>>,
  #[serde(default)]
  pub https: bool,
  pub interval: Option<String>,
  pub timeout: Option<String>,
  pub retries: Option<u32>,
}

impl ServiceHealthCheckConfig {
  pub fn interval(&self) -> std::time::Duration {
    self
      .interval
      .as_deref()
      .and_then(parse_duration)
      .unwrap_or(std::time::Duration::from_secs(30))
  }

  pub fn timeout(&self) -> std::time::Duration {
    self
      .timeout
      .as_deref()
      .and_then(parse_duration)
      .unwrap_or(std::time::Duration::from_secs(10))
  }
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MaintenanceObserverConfig {
  SqlExtendedProperty {
    #[serde(flatten)]
    common: ObserverCommon,
    connection_string: Option<String>,
    connection_name: Option<String>,
    property_name: String,
  },
  SqlQuery {
    #[serde(flatten)]
    common: ObserverCommon,
    connection_string: Option<String>,
    connection_name: Option<String>,
    query: String,
  },
  Http {
    #[serde(flatten)]
    common: ObserverCommon,
    url: String,
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    timeout: String,
    json_path: Option<String>,
  },
  File {
    #[serde(flatten)]
    common: ObserverCommon,
    path: String,
    mode: FileObserverMode,
    content_pattern: Option<String>,
  },
}

impl MaintenanceObserverConfig {
  pub fn common(&self) -> &ObserverCommon {
    match self {
      MaintenanceObserverConfig::SqlExtendedProperty { common, .. }
      | MaintenanceObserverConfig::SqlQuery { common, .. }
      | MaintenanceObserverConfig::Http { common, .. }
      | MaintenanceObserverConfig::File { common, .. } => common,
    }
  }
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverCommon {
  pub polling_interval: String,
  pub maintenance_value: String,
  pub normal_value: Option<String>,
}

impl ObserverCommon {
  pub fn polling_interval(&self) -> std::time::Duration {
    parse_duration(&self.polling_interval)
      .unwrap_or(std::time::Duration::from_secs(30))
  }
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileObserverMode {
  Exists,
  Content,
}
