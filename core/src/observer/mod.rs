//! C9 — Maintenance Observer Loop (§4.9).
//!
//! Per-deployment pluggable probes drive `ChangeOperationMode` decisions.
//! Every concrete observer implements only [`GetObservedValue`]; the shared
//! `check` wraps it with failure handling and mode comparison so the four
//! variants never duplicate that logic.

pub mod file;
pub mod http;
pub mod sql_extended_property;
pub mod sql_query;

use async_trait::async_trait;
use cache::TimeoutCache;
use indexmap::IndexMap;

use crate::clock::Clock;
use crate::entities::ObserverResult;
use crate::entities::OperationMode;
use crate::error::RsgoError;
use crate::id::DeploymentId;
use crate::manifest::{MaintenanceObserverConfig, ObserverCommon};
use crate::variables::resolve_connection_string;

/// A pluggable connection to a SQL engine, injected by the caller the same
/// way [`crate::engine::ContainerEngine`] is — the control plane never
/// bundles a specific driver (§13 ambient-collaborator boundary).
#[async_trait]
pub trait SqlConnector: Send + Sync {
  async fn read_extended_property(
    &self,
    connection_string: &str,
    property_name: &str,
  ) -> anyhow::Result<String>;

  async fn run_scalar_query(
    &self,
    connection_string: &str,
    query: &str,
  ) -> anyhow::Result<String>;
}

/// §4.9: "a base contract `Check(ctx) -> ObserverResult` whose sole
/// primitive is `GetObservedValue(ctx) -> string`".
#[async_trait]
pub trait GetObservedValue: Send + Sync {
  async fn get_observed_value(&self) -> anyhow::Result<String>;
}

/// Wraps any [`GetObservedValue`] implementation with the shared result
/// envelope: failures become `is_success=false`, never an error return.
pub async fn check(
  observer: &dyn GetObservedValue,
  clock: &dyn Clock,
) -> ObserverResult {
  match observer.get_observed_value().await {
    Ok(value) => ObserverResult {
      is_success: true,
      observed_value: Some(value),
      is_maintenance_required: false,
      error_message: None,
      captured_at_utc: clock.now(),
    },
    Err(e) => ObserverResult {
      is_success: false,
      observed_value: None,
      is_maintenance_required: false,
      error_message: Some(e.to_string()),
      captured_at_utc: clock.now(),
    },
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecision {
  pub mode: OperationMode,
  pub reason: String,
}

/// §4.9 step 5: compares the observed value against the configured
/// maintenance/normal markers and produces the `ChangeOperationMode`
/// reason text verbatim (§8 scenario 4).
pub fn decide_mode(common: &ObserverCommon, observed_value: &str) -> ModeDecision {
  if observed_value == common.maintenance_value {
    ModeDecision {
      mode: OperationMode::Maintenance,
      reason: format!(
        "Triggered by maintenance observer (observed: {observed_value})"
      ),
    }
  } else {
    ModeDecision {
      mode: OperationMode::Normal,
      reason: format!("Cleared by maintenance observer (observed: {observed_value})"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverOutcome {
  /// No config, no running deployment, or an unresolved connection string.
  Skipped(String),
  /// Within the debounce window; the prior result is returned unchanged.
  Cached(ObserverResult),
  Checked {
    result: ObserverResult,
    mode_change: Option<ModeDecision>,
  },
}

fn build_observer<'a>(
  config: &'a MaintenanceObserverConfig,
  variables: &std::collections::BTreeMap<String, String>,
  sql: &'a dyn SqlConnector,
  http_client: &'a reqwest::Client,
) -> Result<Box<dyn GetObservedValue + 'a>, String> {
  match config {
    MaintenanceObserverConfig::SqlExtendedProperty {
      connection_string,
      connection_name,
      property_name,
      ..
    } => {
      let resolved = resolve_template_connection(connection_string, connection_name, variables)?;
      Ok(Box::new(sql_extended_property::SqlExtendedPropertyObserver {
        sql,
        connection_string: resolved,
        property_name: property_name.clone(),
      }))
    }
    MaintenanceObserverConfig::SqlQuery {
      connection_string,
      connection_name,
      query,
      ..
    } => {
      let resolved = resolve_template_connection(connection_string, connection_name, variables)?;
      Ok(Box::new(sql_query::SqlQueryObserver {
        sql,
        connection_string: resolved,
        query: query.clone(),
      }))
    }
    MaintenanceObserverConfig::Http { url, method, headers, timeout, json_path, .. } => {
      let resolved_url = resolve_connection_string(url, variables)
        .ok_or_else(|| "unresolved variable reference in observer URL".to_string())?;
      Ok(Box::new(http::HttpObserver {
        client: http_client,
        url: resolved_url,
        method: method.clone(),
        headers: headers.clone(),
        timeout: crate::duration::parse_duration(timeout)
          .unwrap_or(std::time::Duration::from_secs(10)),
        json_path: json_path.clone(),
      }))
    }
    MaintenanceObserverConfig::File { path, mode, content_pattern, .. } => {
      let resolved_path = resolve_connection_string(path, variables)
        .ok_or_else(|| "unresolved variable reference in observer file path".to_string())?;
      Ok(Box::new(file::FileObserver {
        path: resolved_path,
        mode: *mode,
        content_pattern: content_pattern.clone(),
      }))
    }
  }
}

fn resolve_template_connection(
  connection_string: &Option<String>,
  connection_name: &Option<String>,
  variables: &std::collections::BTreeMap<String, String>,
) -> Result<String, String> {
  if let Some(template) = connection_string {
    return resolve_connection_string(template, variables)
      .ok_or_else(|| "unresolved variable reference in connection string".to_string());
  }
  if let Some(name) = connection_name {
    return variables
      .get(name)
      .cloned()
      .ok_or_else(|| format!("unknown named connection '{name}'"));
  }
  Err("observer config has neither connectionString nor connectionName".to_string())
}

/// One scheduler tick for one deployment (§4.9, §4.10). Never returns
/// [`RsgoError`] other than [`RsgoError::ObserverTransient`], which callers
/// treat as a warning, never a mode change.
#[allow(clippy::too_many_arguments)]
#[instrument("RunObserverTick", skip_all, fields(deployment_id = %deployment_id))]
pub async fn run_observer_tick(
  deployment_id: DeploymentId,
  is_running: bool,
  config: Option<&MaintenanceObserverConfig>,
  variables: &IndexMap<String, String>,
  cache: &TimeoutCache<DeploymentId, Option<ObserverResult>>,
  sql: &dyn SqlConnector,
  http_client: &reqwest::Client,
  clock: &dyn Clock,
) -> ObserverOutcome {
  if !is_running {
    return ObserverOutcome::Skipped("deployment is not Running".to_string());
  }
  let Some(config) = config else {
    return ObserverOutcome::Skipped("no maintenance observer configured".to_string());
  };

  let vars: std::collections::BTreeMap<String, String> =
    variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

  let observer = match build_observer(config, &vars, sql, http_client) {
    Ok(o) => o,
    Err(reason) => {
      warn!("deployment {deployment_id} observer skipped: {reason}");
      return ObserverOutcome::Skipped(reason);
    }
  };

  let lock = cache.get_lock(deployment_id).await;
  let mut entry = lock.lock().await;
  let now_ts = clock.now().timestamp();
  let polling_interval = config.common().polling_interval().as_secs() as i64;
  if entry.last_ts != 0 && now_ts - entry.last_ts < polling_interval {
    if let Ok(Some(cached)) = entry.clone_res() {
      debug!("deployment {deployment_id} observer result served from debounce cache");
      return ObserverOutcome::Cached(cached);
    }
  }

  let result = check(observer.as_ref(), clock).await;
  entry.set(&Ok(Some(result.clone())), now_ts);

  if !result.is_success {
    warn!(
      "deployment {deployment_id} observer probe failed: {}",
      result.error_message.as_deref().unwrap_or("unknown error")
    );
    return ObserverOutcome::Checked { result, mode_change: None };
  }
  let observed = result.observed_value.clone().unwrap_or_default();
  let decision = decide_mode(config.common(), &observed);
  info!("deployment {deployment_id} observer decided mode {:?}: {}", decision.mode, decision.reason);
  ObserverOutcome::Checked { result, mode_change: Some(decision) }
}

/// Translates a skip reason into the warning variant callers log without
/// failing the pass (§4.9 step 2).
pub fn skip_warning(reason: &str) -> RsgoError {
  RsgoError::ObserverTransient(reason.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::FixedClock;
  use chrono::Utc;

  struct AlwaysOk(&'static str);

  #[async_trait]
  impl GetObservedValue for AlwaysOk {
    async fn get_observed_value(&self) -> anyhow::Result<String> {
      Ok(self.0.to_string())
    }
  }

  struct AlwaysErr;

  #[async_trait]
  impl GetObservedValue for AlwaysErr {
    async fn get_observed_value(&self) -> anyhow::Result<String> {
      Err(anyhow::anyhow!("probe unreachable"))
    }
  }

  #[tokio::test]
  async fn successful_check_reports_observed_value() {
    let clock = FixedClock(Utc::now());
    let result = check(&AlwaysOk("true"), &clock).await;
    assert!(result.is_success);
    assert_eq!(result.observed_value.as_deref(), Some("true"));
  }

  #[tokio::test]
  async fn failed_check_never_propagates_error() {
    let clock = FixedClock(Utc::now());
    let result = check(&AlwaysErr, &clock).await;
    assert!(!result.is_success);
    assert!(result.error_message.unwrap().contains("unreachable"));
  }

  #[test]
  fn decide_mode_matches_maintenance_value() {
    let common = ObserverCommon {
      polling_interval: "30s".into(),
      maintenance_value: "true".into(),
      normal_value: Some("false".into()),
    };
    let decision = decide_mode(&common, "true");
    assert_eq!(decision.mode, OperationMode::Maintenance);
    assert!(decision.reason.contains("Triggered by maintenance observer"));

    let decision = decide_mode(&common, "false");
    assert_eq!(decision.mode, OperationMode::Normal);
    assert!(decision.reason.contains("Cleared by maintenance observer"));
  }

  #[test]
  fn decide_mode_anything_else_clears_to_normal() {
    let common = ObserverCommon {
      polling_interval: "30s".into(),
      maintenance_value: "maintenance".into(),
      normal_value: None,
    };
    assert_eq!(decide_mode(&common, "anything").mode, OperationMode::Normal);
  }
}
