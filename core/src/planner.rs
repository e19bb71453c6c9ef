//! C5 — Deployment Planner.
//!
//! Converts a [`StackDefinition`] plus caller-supplied variable overrides
//! into an ordered [`DeploymentPlan`] (§4.5). Output is a pure function of
//! its inputs — no I/O, no clock, no randomness — so it is deterministic
//! by construction (§8 "Planner determinism").

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::manifest::StackDefinition;
use crate::plan::{DeploymentPlan, PlannedNetwork, PlannedVolume, Step};
use crate::variables::resolve;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
  pub organization_id: Option<String>,
  pub organization_name: Option<String>,
  pub environment_id: Option<String>,
  /// Caller-supplied variable overrides; config wins over manifest
  /// defaults and over manifest feature flags (§4.5 step 2).
  pub variable_overrides: BTreeMap<String, String>,
  pub feature_flag_overrides: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanWarnings(pub Vec<String>);

/// Replaces spaces with underscores for Docker naming (§4.5 step 1).
pub fn sanitize_stack_name(name: &str) -> String {
  name.replace(' ', "_")
}

fn merged_variables(
  stack: &StackDefinition,
  opts: &PlanOptions,
) -> BTreeMap<String, String> {
  let mut vars: BTreeMap<String, String> =
    stack.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
  for (k, v) in &opts.variable_overrides {
    vars.insert(k.clone(), v.clone());
  }
  vars
}

fn build_globals(
  stack: &StackDefinition,
  stack_name: &str,
  opts: &PlanOptions,
) -> IndexMap<String, String> {
  let mut globals = IndexMap::new();
  globals.insert(
    "RSGO_ORG_ID".to_string(),
    opts.organization_id.clone().unwrap_or_default(),
  );
  globals.insert(
    "RSGO_ORG_NAME".to_string(),
    opts.organization_name.clone().unwrap_or_default(),
  );
  globals.insert(
    "RSGO_STACK_VERSION".to_string(),
    stack.version.clone().unwrap_or_else(|| "unspecified".to_string()),
  );

  let mut flags: BTreeMap<String, bool> = stack
    .feature_flags
    .iter()
    .map(|(k, v)| (k.clone(), *v))
    .collect();
  for (k, v) in &opts.feature_flag_overrides {
    flags.insert(k.clone(), *v);
  }
  for (name, value) in flags {
    globals.insert(format!("RSGO_FEATURE_{name}"), value.to_string());
  }
  let _ = stack_name;
  globals
}

fn resolve_in(template: &str, vars: &BTreeMap<String, String>) -> String {
  resolve(template, vars).text
}

/// Renames non-external networks to `{stackName}_{name}`; externals keep
/// their name (§4.5 step 3).
fn plan_networks(
  stack: &StackDefinition,
  stack_name: &str,
) -> Vec<PlannedNetwork> {
  stack
    .networks
    .iter()
    .map(|n| PlannedNetwork {
      name: if n.external {
        n.name.clone()
      } else {
        format!("{stack_name}_{}", n.name)
      },
      external: n.external,
    })
    .collect()
}

fn plan_volumes(
  stack: &StackDefinition,
  stack_name: &str,
) -> Vec<PlannedVolume> {
  stack
    .volumes
    .iter()
    .map(|v| PlannedVolume {
      name: if v.external {
        v.name.clone()
      } else {
        format!("{stack_name}_{}", v.name)
      },
      external: v.external,
    })
    .collect()
}

/// Prefixes a volume reference with `{stackName}_` unless it's external,
/// absolute, relative, or a bind-mount spec (§4.5 step 4).
fn resolve_volume_ref(raw: &str, stack_name: &str, externals: &BTreeSet<String>) -> String {
  if raw.starts_with('/') || raw.starts_with("./") || raw.contains(':') {
    return raw.to_string();
  }
  if externals.contains(raw) {
    return raw.to_string();
  }
  format!("{stack_name}_{raw}")
}

fn flatten_port(raw: &str, vars: &BTreeMap<String, String>) -> String {
  resolve_in(raw, vars)
}

/// Topologically sorts steps by `dependsOn`. On a cycle or missing
/// dependency, logs a warning and schedules the remainder in declared
/// order (§4.5 step 6). A declared `gatewayContext` is always scheduled
/// last regardless of dependency order.
fn topo_sort(
  names: &[String],
  depends_on: &BTreeMap<String, Vec<String>>,
  gateway: Option<&str>,
  warnings: &mut Vec<String>,
) -> Vec<String> {
  let known: HashSet<&str> = names.iter().map(String::as_str).collect();
  let mut in_degree: BTreeMap<&str, usize> =
    names.iter().map(|n| (n.as_str(), 0)).collect();
  let mut dependents: BTreeMap<&str, Vec<&str>> =
    names.iter().map(|n| (n.as_str(), Vec::new())).collect();

  for name in names {
    for dep in depends_on.get(name).into_iter().flatten() {
      if !known.contains(dep.as_str()) {
        warnings.push(format!(
          "service '{name}' depends on unknown service '{dep}'; ignoring dependency"
        ));
        continue;
      }
      // A dependency on the gateway is always satisfied by construction —
      // the gateway is appended last regardless of ordering — so it must
      // not hold the dependent's in-degree open for the cycle check below.
      if Some(dep.as_str()) == gateway {
        continue;
      }
      *in_degree.get_mut(name.as_str()).unwrap() += 1;
      dependents.get_mut(dep.as_str()).unwrap().push(name.as_str());
    }
  }

  let mut queue: VecDeque<&str> = names
    .iter()
    .map(String::as_str)
    .filter(|n| in_degree[n] == 0 && Some(*n) != gateway)
    .collect();
  let mut order = Vec::with_capacity(names.len());
  let mut visited: HashSet<&str> = HashSet::new();

  while let Some(n) = queue.pop_front() {
    if !visited.insert(n) {
      continue;
    }
    order.push(n.to_string());
    for dep in &dependents[n] {
      let d = in_degree.get_mut(dep).unwrap();
      *d -= 1;
      if *d == 0 && Some(*dep) != gateway {
        queue.push_back(dep);
      }
    }
  }

  // Cycle (or gateway) leftovers: append remaining nodes in declared order.
  let remaining: Vec<&str> = names
    .iter()
    .map(String::as_str)
    .filter(|n| !visited.contains(n) && Some(*n) != gateway)
    .collect();
  if !remaining.is_empty()
    && remaining.iter().any(|n| in_degree[n] > 0)
  {
    warnings.push(
      "dependency cycle detected; scheduling remaining services in declared order"
        .to_string(),
    );
  }
  for n in remaining {
    visited.insert(n);
    order.push(n.to_string());
  }

  if let Some(g) = gateway {
    if known.contains(g) {
      order.push(g.to_string());
    }
  }

  order
}

pub fn generate_plan(
  stack: &StackDefinition,
  desired_stack_name: &str,
  opts: &PlanOptions,
) -> (DeploymentPlan, PlanWarnings) {
  let mut warnings = Vec::new();
  let stack_name = sanitize_stack_name(desired_stack_name);
  let vars = merged_variables(stack, opts);
  let global_env_vars = build_globals(stack, &stack_name, opts);

  let networks = plan_networks(stack, &stack_name);
  let volumes = plan_volumes(stack, &stack_name);
  let external_volumes: BTreeSet<String> = stack
    .volumes
    .iter()
    .filter(|v| v.external)
    .map(|v| v.name.clone())
    .collect();

  let names: Vec<String> = stack.services.keys().cloned().collect();
  let depends_on: BTreeMap<String, Vec<String>> = stack
    .services
    .iter()
    .map(|(k, v)| (k.clone(), v.depends_on.clone()))
    .collect();

  let order_names = topo_sort(
    &names,
    &depends_on,
    stack.gateway_context.as_deref(),
    &mut warnings,
  );

  let mut steps = Vec::with_capacity(order_names.len());
  for (order, name) in order_names.iter().enumerate() {
    let svc = &stack.services[name];
    let image_ref = resolve_in(&svc.image, &vars);
    let (image, version) = match image_ref.rsplit_once(':') {
      Some((img, ver)) if !ver.contains('/') => {
        (img.to_string(), ver.to_string())
      }
      _ => (image_ref.clone(), "latest".to_string()),
    };

    let container_name = svc
      .container_name
      .as_deref()
      .map(|n| resolve_in(n, &vars))
      .unwrap_or_else(|| format!("{stack_name}_{name}"));

    let env_vars: IndexMap<String, String> = svc
      .env_vars
      .iter()
      .map(|(k, v)| (k.clone(), resolve_in(v, &vars)))
      .collect();

    let ports: Vec<String> =
      svc.ports.iter().map(|p| flatten_port(p, &vars)).collect();

    let volumes_resolved: Vec<String> = svc
      .volumes
      .iter()
      .map(|v| resolve_volume_ref(&resolve_in(v, &vars), &stack_name, &external_volumes))
      .collect();

    let networks_resolved: Vec<String> = if svc.networks.is_empty() {
      if networks.is_empty() {
        vec![format!("{stack_name}_default")]
      } else {
        networks.iter().map(|n| n.name.clone()).collect()
      }
    } else {
      svc
        .networks
        .iter()
        .map(|n| {
          stack
            .networks
            .iter()
            .find(|sn| &sn.name == n)
            .map(|sn| {
              if sn.external {
                sn.name.clone()
              } else {
                format!("{stack_name}_{}", sn.name)
              }
            })
            .unwrap_or_else(|| n.clone())
        })
        .collect()
    };

    steps.push(Step {
      context_name: name.clone(),
      image,
      version,
      container_name,
      internal: ports.is_empty(),
      env_vars,
      ports,
      volumes: volumes_resolved,
      networks: networks_resolved,
      depends_on: svc.depends_on.clone(),
      lifecycle: svc.lifecycle,
      order: order as u32,
    });
  }

  let plan = DeploymentPlan {
    stack_version: stack.version.clone().unwrap_or_else(|| "unspecified".to_string()),
    stack_name: Some(stack_name),
    environment_id: opts.environment_id.clone(),
    global_env_vars,
    networks,
    volumes,
    steps,
  };

  (plan, PlanWarnings(warnings))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::{ServiceDefinition, ServiceLifecycle};

  fn service(image: &str, ports: &[&str], depends_on: &[&str]) -> ServiceDefinition {
    ServiceDefinition {
      image: image.to_string(),
      ports: ports.iter().map(|p| p.to_string()).collect(),
      depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
      ..Default::default()
    }
  }

  #[test]
  fn single_service_plan_matches_scenario_1() {
    let mut stack = StackDefinition {
      name: "my-app".to_string(),
      ..Default::default()
    };
    stack
      .services
      .insert("web".to_string(), service("nginx", &["8080:80"], &[]));

    let (plan, warnings) =
      generate_plan(&stack, "my-app", &PlanOptions::default());
    assert!(warnings.0.is_empty());
    assert_eq!(plan.steps.len(), 1);
    let step = &plan.steps[0];
    assert_eq!(step.container_name, "my-app_web");
    assert!(!step.internal);
    assert_eq!(step.image, "nginx");
    assert_eq!(step.version, "latest");
    assert_eq!(step.networks, vec!["my-app_default".to_string()]);
  }

  #[test]
  fn init_before_service_ordering_matches_scenario_2() {
    let mut stack = StackDefinition::default();
    let mut migrate = service("migrate:1", &[], &[]);
    migrate.lifecycle = ServiceLifecycle::Init;
    stack.services.insert("migrate".to_string(), migrate);
    stack
      .services
      .insert("app".to_string(), service("app:1", &["80:80"], &["migrate"]));

    let (plan, _) = generate_plan(&stack, "stack", &PlanOptions::default());
    let migrate_order = plan
      .steps
      .iter()
      .find(|s| s.context_name == "migrate")
      .unwrap()
      .order;
    let app_order = plan
      .steps
      .iter()
      .find(|s| s.context_name == "app")
      .unwrap()
      .order;
    assert!(migrate_order < app_order);
  }

  #[test]
  fn topological_correctness_holds_for_every_dependency() {
    let mut stack = StackDefinition::default();
    stack.services.insert("a".to_string(), service("a", &[], &[]));
    stack
      .services
      .insert("b".to_string(), service("b", &[], &["a"]));
    stack
      .services
      .insert("c".to_string(), service("c", &[], &["a", "b"]));

    let (plan, warnings) = generate_plan(&stack, "s", &PlanOptions::default());
    assert!(warnings.0.is_empty());
    let order_of = |name: &str| {
      plan.steps.iter().find(|s| s.context_name == name).unwrap().order
    };
    for step in &plan.steps {
      for dep in &step.depends_on {
        assert!(order_of(dep) < step.order);
      }
    }
  }

  #[test]
  fn missing_dependency_warns_and_keeps_declared_order() {
    let mut stack = StackDefinition::default();
    stack
      .services
      .insert("a".to_string(), service("a", &[], &["ghost"]));
    let (plan, warnings) = generate_plan(&stack, "s", &PlanOptions::default());
    assert_eq!(plan.steps.len(), 1);
    assert!(!warnings.0.is_empty());
  }

  #[test]
  fn cycle_is_reported_and_all_steps_still_scheduled() {
    let mut stack = StackDefinition::default();
    stack
      .services
      .insert("a".to_string(), service("a", &[], &["b"]));
    stack
      .services
      .insert("b".to_string(), service("b", &[], &["a"]));
    let (plan, warnings) = generate_plan(&stack, "s", &PlanOptions::default());
    assert_eq!(plan.steps.len(), 2);
    assert!(warnings.0.iter().any(|w| w.contains("cycle")));
  }

  #[test]
  fn gateway_context_is_always_scheduled_last() {
    let mut stack = StackDefinition {
      gateway_context: Some("gateway".to_string()),
      ..Default::default()
    };
    stack
      .services
      .insert("gateway".to_string(), service("gw", &["80:80"], &[]));
    stack
      .services
      .insert("a".to_string(), service("a", &[], &["gateway"]));
    stack
      .services
      .insert("b".to_string(), service("b", &[], &[]));

    let (plan, warnings) = generate_plan(&stack, "s", &PlanOptions::default());
    let last = plan.steps.iter().max_by_key(|s| s.order).unwrap();
    assert_eq!(last.context_name, "gateway");
    assert!(
      warnings.0.iter().all(|w| !w.contains("cycle")),
      "a service depending on the always-last gateway must not be reported as a cycle: {:?}",
      warnings.0
    );
  }

  #[test]
  fn plan_generation_is_deterministic() {
    let mut stack = StackDefinition::default();
    stack
      .services
      .insert("web".to_string(), service("nginx", &["8080:80"], &[]));
    let opts = PlanOptions::default();
    let (plan1, _) = generate_plan(&stack, "my-app", &opts);
    let (plan2, _) = generate_plan(&stack, "my-app", &opts);
    assert_eq!(
      serde_json::to_string(&plan1).unwrap(),
      serde_json::to_string(&plan2).unwrap()
    );
  }

  #[test]
  fn volume_passthrough_rules() {
    let externals: BTreeSet<String> = ["ext".to_string()].into_iter().collect();
    assert_eq!(resolve_volume_ref("/abs/path", "stack", &externals), "/abs/path");
    assert_eq!(resolve_volume_ref("./rel", "stack", &externals), "./rel");
    assert_eq!(resolve_volume_ref("host:/container", "stack", &externals), "host:/container");
    assert_eq!(resolve_volume_ref("ext", "stack", &externals), "ext");
    assert_eq!(resolve_volume_ref("data", "stack", &externals), "stack_data");
  }

  #[test]
  fn sanitizes_spaces_in_stack_name() {
    assert_eq!(sanitize_stack_name("my app"), "my_app");
  }

  #[test]
  fn feature_flags_become_globals_with_config_precedence() {
    let mut stack = StackDefinition::default();
    stack.feature_flags.insert("beta".to_string(), false);
    let opts = PlanOptions {
      feature_flag_overrides: [("beta".to_string(), true)].into_iter().collect(),
      ..Default::default()
    };
    let (plan, _) = generate_plan(&stack, "s", &opts);
    assert_eq!(plan.global_env_vars.get("RSGO_FEATURE_beta").unwrap(), "true");
  }
}
