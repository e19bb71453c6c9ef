//! Assembly-time configuration (§5 Timeouts, §9 Design Notes: "Durations").
//!
//! These are knobs fixed when the control plane is wired up, not per
//! invocation — layered the way the teacher's `periphery_config()` layers
//! `clap` CLI args over `envy::from_env()`, CLI taking precedence.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Clone, Copy)]
pub struct RsgoConfig {
  /// Hard cap on init-container wait (§5: "300s hard cap, configurable at
  /// assembly time, not per-invocation").
  pub init_container_timeout: Duration,
  /// Init-container poll cadence.
  pub init_container_poll_interval: Duration,
  /// Fallback when a `ServiceHealthCheckConfig`/`ObserverCommon` omits an
  /// interval (§9: "30s for polling").
  pub default_polling_interval: Duration,
  /// Fallback HTTP observer timeout (§9: "10s for HTTP observer timeout").
  pub default_http_observer_timeout: Duration,
  /// Notification sink FIFO cap (§5).
  pub notification_cap: usize,
}

impl Default for RsgoConfig {
  fn default() -> Self {
    RsgoConfig {
      init_container_timeout: Duration::from_secs(300),
      init_container_poll_interval: Duration::from_millis(500),
      default_polling_interval: Duration::from_secs(30),
      default_http_observer_timeout: Duration::from_secs(10),
      notification_cap: 50,
    }
  }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Env {
  pub rsgo_init_container_timeout_secs: Option<u64>,
  pub rsgo_init_container_poll_interval_ms: Option<u64>,
  pub rsgo_default_polling_interval_secs: Option<u64>,
  pub rsgo_default_http_observer_timeout_secs: Option<u64>,
  pub rsgo_notification_cap: Option<usize>,
}

#[derive(Debug, Clone, Parser, Default)]
pub struct CliArgs {
  #[arg(long)]
  pub init_container_timeout_secs: Option<u64>,
  #[arg(long)]
  pub init_container_poll_interval_ms: Option<u64>,
  #[arg(long)]
  pub default_polling_interval_secs: Option<u64>,
  #[arg(long)]
  pub default_http_observer_timeout_secs: Option<u64>,
  #[arg(long)]
  pub notification_cap: Option<usize>,
}

/// Reads `RSGO_*` environment variables via `envy` and merges them under
/// `args`, the same `periphery_config()` entry point the teacher's binaries
/// call at startup. A malformed environment (e.g. a non-numeric value)
/// degrades to the defaults rather than failing config loading outright.
pub fn load_config_from_env(args: &CliArgs) -> RsgoConfig {
  let env = match envy::from_env::<Env>() {
    Ok(env) => env,
    Err(e) => {
      warn!("failed to parse environment configuration, falling back to defaults: {e}");
      Env::default()
    }
  };
  load_config(args, &env)
}

/// Merges CLI args over environment variables over defaults, CLI winning,
/// the same precedence order the teacher's `periphery_config()` uses.
pub fn load_config(args: &CliArgs, env: &Env) -> RsgoConfig {
  let defaults = RsgoConfig::default();
  RsgoConfig {
    init_container_timeout: args
      .init_container_timeout_secs
      .or(env.rsgo_init_container_timeout_secs)
      .map(Duration::from_secs)
      .unwrap_or(defaults.init_container_timeout),
    init_container_poll_interval: args
      .init_container_poll_interval_ms
      .or(env.rsgo_init_container_poll_interval_ms)
      .map(Duration::from_millis)
      .unwrap_or(defaults.init_container_poll_interval),
    default_polling_interval: args
      .default_polling_interval_secs
      .or(env.rsgo_default_polling_interval_secs)
      .map(Duration::from_secs)
      .unwrap_or(defaults.default_polling_interval),
    default_http_observer_timeout: args
      .default_http_observer_timeout_secs
      .or(env.rsgo_default_http_observer_timeout_secs)
      .map(Duration::from_secs)
      .unwrap_or(defaults.default_http_observer_timeout),
    notification_cap: args
      .notification_cap
      .or(env.rsgo_notification_cap)
      .unwrap_or(defaults.notification_cap),
  }
}
