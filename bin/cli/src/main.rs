//! `rsgoctl` — operator convenience wrapper around the core crate (§10).
//! Contains no business logic: it loads a manifest, calls the planner,
//! and optionally drives the executor against a reachable Docker socket.

#[macro_use]
extern crate tracing;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use logger::{LogConfig, LogLevel, StdioLogMode};
use readystackgo::cancellation::CancellationToken;
use readystackgo::config::{self, CliArgs as RsgoCliArgs};
use readystackgo::engine::bollard_engine::BollardEngine;
use readystackgo::manifest::StackDefinition;
use readystackgo::planner::{self, PlanOptions};

#[derive(Parser)]
#[command(name = "rsgoctl", about = "Operator CLI for ReadyStackGo")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Plan a stack from a manifest file and print the resulting plan.
  Plan {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long)]
    stack_name: String,
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,
  },
  /// Plan a stack and drive the executor against a reachable Docker socket.
  Execute {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long)]
    stack_name: String,
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,
    /// Print the plan and exit without touching the engine.
    #[arg(long)]
    dry_run: bool,
    #[command(flatten)]
    config: RsgoCliArgs,
  },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn load_stack(path: &PathBuf) -> anyhow::Result<StackDefinition> {
  let raw = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  logger::init(&LogConfig {
    level: LogLevel::Info,
    stdio: StdioLogMode::Standard,
    pretty: false,
    location: false,
    ansi: true,
  })?;

  let cli = Cli::parse();
  match cli.command {
    Command::Plan { manifest, stack_name, vars } => {
      let stack = load_stack(&manifest)?;
      let opts = PlanOptions {
        variable_overrides: vars.into_iter().collect::<BTreeMap<_, _>>(),
        ..Default::default()
      };
      let (plan, warnings) = planner::generate_plan(&stack, &stack_name, &opts);
      for warning in &warnings.0 {
        warn!("{warning}");
      }
      println!("{}", serde_json::to_string_pretty(&plan)?);
    }
    Command::Execute { manifest, stack_name, vars, dry_run, config } => {
      let stack = load_stack(&manifest)?;
      let opts = PlanOptions {
        variable_overrides: vars.into_iter().collect::<BTreeMap<_, _>>(),
        ..Default::default()
      };
      let (plan, warnings) = planner::generate_plan(&stack, &stack_name, &opts);
      for warning in &warnings.0 {
        warn!("{warning}");
      }
      if dry_run {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
      }

      let engine = BollardEngine::connect()?;
      let config = config::load_config_from_env(&config);
      let cancel = CancellationToken::new();
      let result =
        readystackgo::executor::execute(&plan, &engine, &config, None, &cancel).await;
      if result.success {
        info!(
          "deployed {} service(s) for stack '{}' in {:?}",
          result.deployed_containers.len(),
          stack_name,
          result.deployment_time
        );
      } else {
        for error in &result.errors {
          error!("{error}");
        }
        anyhow::bail!("deployment failed");
      }
    }
  }
  Ok(())
}
