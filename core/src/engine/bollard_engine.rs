//! Bollard-backed [`ContainerEngine`] — the concrete adapter over the
//! Docker Engine HTTP API, grounded the same way the teacher's
//! `periphery::docker` module talks to Docker: connect once, no
//! transparent retries, surface failures unchanged.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
  Config, CreateContainerOptions, ListContainersOptions, LogOutput,
  LogsOptions, RemoveContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::network::CreateNetworkOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy as BollardRestartPolicy, RestartPolicyNameEnum};
use futures::StreamExt;

use super::{
  Container, ContainerEngine, CreateContainerRequest, EngineError,
  EngineResult, RestartPolicy,
};

pub struct BollardEngine {
  docker: Docker,
}

impl BollardEngine {
  pub fn connect() -> anyhow::Result<Self> {
    let docker = Docker::connect_with_local_defaults()?;
    Ok(BollardEngine { docker })
  }
}

fn map_err(e: BollardError) -> EngineError {
  match &e {
    BollardError::HyperResponseError { .. }
    | BollardError::IOError { .. } => {
      EngineError::Unreachable(e.to_string())
    }
    _ => EngineError::Other(e.into()),
  }
}

/// `host:container[/proto]` → (container_port/proto, host_port).
fn split_port_mapping(raw: &str) -> Option<(String, String)> {
  let (host, rest) = raw.split_once(':')?;
  let (container_port, proto) = match rest.split_once('/') {
    Some((p, proto)) => (p, proto),
    None => (rest, "tcp"),
  };
  Some((format!("{container_port}/{proto}"), host.to_string()))
}

#[async_trait]
impl ContainerEngine for BollardEngine {
  async fn list_containers(&self) -> EngineResult<Vec<Container>> {
    let summaries = self
      .docker
      .list_containers(Some(ListContainersOptions::<String> {
        all: true,
        ..Default::default()
      }))
      .await
      .map_err(map_err)?;

    Ok(
      summaries
        .into_iter()
        .map(|c| Container {
          id: c.id.unwrap_or_default(),
          name: c
            .names
            .and_then(|n| n.into_iter().next())
            .unwrap_or_default(),
          image: c.image.unwrap_or_default(),
          state: c.state.unwrap_or_default(),
          status: c.status.unwrap_or_default(),
          health_status: None,
          failing_streak: 0,
          labels: c.labels.unwrap_or_default().into_iter().collect(),
        })
        .collect(),
    )
  }

  async fn get_container_by_name(
    &self,
    name: &str,
  ) -> EngineResult<Option<Container>> {
    match self.docker.inspect_container(name, None).await {
      Ok(inspect) => {
        let state = inspect.state.unwrap_or_default();
        let health = state
          .health
          .as_ref()
          .and_then(|h| h.status)
          .map(|s| format!("{s:?}").to_lowercase());
        let failing_streak = state
          .health
          .as_ref()
          .and_then(|h| h.failing_streak)
          .unwrap_or(0) as u32;
        Ok(Some(Container {
          id: inspect.id.unwrap_or_default(),
          name: inspect.name.unwrap_or_default(),
          image: inspect
            .config
            .and_then(|c| c.image)
            .unwrap_or_default(),
          state: state
            .status
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_default(),
          status: state.error.unwrap_or_default(),
          health_status: health,
          failing_streak,
          labels: HashMap::new().into_iter().collect(),
        }))
      }
      Err(BollardError::DockerResponseServerError {
        status_code: 404,
        ..
      }) => Ok(None),
      Err(e) => Err(map_err(e)),
    }
  }

  async fn create_and_start(
    &self,
    req: CreateContainerRequest,
  ) -> EngineResult<String> {
    let env: Vec<String> = req
      .env_vars
      .iter()
      .map(|(k, v)| format!("{k}={v}"))
      .collect();

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> =
      HashMap::new();
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    for mapping in &req.ports {
      if let Some((container_port, host_port)) = split_port_mapping(mapping) {
        exposed_ports.insert(container_port.clone(), HashMap::new());
        port_bindings.insert(
          container_port,
          Some(vec![PortBinding {
            host_ip: None,
            host_port: Some(host_port),
          }]),
        );
      }
    }

    let binds: Vec<String> = req
      .volumes
      .iter()
      .map(|(src, dst)| format!("{src}:{dst}"))
      .collect();

    let restart_name = match req.restart_policy {
      RestartPolicy::No => RestartPolicyNameEnum::NO,
      RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
      RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    };

    let host_config = HostConfig {
      binds: Some(binds),
      port_bindings: Some(port_bindings),
      restart_policy: Some(BollardRestartPolicy {
        name: Some(restart_name),
        maximum_retry_count: None,
      }),
      network_mode: req.networks.first().cloned(),
      ..Default::default()
    };

    let config = Config {
      image: Some(req.image.clone()),
      env: Some(env),
      exposed_ports: Some(exposed_ports),
      labels: Some(req.labels.clone().into_iter().collect()),
      host_config: Some(host_config),
      ..Default::default()
    };

    let created = self
      .docker
      .create_container(
        Some(CreateContainerOptions {
          name: req.name.clone(),
          platform: None,
        }),
        config,
      )
      .await
      .map_err(map_err)?;

    for network in req.networks.iter().skip(1) {
      self
        .docker
        .connect_network(
          network,
          bollard::network::ConnectNetworkOptions {
            container: created.id.clone(),
            endpoint_config: bollard::models::EndpointSettings {
              aliases: Some(req.network_aliases.clone()),
              ..Default::default()
            },
          },
        )
        .await
        .map_err(map_err)?;
    }

    self
      .docker
      .start_container::<String>(&created.id, None)
      .await
      .map_err(map_err)?;

    Ok(created.id)
  }

  async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
    self
      .docker
      .remove_container(
        id,
        Some(RemoveContainerOptions {
          force,
          ..Default::default()
        }),
      )
      .await
      .map_err(map_err)
  }

  async fn pull_image(&self, name: &str, tag: &str) -> EngineResult<()> {
    let mut stream = self.docker.create_image(
      Some(CreateImageOptions {
        from_image: name,
        tag,
        ..Default::default()
      }),
      None,
      None,
    );
    while let Some(progress) = stream.next().await {
      progress.map_err(map_err)?;
    }
    Ok(())
  }

  async fn image_exists(&self, name: &str, tag: &str) -> EngineResult<bool> {
    match self.docker.inspect_image(&format!("{name}:{tag}")).await {
      Ok(_) => Ok(true),
      Err(BollardError::DockerResponseServerError {
        status_code: 404,
        ..
      }) => Ok(false),
      Err(e) => Err(map_err(e)),
    }
  }

  async fn ensure_network(&self, name: &str) -> EngineResult<()> {
    match self.docker.inspect_network::<String>(name, None).await {
      Ok(_) => Ok(()),
      Err(BollardError::DockerResponseServerError {
        status_code: 404,
        ..
      }) => {
        self
          .docker
          .create_network(CreateNetworkOptions {
            name: name.to_string(),
            ..Default::default()
          })
          .await
          .map_err(map_err)?;
        Ok(())
      }
      Err(e) => Err(map_err(e)),
    }
  }

  async fn get_exit_code(&self, id: &str) -> EngineResult<Option<i64>> {
    let inspect = self.docker.inspect_container(id, None).await.map_err(map_err)?;
    Ok(inspect.state.and_then(|s| s.exit_code))
  }

  async fn get_logs(&self, id: &str, tail: usize) -> EngineResult<String> {
    let mut stream = self.docker.logs(
      id,
      Some(LogsOptions::<String> {
        stdout: true,
        stderr: true,
        tail: tail.to_string(),
        ..Default::default()
      }),
    );
    let mut lines = Vec::new();
    while let Some(chunk) = stream.next().await {
      match chunk.map_err(map_err)? {
        LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
          lines.push(String::from_utf8_lossy(&message).into_owned());
        }
        _ => {}
      }
    }
    Ok(lines.join(""))
  }
}
