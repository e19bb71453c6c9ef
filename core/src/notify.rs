//! Notification Sink (§6 external interface, §5 resource model).
//!
//! The sink itself is an external collaborator — the control plane only
//! defines the four event payloads and the trait boundary, the same way
//! `ContainerEngine` is a boundary rather than a bundled driver. The
//! in-memory implementation below exists for tests and for running the
//! whole pipeline standalone; it follows the client's `broadcast::channel`
//! fan-out plus a capped replay buffer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use typeshare::typeshare;

use crate::entities::{HealthSnapshot, ObserverResult, OverallHealth};
use crate::health::EnvironmentHealthSummary;
use crate::id::{DeploymentId, EnvironmentId};

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSummaryEvent {
  pub deployment_id: DeploymentId,
  pub stack_name: String,
  pub overall: OverallHealth,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDetailEvent {
  pub snapshot: HealthSnapshot,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSummaryEvent {
  pub environment_id: EnvironmentId,
  pub summary: EnvironmentHealthSummary,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverResultEvent {
  pub deployment_id: DeploymentId,
  pub result: ObserverResult,
}

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NotificationEvent {
  DeploymentSummary(DeploymentSummaryEvent),
  DeploymentDetail(DeploymentDetailEvent),
  EnvironmentSummary(EnvironmentSummaryEvent),
  ObserverResult(ObserverResultEvent),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
  async fn publish(&self, event: NotificationEvent);
}

/// Fan-out over a bounded broadcast channel, plus a FIFO replay buffer
/// capped at `capacity` (§5) with oldest-eviction under a single write
/// lock — late subscribers can still page through recent history.
pub struct InMemoryNotificationSink {
  sender: broadcast::Sender<NotificationEvent>,
  history: tokio::sync::RwLock<std::collections::VecDeque<NotificationEvent>>,
  capacity: usize,
}

impl InMemoryNotificationSink {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    InMemoryNotificationSink {
      sender,
      history: tokio::sync::RwLock::new(std::collections::VecDeque::with_capacity(capacity)),
      capacity,
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
    self.sender.subscribe()
  }

  pub async fn recent(&self) -> Vec<NotificationEvent> {
    self.history.read().await.iter().cloned().collect()
  }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
  async fn publish(&self, event: NotificationEvent) {
    let _ = self.sender.send(event.clone());
    let mut history = self.history.write().await;
    if history.len() >= self.capacity {
      history.pop_front();
    }
    history.push_back(event);
  }
}
