// Edge-triggered events emitted by the monitor

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::identity::{IdentityChange, SessionIdentity};
use super::types::{ChampSelectSession, GamePhase};

const DEFAULT_CAPACITY: usize = 256;

/// A champ select snapshot that differs from the previous one in something
/// other than the timer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
  pub session: Arc<ChampSelectSession>,
  pub change: IdentityChange,
  pub observed_at: DateTime<Utc>,
}

impl SessionUpdate {
  pub fn identity(&self) -> &SessionIdentity {
    self.change.identity()
  }

  /// First snapshot of a different champ select occurrence.
  pub fn is_new_session(&self) -> bool {
    self.change.is_new()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
  ConnectionChanged(bool),
  PhaseChanged(GamePhase),
  ReadyCheckChanged(bool),
  /// `None` when champ select ended.
  ChampSelectSessionChanged(Option<SessionUpdate>),
}

/// Broadcast fan-out of monitor events, delivered in poll order.
#[derive(Debug, Clone)]
pub struct EventBus {
  sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity);
    Self { sender }
  }

  /// Returns the number of subscribers that received the event.
  pub fn publish(&self, event: MonitorEvent) -> usize {
    self.sender.send(event).unwrap_or(0)
  }

  /// Events published before subscribing are not replayed.
  pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
    self.sender.subscribe()
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}
