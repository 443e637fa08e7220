// Automation policy consumed from the settings layer
//
// Persistence lives outside this crate; we only define the shape, defaults and
// clamping so a partial document from disk still produces a usable policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::ConfigError;
use crate::lcu::{ActionKind, Position};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChampionInfo {
  pub champion_id: Option<i64>,
  pub key: String,
  pub name: String,
}

impl ChampionInfo {
  pub fn new(champion_id: i64, key: &str) -> Self {
    Self {
      champion_id: Some(champion_id),
      key: key.to_string(),
      name: key.to_string(),
    }
  }
}

impl fmt::Display for ChampionInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = if self.name.is_empty() { &self.key } else { &self.name };
    match self.champion_id {
      Some(id) => write!(f, "{} ({})", label, id),
      None => write!(f, "{} (no id)", label),
    }
  }
}

/// Ordered ban/pick queues for one lane.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionPreferences {
  pub ban_champions: Vec<ChampionInfo>,
  pub pick_champions: Vec<ChampionInfo>,
}

/// Allowed range for the ban/pick execution delay, in seconds.
///
/// Kept in the policy rather than hard-coded: the settings UI has shipped both
/// 1-10 and 1-30 ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayBounds {
  pub min: u32,
  pub max: u32,
}

impl Default for DelayBounds {
  fn default() -> Self {
    Self { min: 1, max: 10 }
  }
}

/// Range for the fixed delay of simple-delay mode, in seconds.
pub const SIMPLE_DELAY_BOUNDS: DelayBounds = DelayBounds { min: 1, max: 30 };

impl DelayBounds {
  pub fn clamp(&self, seconds: u32) -> u32 {
    seconds.clamp(self.min, self.max.max(self.min))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
  pub poll_interval_ms: u64,
  /// Consecutive failed phase probes before we report the client as gone.
  pub failure_threshold: u32,
  /// Max concurrent state-changing calls (accept/hover/ban/pick).
  pub action_concurrency: usize,
  pub recheck_interval_ms: u64,
  /// Base wait before retrying a rejected ban/pick; grows with each attempt.
  pub commit_retry_ms: u64,
  /// Below this much time left a ban is dropped instead of fired.
  pub min_ban_remaining_ms: u64,
  pub min_pick_remaining_ms: u64,
  /// How often a lost client is looked up again from its lockfile.
  pub reconnect_interval_ms: u64,
}

impl Default for MonitorSettings {
  fn default() -> Self {
    Self {
      poll_interval_ms: 1000,
      failure_threshold: 3,
      action_concurrency: 2,
      recheck_interval_ms: 500,
      commit_retry_ms: 1000,
      min_ban_remaining_ms: 200,
      min_pick_remaining_ms: 500,
      reconnect_interval_ms: 10_000,
    }
  }
}

impl MonitorSettings {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.clamp(100, 5000))
  }

  pub fn recheck_interval(&self) -> Duration {
    Duration::from_millis(self.recheck_interval_ms.clamp(50, 2000))
  }

  pub fn failure_threshold(&self) -> u32 {
    self.failure_threshold.max(1)
  }

  pub fn action_concurrency(&self) -> usize {
    self.action_concurrency.max(1)
  }

  pub fn commit_retry_delay(&self) -> Duration {
    Duration::from_millis(self.commit_retry_ms.clamp(100, 5000))
  }

  pub fn reconnect_interval(&self) -> Duration {
    Duration::from_millis(self.reconnect_interval_ms.clamp(1000, 60_000))
  }

  pub fn min_remaining_seconds(&self, kind: ActionKind) -> f64 {
    let millis = match kind {
      ActionKind::Pick => self.min_pick_remaining_ms,
      _ => self.min_ban_remaining_ms,
    };
    millis.min(5000) as f64 / 1000.0
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
  pub auto_accept: bool,
  pub auto_ban: bool,
  pub auto_pick: bool,
  pub smart_timing: bool,
  pub hover: bool,
  /// Hover the pick champion as soon as champ select opens, before our turn.
  pub auto_hover: bool,
  pub position_based_selection: bool,

  /// Fixed-delay mode; takes precedence over smart timing for its kind.
  pub simple_delay_ban: bool,
  pub simple_delay_pick: bool,
  pub simple_ban_delay_seconds: u32,
  pub simple_pick_delay_seconds: u32,

  pub ban_delay_seconds: u32,
  pub pick_delay_seconds: u32,
  pub delay_bounds: DelayBounds,

  pub ban_champion: Option<ChampionInfo>,
  pub pick_champion: Option<ChampionInfo>,
  pub positions: HashMap<Position, PositionPreferences>,

  pub suppress_ready_check_popup: bool,
  pub suppress_ban_popup: bool,
  pub suppress_pick_popup: bool,

  pub monitor: MonitorSettings,
}

impl Default for AutomationConfig {
  fn default() -> Self {
    Self {
      auto_accept: true,
      auto_ban: false,
      auto_pick: false,
      smart_timing: true,
      hover: true,
      auto_hover: false,
      position_based_selection: false,
      simple_delay_ban: false,
      simple_delay_pick: false,
      simple_ban_delay_seconds: 2,
      simple_pick_delay_seconds: 2,
      ban_delay_seconds: 3,
      pick_delay_seconds: 3,
      delay_bounds: DelayBounds::default(),
      ban_champion: None,
      pick_champion: None,
      positions: HashMap::new(),
      suppress_ready_check_popup: false,
      suppress_ban_popup: false,
      suppress_pick_popup: false,
      monitor: MonitorSettings::default(),
    }
  }
}

impl AutomationConfig {
  /// Parse a policy document and clamp out-of-range values.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.normalized()
  }

  pub fn normalized(mut self) -> Result<Self, ConfigError> {
    if self.delay_bounds.min > self.delay_bounds.max {
      return Err(ConfigError::InvalidBounds {
        min: self.delay_bounds.min,
        max: self.delay_bounds.max,
      });
    }
    self.ban_delay_seconds = self.delay_bounds.clamp(self.ban_delay_seconds);
    self.pick_delay_seconds = self.delay_bounds.clamp(self.pick_delay_seconds);
    self.simple_ban_delay_seconds = SIMPLE_DELAY_BOUNDS.clamp(self.simple_ban_delay_seconds);
    self.simple_pick_delay_seconds = SIMPLE_DELAY_BOUNDS.clamp(self.simple_pick_delay_seconds);
    Ok(self)
  }

  /// Fire threshold for bans, clamped even if the struct was built by hand.
  pub fn ban_threshold_seconds(&self) -> f64 {
    self.delay_bounds.clamp(self.ban_delay_seconds) as f64
  }

  pub fn pick_threshold_seconds(&self) -> f64 {
    self.delay_bounds.clamp(self.pick_delay_seconds) as f64
  }

  /// The fixed delay for `kind` when simple-delay mode is on for it.
  pub fn simple_delay_for(&self, kind: ActionKind) -> Option<Duration> {
    let (enabled, seconds) = match kind {
      ActionKind::Pick => (self.simple_delay_pick, self.simple_pick_delay_seconds),
      _ => (self.simple_delay_ban, self.simple_ban_delay_seconds),
    };
    enabled.then(|| Duration::from_secs(SIMPLE_DELAY_BOUNDS.clamp(seconds) as u64))
  }

  pub fn position_preferences(&self, position: Option<Position>) -> Option<&PositionPreferences> {
    position.and_then(|p| self.positions.get(&p))
  }
}

/// Policy handle shared between the UI layer and the automation core.
///
/// Readers take a snapshot at decision time, so a change made mid-session
/// applies to the next decision rather than to one already in flight.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
  inner: Arc<RwLock<AutomationConfig>>,
}

impl SharedConfig {
  pub fn new(config: AutomationConfig) -> Self {
    Self {
      inner: Arc::new(RwLock::new(config)),
    }
  }

  pub fn snapshot(&self) -> AutomationConfig {
    match self.inner.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  pub fn update<F>(&self, apply: F)
  where
    F: FnOnce(&mut AutomationConfig),
  {
    let mut guard = match self.inner.write() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    apply(&mut guard);
  }
}
