// Types for LCU state: connection, gameflow phase and champ select snapshots

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::selection::ExclusionSets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
}

impl ConnectionState {
  pub fn is_connected(self) -> bool {
    self == Self::Connected
  }
}

/// Gameflow phase as reported by `/lol-gameflow/v1/gameflow-phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GamePhase {
  #[default]
  None,
  Lobby,
  Matchmaking,
  ReadyCheck,
  ChampSelect,
  GameStart,
  InProgress,
  Reconnect,
  WaitingForStats,
  PreEndOfGame,
  EndOfGame,
  TerminatedInError,
}

impl GamePhase {
  const ALL: [GamePhase; 12] = [
    Self::None,
    Self::Lobby,
    Self::Matchmaking,
    Self::ReadyCheck,
    Self::ChampSelect,
    Self::GameStart,
    Self::InProgress,
    Self::Reconnect,
    Self::WaitingForStats,
    Self::PreEndOfGame,
    Self::EndOfGame,
    Self::TerminatedInError,
  ];

  pub fn lcu_name(self) -> &'static str {
    match self {
      Self::None => "None",
      Self::Lobby => "Lobby",
      Self::Matchmaking => "Matchmaking",
      Self::ReadyCheck => "ReadyCheck",
      Self::ChampSelect => "ChampSelect",
      Self::GameStart => "GameStart",
      Self::InProgress => "InProgress",
      Self::Reconnect => "Reconnect",
      Self::WaitingForStats => "WaitingForStats",
      Self::PreEndOfGame => "PreEndOfGame",
      Self::EndOfGame => "EndOfGame",
      Self::TerminatedInError => "TerminatedInError",
    }
  }

  /// Unknown names map to `None`, matching is case-insensitive.
  pub fn from_lcu_name(name: &str) -> Self {
    let name = name.trim().trim_matches('"');
    Self::ALL
      .into_iter()
      .find(|phase| phase.lcu_name().eq_ignore_ascii_case(name))
      .unwrap_or(Self::None)
  }
}

impl fmt::Display for GamePhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.lcu_name())
  }
}

/// Assigned lane in draft queues (`assignedPosition` in the session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
  Top,
  Jungle,
  Middle,
  Bottom,
  Utility,
}

impl Position {
  pub fn from_lcu(value: &str) -> Option<Self> {
    match value.trim().to_lowercase().as_str() {
      "top" => Some(Self::Top),
      "jungle" => Some(Self::Jungle),
      "middle" | "mid" => Some(Self::Middle),
      "bottom" | "bot" | "adc" => Some(Self::Bottom),
      "utility" | "support" => Some(Self::Utility),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Top => "top",
      Self::Jungle => "jungle",
      Self::Middle => "middle",
      Self::Bottom => "bottom",
      Self::Utility => "utility",
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
  Ban,
  Pick,
  #[default]
  #[serde(other)]
  Other,
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Ban => "ban",
      Self::Pick => "pick",
      Self::Other => "other",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMember {
  pub cell_id: i64,
  pub champion_id: i64,
  #[serde(deserialize_with = "null_as_default")]
  pub champion_pick_intent: i64,
  #[serde(deserialize_with = "null_as_default")]
  pub summoner_id: u64,
  #[serde(deserialize_with = "null_as_default")]
  pub assigned_position: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionAction {
  pub id: i64,
  pub actor_cell_id: i64,
  #[serde(rename = "type")]
  pub kind: ActionKind,
  pub champion_id: i64,
  pub is_in_progress: bool,
  pub completed: bool,
  pub is_ally_action: bool,
}

impl SessionAction {
  /// Our turn, not yet locked in.
  pub fn is_actionable(&self) -> bool {
    self.is_in_progress && !self.completed && matches!(self.kind, ActionKind::Ban | ActionKind::Pick)
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTimer {
  pub phase: String,
  /// Milliseconds left in the current timer phase.
  pub adjusted_time_left_in_phase: f64,
  pub total_time_in_phase: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatDetails {
  #[serde(deserialize_with = "null_as_default")]
  pub chat_room_name: String,
}

/// One poll of `/lol-champ-select/v1/session`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChampSelectSession {
  #[serde(deserialize_with = "deserialize_game_id")]
  pub game_id: Option<String>,
  pub local_player_cell_id: i64,
  pub my_team: Vec<TeamMember>,
  pub their_team: Vec<TeamMember>,
  pub actions: Vec<Vec<SessionAction>>,
  pub timer: SessionTimer,
  pub chat_details: ChatDetails,
}

impl ChampSelectSession {
  pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
    serde_json::from_value(value)
  }

  pub fn all_actions(&self) -> impl Iterator<Item = &SessionAction> {
    self.actions.iter().flatten()
  }

  pub fn find_action(&self, action_id: i64) -> Option<&SessionAction> {
    self.all_actions().find(|a| a.id == action_id)
  }

  /// Local actions that are in progress and not completed, in draft order.
  pub fn actionable_local_actions(&self) -> Vec<&SessionAction> {
    self
      .all_actions()
      .filter(|a| a.actor_cell_id == self.local_player_cell_id && a.is_actionable())
      .collect()
  }

  /// Our first pick with nothing chosen yet, whether or not its turn has started.
  pub fn first_open_local_pick(&self) -> Option<&SessionAction> {
    self.all_actions().find(|a| {
      a.actor_cell_id == self.local_player_cell_id && a.kind == ActionKind::Pick && !a.completed && a.champion_id == 0
    })
  }

  pub fn local_member(&self) -> Option<&TeamMember> {
    self
      .my_team
      .iter()
      .find(|m| m.cell_id == self.local_player_cell_id)
  }

  pub fn local_position(&self) -> Option<Position> {
    self
      .local_member()
      .and_then(|m| Position::from_lcu(&m.assigned_position))
  }

  /// Seconds left in the timer phase at the moment of this snapshot.
  pub fn remaining_seconds(&self) -> f64 {
    (self.timer.adjusted_time_left_in_phase / 1000.0).max(0.0)
  }

  pub fn banned_champions(&self) -> HashSet<i64> {
    self
      .all_actions()
      .filter(|a| a.kind == ActionKind::Ban && a.completed && a.champion_id > 0)
      .map(|a| a.champion_id)
      .collect()
  }

  /// Locked picks from both teams.
  pub fn picked_champions(&self) -> HashSet<i64> {
    self
      .all_actions()
      .filter(|a| a.kind == ActionKind::Pick && a.completed && a.champion_id > 0)
      .map(|a| a.champion_id)
      .collect()
  }

  /// Champions teammates (not us) are hovering, intending or have picked.
  pub fn teammate_selections(&self) -> HashSet<i64> {
    let local = self.local_player_cell_id;
    let ally_cells: HashSet<i64> = self
      .my_team
      .iter()
      .map(|m| m.cell_id)
      .filter(|cell| *cell != local)
      .collect();

    let mut selections: HashSet<i64> = self
      .my_team
      .iter()
      .filter(|m| m.cell_id != local)
      .flat_map(|m| [m.champion_id, m.champion_pick_intent])
      .filter(|id| *id > 0)
      .collect();

    selections.extend(
      self
        .all_actions()
        .filter(|a| a.kind == ActionKind::Pick && ally_cells.contains(&a.actor_cell_id))
        .map(|a| a.champion_id)
        .filter(|id| *id > 0),
    );
    selections
  }

  /// Ban avoids what is already banned and anything a teammate wants.
  pub fn ban_exclusions(&self) -> ExclusionSets {
    ExclusionSets {
      bans: self.banned_champions(),
      picks: self.teammate_selections(),
    }
  }

  /// Pick avoids bans, locked picks on either side and teammate hovers.
  pub fn pick_exclusions(&self) -> ExclusionSets {
    let mut picks = self.picked_champions();
    picks.extend(self.teammate_selections());
    picks.extend(
      self
        .their_team
        .iter()
        .map(|m| m.champion_id)
        .filter(|id| *id > 0),
    );
    ExclusionSets {
      bans: self.banned_champions(),
      picks,
    }
  }

  pub fn exclusions_for(&self, kind: ActionKind) -> ExclusionSets {
    match kind {
      ActionKind::Pick => self.pick_exclusions(),
      _ => self.ban_exclusions(),
    }
  }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// gameId arrives as a number from the client and as a string from some tools; 0 means unassigned
fn deserialize_game_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  let id = match value {
    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
    Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
    _ => None,
  };
  Ok(id.filter(|s| !s.is_empty() && s != "0"))
}
