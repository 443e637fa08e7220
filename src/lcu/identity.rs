// Stable identity for one champ select occurrence
//
// The session document has no dependable id of its own: gameId is often 0 until
// the game is created, and every other field drifts between polls.

use std::fmt;

use super::types::ChampSelectSession;

const GAME_PREFIX: &str = "champselect_game_";
const CHAT_PREFIX: &str = "champselect_chat_";
const TEAM_PREFIX: &str = "champselect_team_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
  GameId,
  ChatRoom,
  /// Hash of the team layout; provisional until a stronger id shows up.
  TeamHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
  key: String,
  source: IdentitySource,
}

impl SessionIdentity {
  /// Derive the identity of a snapshot. Pure: same snapshot, same id.
  pub fn derive(session: &ChampSelectSession) -> Self {
    if let Some(game_id) = session.game_id.as_deref().filter(|id| !id.is_empty()) {
      return Self {
        key: format!("{}{}", GAME_PREFIX, game_id),
        source: IdentitySource::GameId,
      };
    }

    let chat_room = session.chat_details.chat_room_name.trim();
    if !chat_room.is_empty() {
      return Self {
        key: format!("{}{}", CHAT_PREFIX, chat_room),
        source: IdentitySource::ChatRoom,
      };
    }

    Self {
      key: format!("{}{}", TEAM_PREFIX, team_hash(session)),
      source: IdentitySource::TeamHash,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.key
  }

  pub fn source(&self) -> IdentitySource {
    self.source
  }

  pub fn is_provisional(&self) -> bool {
    self.source == IdentitySource::TeamHash
  }
}

impl fmt::Display for SessionIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key)
  }
}

impl PartialEq<&str> for SessionIdentity {
  fn eq(&self, other: &&str) -> bool {
    self.key == *other
  }
}

// md5 over the sorted cell:champion pairs, so member order in the payload does not matter
fn team_hash(session: &ChampSelectSession) -> String {
  let mut pairs: Vec<(i64, i64)> = session
    .my_team
    .iter()
    .map(|m| (m.cell_id, m.champion_id))
    .collect();
  pairs.sort_unstable();

  let joined = pairs
    .iter()
    .map(|(cell, champ)| format!("{}:{}", cell, champ))
    .collect::<Vec<_>>()
    .join("|");

  format!("{:x}", md5::compute(joined.as_bytes()))
}

/// What a new snapshot means relative to the identity already installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
  /// First snapshot of a new occurrence (or a different occurrence replaced the old one).
  New(SessionIdentity),
  /// A provisional id was upgraded to a game/chat id; same occurrence.
  Refined {
    previous: SessionIdentity,
    current: SessionIdentity,
  },
  Unchanged(SessionIdentity),
}

impl IdentityChange {
  pub fn identity(&self) -> &SessionIdentity {
    match self {
      Self::New(id) | Self::Unchanged(id) => id,
      Self::Refined { current, .. } => current,
    }
  }

  pub fn is_new(&self) -> bool {
    matches!(self, Self::New(_))
  }
}

/// Pins identities across polls of one champ select phase.
///
/// A team-hash id is computed from the first snapshot and kept while the
/// team data keeps drifting; it is only replaced by a game/chat id
/// (reported as a refinement) or by `reset` when champ select ends.
#[derive(Debug, Default)]
pub struct IdentityTracker {
  current: Option<SessionIdentity>,
}

impl IdentityTracker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> Option<&SessionIdentity> {
    self.current.as_ref()
  }

  pub fn observe(&mut self, session: &ChampSelectSession) -> IdentityChange {
    let derived = SessionIdentity::derive(session);

    let change = match self.current.take() {
      None => IdentityChange::New(derived),
      Some(current) if current == derived => IdentityChange::Unchanged(current),
      Some(current) if current.is_provisional() && derived.is_provisional() => {
        IdentityChange::Unchanged(current)
      }
      Some(current) if current.is_provisional() => IdentityChange::Refined {
        previous: current,
        current: derived,
      },
      // a strong id never falls back to a team hash within one phase
      Some(current) if derived.is_provisional() => IdentityChange::Unchanged(current),
      Some(_) => IdentityChange::New(derived),
    };

    self.current = Some(change.identity().clone());
    change
  }

  pub fn reset(&mut self) {
    self.current = None;
  }
}
