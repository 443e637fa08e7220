// Champion choice for auto ban/pick
//
// Pure: the same role, exclusions and preferences always give the same answer.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::{AutomationConfig, ChampionInfo};
use crate::lcu::{ActionKind, Position};

/// Champions that must not be chosen right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSets {
  pub bans: HashSet<i64>,
  pub picks: HashSet<i64>,
}

impl ExclusionSets {
  pub fn contains(&self, champion_id: i64) -> bool {
    self.bans.contains(&champion_id) || self.picks.contains(&champion_id)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
  /// Index into the lane queue.
  RoleList(usize),
  GlobalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChampionChoice {
  pub champion: ChampionInfo,
  pub champion_id: i64,
  pub source: ChoiceSource,
}

/// Inputs for one decision, borrowed from the current policy.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPolicy<'a> {
  pub position_based: bool,
  pub role_list: Option<&'a [ChampionInfo]>,
  pub global: Option<&'a ChampionInfo>,
}

impl<'a> SelectionPolicy<'a> {
  /// Build the policy for a ban or pick from the automation config.
  ///
  /// `global` overrides the configured global champion when the caller
  /// already resolved one.
  pub fn for_action(
    config: &'a AutomationConfig,
    kind: ActionKind,
    position: Option<Position>,
    global: Option<&'a ChampionInfo>,
  ) -> Self {
    let prefs = config.position_preferences(position);
    let (role_list, configured_global) = match kind {
      ActionKind::Pick => (
        prefs.map(|p| p.pick_champions.as_slice()),
        config.pick_champion.as_ref(),
      ),
      _ => (
        prefs.map(|p| p.ban_champions.as_slice()),
        config.ban_champion.as_ref(),
      ),
    };

    Self {
      position_based: config.position_based_selection,
      role_list,
      global: global.or(configured_global),
    }
  }

  pub fn choose(&self, exclusions: &ExclusionSets) -> Option<ChampionChoice> {
    select_champion(self.position_based, self.role_list, self.global, exclusions)
  }
}

/// Scan the lane queue (when position-based selection is on), then the
/// global champion. `None` means every candidate is excluded.
pub fn select_champion(
  position_based: bool,
  role_list: Option<&[ChampionInfo]>,
  global: Option<&ChampionInfo>,
  exclusions: &ExclusionSets,
) -> Option<ChampionChoice> {
  if position_based {
    if let Some(list) = role_list.filter(|l| !l.is_empty()) {
      for (index, candidate) in list.iter().enumerate() {
        let Some(id) = candidate.champion_id.filter(|id| *id > 0) else {
          debug!("[Selection] Skipping {} without champion id", candidate);
          continue;
        };
        if exclusions.contains(id) {
          debug!("[Selection] {} excluded, trying next in queue", candidate);
          continue;
        }
        info!(
          "[Selection] Chose {} from lane queue (position {} of {})",
          candidate,
          index + 1,
          list.len()
        );
        return Some(ChampionChoice {
          champion: candidate.clone(),
          champion_id: id,
          source: ChoiceSource::RoleList(index),
        });
      }
      debug!("[Selection] Lane queue exhausted, trying global champion");
    }
  }

  if let Some(candidate) = global {
    if let Some(id) = candidate.champion_id.filter(|id| *id > 0) {
      if !exclusions.contains(id) {
        info!("[Selection] Chose global champion {}", candidate);
        return Some(ChampionChoice {
          champion: candidate.clone(),
          champion_id: id,
          source: ChoiceSource::GlobalFallback,
        });
      }
      debug!("[Selection] Global champion {} is excluded", candidate);
    }
  }

  warn!(
    "[Selection] No eligible champion (excluded bans: {}, excluded picks: {})",
    exclusions.bans.len(),
    exclusions.picks.len()
  );
  None
}
