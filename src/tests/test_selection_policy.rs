// Tests for champion selection and exclusion sets

use super::test_helpers::*;
use crate::config::{AutomationConfig, PositionPreferences};
use crate::lcu::{ActionKind, Position};
use crate::selection::{select_champion, ChoiceSource, ExclusionSets, SelectionPolicy};
use std::collections::HashSet;

#[cfg(test)]
mod selection_policy_tests {
  use super::*;

  fn excluding(picks: &[i64]) -> ExclusionSets {
    ExclusionSets {
      bans: HashSet::new(),
      picks: picks.iter().copied().collect(),
    }
  }

  fn bottom_config() -> AutomationConfig {
    let mut config = AutomationConfig {
      position_based_selection: true,
      ..AutomationConfig::default()
    };
    config.positions.insert(
      Position::Bottom,
      PositionPreferences {
        ban_champions: vec![champ(ZED, "Zed"), champ(YASUO, "Yasuo")],
        pick_champions: vec![champ(JINX, "Jinx"), champ(ASHE, "Ashe")],
      },
    );
    config
  }

  /// Test: First non-excluded lane champion wins
  ///
  /// Scenario: Bottom pick queue is Jinx then Ashe; Jinx is taken.
  /// Expected: Ashe, from the second queue slot.
  #[test]
  fn test_skips_excluded_role_champion() {
    let list = [champ(JINX, "Jinx"), champ(ASHE, "Ashe")];
    let choice = select_champion(true, Some(&list), None, &excluding(&[JINX])).unwrap();

    assert_eq!(choice.champion_id, ASHE);
    assert_eq!(choice.source, ChoiceSource::RoleList(1));
  }

  /// Test: Everything excluded and no global fallback gives nothing
  #[test]
  fn test_all_excluded_returns_none() {
    let list = [champ(JINX, "Jinx"), champ(ASHE, "Ashe")];
    let exclusions = ExclusionSets {
      bans: [JINX].into_iter().collect(),
      picks: [ASHE].into_iter().collect(),
    };
    assert!(select_champion(true, Some(&list), None, &exclusions).is_none());
  }

  /// Test: Exhausted lane queue falls back to the global champion
  #[test]
  fn test_global_fallback() {
    let list = [champ(JINX, "Jinx")];
    let global = champ(ZED, "Zed");
    let choice = select_champion(true, Some(&list), Some(&global), &excluding(&[JINX])).unwrap();

    assert_eq!(choice.champion_id, ZED);
    assert_eq!(choice.source, ChoiceSource::GlobalFallback);
  }

  /// Test: Excluded global champion is not chosen either
  #[test]
  fn test_excluded_global_returns_none() {
    let global = champ(ZED, "Zed");
    assert!(select_champion(false, None, Some(&global), &excluding(&[ZED])).is_none());
  }

  /// Test: Lane queue is ignored while position-based selection is off
  #[test]
  fn test_role_list_ignored_when_disabled() {
    let list = [champ(JINX, "Jinx")];
    let global = champ(ASHE, "Ashe");
    let choice = select_champion(false, Some(&list), Some(&global), &ExclusionSets::default()).unwrap();
    assert_eq!(choice.champion_id, ASHE);
  }

  /// Test: Entries without a champion id are skipped
  #[test]
  fn test_entries_without_id_are_skipped() {
    let mut unknown = champ(0, "Unknown");
    unknown.champion_id = None;
    let list = [unknown, champ(ASHE, "Ashe")];
    let choice = select_champion(true, Some(&list), None, &ExclusionSets::default()).unwrap();
    assert_eq!(choice.champion_id, ASHE);
  }

  /// Test: Same inputs always give the same answer
  #[test]
  fn test_deterministic() {
    let list = [champ(JINX, "Jinx"), champ(ASHE, "Ashe")];
    let exclusions = excluding(&[JINX]);
    let first = select_champion(true, Some(&list), None, &exclusions);
    let second = select_champion(true, Some(&list), None, &exclusions);
    assert_eq!(first, second);
  }

  /// Test: Policy built from config picks the lane's pick or ban queue
  #[test]
  fn test_policy_from_config() {
    let config = bottom_config();

    let pick = SelectionPolicy::for_action(&config, ActionKind::Pick, Some(Position::Bottom), None)
      .choose(&ExclusionSets::default())
      .unwrap();
    assert_eq!(pick.champion_id, JINX);

    let ban = SelectionPolicy::for_action(&config, ActionKind::Ban, Some(Position::Bottom), None)
      .choose(&ExclusionSets::default())
      .unwrap();
    assert_eq!(ban.champion_id, ZED);

    // no queue for top, no global champion
    let top = SelectionPolicy::for_action(&config, ActionKind::Pick, Some(Position::Top), None)
      .choose(&ExclusionSets::default());
    assert!(top.is_none());
  }

  /// Test: Ban exclusions protect teammate hovers
  ///
  /// Scenario: A teammate hovers Zed, Yasuo is already banned.
  /// Expected: Both are excluded from our ban.
  #[test]
  fn test_ban_exclusions_from_session() {
    let mut session = ban_turn_session(1);
    session.my_team[1].champion_pick_intent = ZED;
    session.actions[0].push({
      let mut ban = action(2, 6, ActionKind::Ban, false);
      ban.champion_id = YASUO;
      ban.completed = true;
      ban
    });

    let exclusions = session.ban_exclusions();
    assert!(exclusions.contains(ZED));
    assert!(exclusions.contains(YASUO));
    assert!(exclusions.bans.contains(&YASUO));
    assert!(exclusions.picks.contains(&ZED));
  }

  /// Test: Pick exclusions include enemy picks and teammate hovers, not our own hover
  #[test]
  fn test_pick_exclusions_from_session() {
    let mut session = pick_turn_session(1);
    session.my_team[0].champion_pick_intent = JINX;
    session.my_team[2].champion_id = YASUO;
    session.their_team = vec![member(5, ASHE, "")];

    let exclusions = session.pick_exclusions();
    assert!(exclusions.contains(YASUO));
    assert!(exclusions.contains(ASHE));
    assert!(!exclusions.contains(JINX));
  }
}
