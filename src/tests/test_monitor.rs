// Tests for the local client monitor: transitions, failures and actions

use super::test_helpers::*;
use crate::config::MonitorSettings;
use crate::lcu::{ConnectionState, GamePhase, LocalClientMonitor, MonitorEvent, Position};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[cfg(test)]
mod monitor_tests {
  use super::*;

  fn monitor_for(api: &Arc<MockClientApi>) -> LocalClientMonitor {
    LocalClientMonitor::new(api.clone(), MonitorSettings::default())
  }

  /// Test: Identical polls emit one event per transition
  #[tokio::test(start_paused = true)]
  async fn test_events_only_on_transition() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    let monitor = monitor_for(&api);
    let mut events = monitor.subscribe();

    for _ in 0..5 {
      monitor.poll_once().await;
    }

    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::Lobby),
      ]
    );

    api.set_phase(GamePhase::Matchmaking);
    monitor.poll_once().await;
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![MonitorEvent::PhaseChanged(GamePhase::Matchmaking)]
    );
  }

  /// Test: Sustained probe failures report the client as gone, once
  ///
  /// Scenario: Three failed phase probes (the default threshold), then more, then recovery.
  /// Expected: One ConnectionChanged(false), then one ConnectionChanged(true).
  #[tokio::test(start_paused = true)]
  async fn test_failure_threshold() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    let monitor = monitor_for(&api);
    monitor.poll_once().await;
    let mut events = monitor.subscribe();

    api.fail_phase();
    monitor.poll_once().await;
    monitor.poll_once().await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);

    monitor.poll_once().await;
    monitor.poll_once().await;
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(false),
        MonitorEvent::PhaseChanged(GamePhase::None),
      ]
    );
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);

    api.set_phase(GamePhase::Lobby);
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::Lobby),
      ]
    );
  }

  /// Test: A failing ready-check probe does not hide the phase change
  #[tokio::test(start_paused = true)]
  async fn test_probe_failures_are_isolated() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::ReadyCheck);
    api.fail_ready_check();
    let monitor = monitor_for(&api);
    let mut events = monitor.subscribe();

    monitor.poll_once().await;

    let events = drain(&mut events);
    assert!(events.contains(&MonitorEvent::PhaseChanged(GamePhase::ReadyCheck)));
    assert!(!events.iter().any(|e| matches!(e, MonitorEvent::ReadyCheckChanged(_))));
    assert_eq!(api.count(&ApiCall::ReadyCheck), 1);
  }

  /// Test: Ready check edges, with the falling edge on leaving the phase
  #[tokio::test(start_paused = true)]
  async fn test_ready_check_edges() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::ReadyCheck);
    api.set_ready_check(true);
    let monitor = monitor_for(&api);
    let mut events = monitor.subscribe();

    monitor.poll_once().await;
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::ReadyCheck),
        MonitorEvent::ReadyCheckChanged(true),
      ]
    );

    api.set_phase(GamePhase::ChampSelect);
    api.set_session(None);
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::PhaseChanged(GamePhase::ChampSelect),
        MonitorEvent::ReadyCheckChanged(false),
      ]
    );
  }

  /// Test: Session probes only while in champ select
  #[tokio::test(start_paused = true)]
  async fn test_session_probed_only_in_champ_select() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    api.set_session(Some(base_session()));
    let monitor = monitor_for(&api);

    monitor.poll_once().await;
    assert_eq!(api.count(&ApiCall::Session), 0);
    assert_eq!(api.count(&ApiCall::ReadyCheck), 0);

    api.set_phase(GamePhase::ChampSelect);
    monitor.poll_once().await;
    assert_eq!(api.count(&ApiCall::Session), 1);
  }

  /// Test: Timer drift alone does not emit a session event
  ///
  /// Scenario: Same session polled with the timer ticking, then a teammate hovers.
  /// Expected: One new-session event, nothing for the timer, one update for the hover.
  #[tokio::test(start_paused = true)]
  async fn test_session_events() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::ChampSelect);
    let mut session = ban_turn_session(1);
    api.set_session(Some(session.clone()));
    let monitor = monitor_for(&api);
    let mut events = monitor.subscribe();

    monitor.poll_once().await;
    let first = drain(&mut events);
    let update = match first.last() {
      Some(MonitorEvent::ChampSelectSessionChanged(Some(update))) => update.clone(),
      other => panic!("expected a session event, got {:?}", other),
    };
    assert!(update.is_new_session());
    assert_eq!(update.identity(), &"champselect_game_12345678");

    session.timer.adjusted_time_left_in_phase = 12000.0;
    api.set_session(Some(session.clone()));
    monitor.poll_once().await;
    assert!(drain(&mut events).is_empty());

    session.my_team[1].champion_pick_intent = ZED;
    api.set_session(Some(session.clone()));
    monitor.poll_once().await;
    match drain(&mut events).as_slice() {
      [MonitorEvent::ChampSelectSessionChanged(Some(update))] => {
        assert!(!update.is_new_session());
        assert_eq!(update.session.my_team[1].champion_pick_intent, ZED);
      }
      other => panic!("expected one update, got {:?}", other),
    }

    api.set_phase(GamePhase::InProgress);
    monitor.poll_once().await;
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::PhaseChanged(GamePhase::InProgress),
        MonitorEvent::ChampSelectSessionChanged(None),
      ]
    );
  }

  /// Test: A failed connect leaves the monitor untouched
  #[tokio::test(start_paused = true)]
  async fn test_connect() {
    let api = Arc::new(MockClientApi::new());
    api.fail_phase();
    let monitor = monitor_for(&api);
    let mut events = monitor.subscribe();

    assert!(!monitor.connect().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
    assert!(drain(&mut events).is_empty());

    api.set_phase(GamePhase::Lobby);
    assert!(monitor.connect().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);
    assert_eq!(monitor.current_phase(), GamePhase::Lobby);
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::Lobby),
      ]
    );
  }

  /// Test: Action calls map to PATCH and report rejection as false
  #[tokio::test(start_paused = true)]
  async fn test_action_calls() {
    let api = Arc::new(MockClientApi::new());
    let monitor = monitor_for(&api);

    assert!(monitor.hover_champion(ZED, 1).await);
    assert!(monitor.ban_champion(ZED, 1).await);
    assert!(monitor.accept_ready_check().await);
    assert!(!monitor.pick_champion(0, 2).await);
    assert_eq!(api.patches(), vec![(1, ZED, false), (1, ZED, true)]);
    assert_eq!(api.count(&ApiCall::Accept), 1);

    api.reject_patches();
    assert!(!monitor.pick_champion(JINX, 2).await);
  }

  /// Test: Queries fall back to empty results on failure
  #[tokio::test(start_paused = true)]
  async fn test_queries() {
    let api = Arc::new(MockClientApi::new());
    let monitor = monitor_for(&api);

    let mut session = pick_turn_session(4);
    session.actions.push({
      let mut ban = action(1, 6, crate::lcu::ActionKind::Ban, false);
      ban.champion_id = YASUO;
      ban.completed = true;
      vec![ban]
    });
    api.set_session(Some(session));

    assert!(monitor.get_banned_champions().await.contains(&YASUO));
    assert!(monitor.get_picked_champions().await.is_empty());
    assert_eq!(monitor.get_player_position().await, Some(Position::Bottom));
    assert_eq!(monitor.get_remaining_time_in_phase().await, Some(30.0));

    api.fail_session();
    assert!(monitor.get_banned_champions().await.is_empty());
    assert_eq!(monitor.get_remaining_time_in_phase().await, None);
    assert_eq!(monitor.get_player_position().await, None);
  }

  /// Test: Remaining time is extrapolated from the last poll
  #[tokio::test(start_paused = true)]
  async fn test_remaining_time_extrapolated() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::ChampSelect);
    api.set_session(Some(ban_turn_session(1)));
    let monitor = monitor_for(&api);
    monitor.poll_once().await;
    api.fail_session();

    sleep(Duration::from_secs(5)).await;
    let remaining = monitor.get_remaining_time_in_phase().await.unwrap();
    assert!((remaining - 25.0).abs() < 0.01, "remaining {}", remaining);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(monitor.get_remaining_time_in_phase().await, Some(0.0));
  }

  /// Test: Start and stop are idempotent and the loop polls on its own
  #[tokio::test(start_paused = true)]
  async fn test_start_stop_idempotent() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    let monitor = monitor_for(&api);

    monitor.start_monitoring();
    monitor.start_monitoring();
    assert!(monitor.is_monitoring());

    sleep(Duration::from_millis(3500)).await;
    let polls = api.count(&ApiCall::Phase);
    assert_eq!(polls, 4);

    monitor.stop_monitoring();
    monitor.stop_monitoring();
    assert!(!monitor.is_monitoring());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(api.count(&ApiCall::Phase), polls);
  }

  /// Test: Shutdown waits for the polling task and disconnects
  #[tokio::test(start_paused = true)]
  async fn test_shutdown() {
    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    let monitor = monitor_for(&api);

    monitor.start_monitoring();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);

    monitor.shutdown().await;
    assert!(!monitor.is_monitoring());
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
  }

  /// Test: At most `action_concurrency` state-changing calls are in flight
  ///
  /// Scenario: Four bans and an accept while the client holds every call.
  /// Expected: Two in flight, the rest queued; all succeed once released.
  #[tokio::test(start_paused = true)]
  async fn test_action_pool_bounds_concurrency() {
    let api = Arc::new(MockClientApi::new());
    api.hold_actions();
    let settings = MonitorSettings {
      action_concurrency: 2,
      ..MonitorSettings::default()
    };
    let monitor = Arc::new(LocalClientMonitor::new(api.clone(), settings));

    let mut tasks = Vec::new();
    for action_id in 1..=4 {
      let monitor = monitor.clone();
      tasks.push(tokio::spawn(async move { monitor.ban_champion(ZED, action_id).await }));
    }
    tasks.push(tokio::spawn({
      let monitor = monitor.clone();
      async move { monitor.accept_ready_check().await }
    }));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(api.in_flight(), 2);
    assert_eq!(api.max_in_flight(), 2);

    api.release_actions();
    for task in tasks {
      assert!(task.await.unwrap());
    }
    assert_eq!(api.max_in_flight(), 2);
    assert_eq!(api.in_flight(), 0);
    assert_eq!(api.patches().len(), 4);
  }

  /// Test: A restarted client is looked up again after the connection drops
  ///
  /// Scenario: The first client stops answering; a second one appears with new credentials.
  /// Expected: No lookup while connected, one more once the reconnect interval passes, and
  /// polling and actions move to the new client.
  #[tokio::test(start_paused = true)]
  async fn test_reconnects_after_client_restart() {
    let first = Arc::new(MockClientApi::new());
    first.set_phase(GamePhase::Lobby);
    let connector = Arc::new(FakeConnector::new(vec![first.clone()]));
    let monitor = LocalClientMonitor::with_connector(connector.clone(), MonitorSettings::default());
    let mut events = monitor.subscribe();

    monitor.poll_once().await;
    assert_eq!(connector.lookups(), 1);
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::Lobby),
      ]
    );

    first.fail_phase();
    for _ in 0..3 {
      monitor.poll_once().await;
    }
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connector.lookups(), 1);

    let second = Arc::new(MockClientApi::new());
    second.set_phase(GamePhase::Lobby);
    connector.push(second.clone());

    // the last lookup is still too recent
    monitor.poll_once().await;
    assert_eq!(connector.lookups(), 1);

    sleep(Duration::from_secs(10)).await;
    drain(&mut events);
    monitor.poll_once().await;
    assert_eq!(connector.lookups(), 2);
    assert_eq!(
      drain(&mut events),
      vec![
        MonitorEvent::ConnectionChanged(true),
        MonitorEvent::PhaseChanged(GamePhase::Lobby),
      ]
    );

    assert!(monitor.ban_champion(ZED, 1).await);
    assert_eq!(second.patches(), vec![(1, ZED, true)]);
    assert!(first.patches().is_empty());
  }

  /// Test: Connect looks the client up before probing it
  #[tokio::test(start_paused = true)]
  async fn test_connect_looks_up_client() {
    let connector = Arc::new(FakeConnector::new(Vec::new()));
    let monitor = LocalClientMonitor::with_connector(connector.clone(), MonitorSettings::default());

    assert!(!monitor.connect().await);
    assert!(!monitor.client().is_set());
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);

    let api = Arc::new(MockClientApi::new());
    api.set_phase(GamePhase::Lobby);
    connector.push(api.clone());

    assert!(monitor.connect().await);
    assert_eq!(connector.lookups(), 2);
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);
    assert_eq!(monitor.current_phase(), GamePhase::Lobby);
  }
}
